//! Download job and file persistence tests.

use super::*;

#[tokio::test]
async fn insert_and_get_by_remote_round_trips() {
    let db = test_db().await;
    let inserted = seeded_job(&db).await;

    let fetched = db
        .get_download_job_by_remote("seedbox", "hash-1")
        .await
        .unwrap()
        .expect("job should be found by (downloader, remote_id)");

    assert_eq!(fetched.id, inserted.id);
    assert_eq!(fetched.name, "download-hash-1");
    assert_eq!(fetched.status(), DownloadStatus::Downloading);
    assert!(fetched.discovered_at > 0);
    assert!(fetched.removed_at.is_none());
}

#[tokio::test]
async fn duplicate_remote_id_violates_unique_constraint() {
    let db = test_db().await;
    seeded_job(&db).await;

    let result = db.insert_download_job(&new_job("seedbox", "hash-1")).await;
    assert!(
        result.is_err(),
        "second insert for the same (downloader, remote_id) must fail"
    );
}

#[tokio::test]
async fn update_persists_category_rename_fields() {
    let db = test_db().await;
    let mut job = seeded_job(&db).await;

    job.previous_category = Some(job.category.clone());
    job.category = "untracked".to_string();
    db.update_download_job(&job).await.unwrap();

    let fetched = db.get_download_job(job.id).await.unwrap().unwrap();
    assert_eq!(fetched.category, "untracked");
    assert_eq!(fetched.previous_category.as_deref(), Some("movies"));
}

#[tokio::test]
async fn removed_jobs_are_hidden_from_listing_but_reachable_by_id() {
    let db = test_db().await;
    let job = seeded_job(&db).await;
    let other = db
        .insert_download_job(&new_job("seedbox", "hash-2"))
        .await
        .unwrap();

    db.mark_download_removed(job.id).await.unwrap();

    let listed = db.list_download_jobs("seedbox").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, other.id);

    let by_id = db.get_download_job(job.id).await.unwrap().unwrap();
    assert!(by_id.removed_at.is_some());

    db.mark_download_restored(job.id).await.unwrap();
    assert_eq!(db.list_download_jobs("seedbox").await.unwrap().len(), 2);
}

#[tokio::test]
async fn files_upsert_by_path_and_preload_with_job() {
    let db = test_db().await;
    let job = seeded_job(&db).await;
    let file = seeded_file(&db, &job, "download-hash-1/a.mkv").await;
    seeded_file(&db, &job, "download-hash-1/b.mkv").await;

    let mut updated = file.clone();
    updated.downloaded = 100;
    updated.progress = 100.0;
    updated.state = FileState::Complete.to_i32();
    db.update_download_file(&updated).await.unwrap();

    let by_path = db
        .get_download_file_by_path(job.id, "download-hash-1/a.mkv")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_path.id, file.id, "update must not change identity");
    assert_eq!(by_path.state(), FileState::Complete);

    let with_files = db.get_download_with_files(job.id).await.unwrap().unwrap();
    assert_eq!(with_files.files.len(), 2);
    assert_eq!(with_files.job.id, job.id);
}

#[tokio::test]
async fn duplicate_file_path_within_job_is_rejected() {
    let db = test_db().await;
    let job = seeded_job(&db).await;
    seeded_file(&db, &job, "x/a.mkv").await;

    let result = db
        .insert_download_file(&NewDownloadFile {
            download_id: job.id,
            relative_path: "x/a.mkv".to_string(),
            size: 1,
            downloaded: 0,
            progress: 0.0,
            priority: 1,
            state: 0,
        })
        .await;
    assert!(result.is_err());
}
