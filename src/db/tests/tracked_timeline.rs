//! Tracked download and timeline persistence tests.

use super::*;

fn tracked_row(job: &DownloadJob, state: TrackedState) -> TrackedDownload {
    TrackedDownload {
        download_id: job.id,
        downloader: job.downloader.clone(),
        name: job.name.clone(),
        category: job.category.clone(),
        app_name: Some("radarr".to_string()),
        state: state.to_i32(),
        total_size: job.size,
        completed_size: job.downloaded,
        total_files: 1,
        discovered_at: job.discovered_at,
        error_message: None,
    }
}

#[tokio::test]
async fn tracked_upsert_replaces_in_place() {
    let db = test_db().await;
    let job = seeded_job(&db).await;

    db.upsert_tracked(&tracked_row(&job, TrackedState::Downloading))
        .await
        .unwrap();
    db.upsert_tracked(&tracked_row(&job, TrackedState::Syncing))
        .await
        .unwrap();

    let rows = db.list_tracked().await.unwrap();
    assert_eq!(rows.len(), 1, "upsert must not duplicate the row");
    assert_eq!(rows[0].state(), TrackedState::Syncing);

    db.delete_tracked(job.id).await.unwrap();
    assert!(db.get_tracked(job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn timeline_lists_newest_first_with_limit() {
    let db = test_db().await;
    let job = seeded_job(&db).await;

    for (i, kind) in ["download.discovered", "sync.job.created", "sync.complete"]
        .iter()
        .enumerate()
    {
        db.insert_event(&NewEventRecord {
            kind: kind.to_string(),
            timestamp: 1000 + i as i64,
            subject_type: "download".to_string(),
            subject_id: Some(job.id.to_string()),
            app_name: None,
            message: format!("event {kind}"),
            details: "{}".to_string(),
        })
        .await
        .unwrap();
    }

    let events = db.list_events(2).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, "sync.complete");
    assert_eq!(events[1].kind, "sync.job.created");

    let for_subject = db.list_events_for_subject(job.id, 10).await.unwrap();
    assert_eq!(for_subject.len(), 3);
    assert!(for_subject.iter().all(|e| e.subject_type == "download"));
}
