//! Move job and app job persistence tests.

use super::*;

#[tokio::test]
async fn move_job_lifecycle_round_trips() {
    let db = test_db().await;
    let job = seeded_job(&db).await;

    let mut mv = db
        .insert_move_job(&NewMoveJob {
            download_id: job.id,
            source_path: "/staging/job_x".to_string(),
            destination_path: "/library/movies".to_string(),
            status: MoveStatus::Pending.to_i32(),
        })
        .await
        .unwrap();
    assert_eq!(mv.status(), MoveStatus::Pending);
    assert!(mv.completed_at.is_none());

    mv.status = MoveStatus::Complete.to_i32();
    mv.completed_at = Some(chrono::Utc::now().timestamp());
    db.update_move_job(&mv).await.unwrap();

    let latest = db.get_latest_move_job(job.id).await.unwrap().unwrap();
    assert_eq!(latest.id, mv.id);
    assert_eq!(latest.status(), MoveStatus::Complete);
    assert!(latest.completed_at.is_some());
}

#[tokio::test]
async fn latest_move_job_picks_the_most_recent_row() {
    let db = test_db().await;
    let job = seeded_job(&db).await;

    for dest in ["/library/a", "/library/b"] {
        db.insert_move_job(&NewMoveJob {
            download_id: job.id,
            source_path: "/staging".to_string(),
            destination_path: dest.to_string(),
            status: MoveStatus::Complete.to_i32(),
        })
        .await
        .unwrap();
    }

    // UUID v7 ids are time-ordered, so the id tiebreak is deterministic even
    // within one timestamp second.
    let latest = db.get_latest_move_job(job.id).await.unwrap().unwrap();
    assert_eq!(latest.destination_path, "/library/b");
}

#[tokio::test]
async fn app_job_lifecycle_round_trips() {
    let db = test_db().await;
    let job = seeded_job(&db).await;

    let mut app_job = db
        .insert_app_job(&NewAppJob {
            download_id: job.id,
            app_name: "radarr".to_string(),
            path: "/library/movies/Movie.2024".to_string(),
            status: AppJobStatus::Running.to_i32(),
        })
        .await
        .unwrap();
    assert_eq!(app_job.status(), AppJobStatus::Running);

    app_job.status = AppJobStatus::Error.to_i32();
    app_job.error_message = Some("connection refused".to_string());
    app_job.completed_at = Some(chrono::Utc::now().timestamp());
    db.update_app_job(&app_job).await.unwrap();

    let jobs = db.list_app_jobs(job.id).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status(), AppJobStatus::Error);
    assert_eq!(jobs[0].error_message.as_deref(), Some("connection refused"));
}
