mod common;

use common::{TestApp, OWNER};
use quizgen_core::{JobReport, JobStatus, QuizOutcome};
use quizgen_server::poll::{INTERNAL_ERROR_DETAIL, UNKNOWN_JOB_DETAIL};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[tokio::test]
async fn test_batch_returns_one_entry_per_job() {
    let app = TestApp::new().await;
    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(app.create_job().await);
    }
    app.quizzes
        .finish(OWNER, &ids[2], &QuizOutcome::Ready(json!([{ "question": "q", "answer": "a" }])))
        .await
        .unwrap();

    let batch: BTreeMap<String, Value> = ids.iter().map(|id| (id.clone(), json!("poll"))).collect();
    let reports = app.controller.poll_batch(OWNER, batch, "token").await;

    assert_eq!(reports.len(), 5);
    for (id, report) in &reports {
        let expected = if id == &ids[2] {
            JobStatus::Completed
        } else {
            JobStatus::Processing
        };
        assert_eq!(report.status, expected, "job {}", id);
    }
}

#[tokio::test]
async fn test_failures_are_isolated_per_entry() {
    let app = TestApp::new().await;
    let good = app.create_job().await;

    let batch = BTreeMap::from([
        (good.clone(), json!("poll")),
        ("user-1:does-not-exist".to_string(), json!("poll")),
        ("user-2:someone-else".to_string(), json!("poll")),
        (good.replace("user-1:", "user-1:x"), json!("resume-please")),
    ]);
    let reports = app.controller.poll_batch(OWNER, batch, "token").await;

    assert_eq!(reports.len(), 4);
    assert_eq!(reports[&good], JobReport::processing());
    assert_eq!(
        reports["user-1:does-not-exist"],
        JobReport::error(UNKNOWN_JOB_DETAIL)
    );
    assert_eq!(reports["user-2:someone-else"], JobReport::forbidden());

    let invalid = &reports[&good.replace("user-1:", "user-1:x")];
    assert_eq!(invalid.status, JobStatus::Error);
    assert!(invalid
        .error_detail
        .as_deref()
        .unwrap()
        .starts_with("invalid resume value"));
    assert_ne!(invalid.error_detail.as_deref(), Some(INTERNAL_ERROR_DETAIL));
}

#[tokio::test]
async fn test_mismatched_payload_is_reported_not_applied() {
    let app = TestApp::new().await;
    let first = app.create_job().await;
    let second = app.create_job().await;

    let batch = BTreeMap::from([(
        first.clone(),
        json!({ "owner_id": OWNER, "job_id": second, "status": "ready", "result": [] }),
    )]);
    let reports = app.controller.poll_batch(OWNER, batch, "token").await;

    assert_eq!(reports[&first].status, JobStatus::Error);
    let snapshot = app.controller.runner().snapshot(&first).await.unwrap().unwrap();
    assert!(!snapshot.phase.is_terminal());
}

#[tokio::test]
async fn test_terminal_jobs_are_not_rerun() {
    let app = TestApp::new().await;
    let job_id = app.create_job().await;
    app.quizzes
        .finish(OWNER, &job_id, &QuizOutcome::Failed("worker crashed".to_string()))
        .await
        .unwrap();

    let poll = || BTreeMap::from([(job_id.clone(), json!("poll"))]);
    let first = app.controller.poll_batch(OWNER, poll(), "token").await;
    assert_eq!(first[&job_id], JobReport::error("worker crashed"));
    let settled = app.checkpoint_count(&job_id).await;

    let second = app.controller.poll_batch(OWNER, poll(), "token").await;
    assert_eq!(second[&job_id], JobReport::error("worker crashed"));
    assert_eq!(app.checkpoint_count(&job_id).await, settled);
    assert_eq!(app.dispatcher.count(), 1);
}

#[tokio::test]
async fn test_concurrent_polls_of_same_job_never_error() {
    let app = TestApp::new().await;
    let job_id = app.create_job().await;
    app.quizzes
        .finish(OWNER, &job_id, &QuizOutcome::Ready(json!(["done"])))
        .await
        .unwrap();

    let polls = (0..4).map(|_| {
        let controller = app.controller.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move { controller.poll_one(OWNER, &job_id, json!("poll"), "token").await })
    });
    let reports = futures::future::join_all(polls).await;

    for report in reports {
        let report = report.unwrap();
        assert!(
            matches!(report.status, JobStatus::Completed | JobStatus::Processing),
            "{:?}",
            report
        );
    }

    let settled = app.controller.poll_one(OWNER, &job_id, json!("poll"), "token").await;
    assert_eq!(settled, JobReport::completed(json!(["done"])));
}
