//! Integration tests for mandate events feeding draws

use std::sync::Arc;

use chrono::{Duration, Utc};
use ipo_allotment::adapters::{ChannelPublisher, HttpApplicationDirectory, InMemoryAllotmentStore};
use ipo_allotment::config::{DirectoryConfig, ScheduledDraw, SchedulerConfig};
use ipo_allotment::eligibility::Transition;
use ipo_allotment::{
    AllotError, AllotmentEngine, AllotmentEngineConfig, AllotmentScheduler, ApplicantStatus,
    EligibilityEvent, IpoId,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{app, Harness};

fn webhook(application_id: &str, mandate_id: &str, status: &str) -> EligibilityEvent {
    let body = serde_json::json!({
        "mandateId": mandate_id,
        "applicationId": application_id,
        "status": status,
    });
    EligibilityEvent::from_webhook_json(&body.to_string()).unwrap()
}

#[tokio::test]
async fn test_webhooks_drive_eligibility() {
    let harness = Harness::new();
    harness.file("A", "ipo-1", 2);
    harness.file("B", "ipo-1", 1);

    let engine = &harness.engine;
    engine.handle_event(webhook("A", "m-a", "APPROVED")).await.unwrap();
    engine.handle_event(webhook("B", "m-b", "APPROVED")).await.unwrap();
    engine.handle_event(webhook("B", "m-b", "FAILED")).await.unwrap();

    let failed = engine.tracker().get(&app("B")).unwrap();
    assert_eq!(failed.status, ApplicantStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("Bank rejected"));

    let untracked = engine.handle_event(webhook("ghost", "m-g", "FAILED")).await.unwrap();
    assert_eq!(untracked, Transition::NotTracked);

    let unknown = engine.handle_event(webhook("ghost", "m-g", "APPROVED")).await;
    match unknown {
        Err(err @ AllotError::LookupMiss { .. }) => assert!(err.is_retryable()),
        other => panic!("Expected LookupMiss, got {:?}", other),
    }

    let bad_status = EligibilityEvent::from_webhook_json(
        r#"{"mandateId":"m-1","applicationId":"A","status":"PENDING"}"#,
    );
    assert!(matches!(bad_status, Err(AllotError::InvalidEvent(_))));

    let record = engine.run_allotment(&IpoId::new("ipo-1"), 10).await.unwrap();
    assert_eq!(record.entry_count(), 1);
    assert!(record.winner_application_ids.contains(&app("A")));
}

#[tokio::test]
async fn test_redelivery_leaves_state_unchanged() {
    let once = Harness::new();
    let twice = Harness::new();
    for harness in [&once, &twice] {
        harness.file("A", "ipo-1", 3);
        harness.file("B", "ipo-1", 1);
        harness.file("C", "ipo-1", 2);
    }

    let events = vec![
        webhook("A", "m-a", "APPROVED"),
        webhook("B", "m-b", "APPROVED"),
        webhook("C", "m-c", "APPROVED"),
        webhook("C", "m-c", "FAILED"),
    ];

    for event in &events {
        once.engine.handle_event(event.clone()).await.unwrap();
    }
    for event in &events {
        twice.engine.handle_event(event.clone()).await.unwrap();
        let replayed = twice.engine.handle_event(event.clone()).await.unwrap();
        assert!(!replayed.is_mutation());
    }

    // A stale approval after the failure does not resurrect C
    let stale = twice.engine.handle_event(webhook("C", "m-c", "APPROVED")).await.unwrap();
    assert_eq!(stale, Transition::Ignored(ApplicantStatus::Failed));

    assert_eq!(
        once.engine.tracker().count_by_status(),
        twice.engine.tracker().count_by_status()
    );
    for id in ["A", "B", "C"] {
        let a = once.engine.tracker().get(&app(id)).unwrap();
        let b = twice.engine.tracker().get(&app(id)).unwrap();
        assert_eq!(a.status, b.status);
        assert_eq!(a.lots, b.lots);
    }
}

#[tokio::test]
async fn test_scheduler_with_http_directory() {
    let server = MockServer::start().await;
    for (id, lots) in [("app-1", 3), ("app-2", 1), ("app-3", 2)] {
        Mock::given(method("GET"))
            .and(path(format!("/applications/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "investorId": format!("inv-{}", id),
                "ipoId": "ipo-http",
                "lots": lots
            })))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/ipo/ipo-http/applications"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!(["app-1", "app-2", "app-3"])),
        )
        .mount(&server)
        .await;

    let directory = Arc::new(
        HttpApplicationDirectory::new(DirectoryConfig {
            base_url: server.uri(),
            timeout_sec: 5,
            ..DirectoryConfig::default()
        })
        .unwrap(),
    );
    let (publisher, mut outcomes) = ChannelPublisher::new();
    let engine = Arc::new(AllotmentEngine::new(
        AllotmentEngineConfig::default(),
        directory.clone(),
        Arc::new(InMemoryAllotmentStore::new()),
        Arc::new(publisher),
    ));

    // Only app-1's approval arrives; the others are reconciled from the listing
    engine.handle_event(webhook("app-1", "m-1", "APPROVED")).await.unwrap();

    let now = Utc::now();
    let scheduler = AllotmentScheduler::new(
        engine.clone(),
        directory,
        SchedulerConfig {
            tick_interval_sec: 1,
            reconcile_approved: true,
            draws: vec![ScheduledDraw {
                ipo_id: IpoId::new("ipo-http"),
                total_shares: 2,
                draw_at: now - Duration::seconds(1),
            }],
        },
    );

    let report = scheduler.run_once(now).await.unwrap();
    assert_eq!(report.drawn, vec![IpoId::new("ipo-http")]);
    assert_eq!(report.backfilled, 2);

    let outcome = outcomes.try_recv().unwrap();
    assert_eq!(outcome.winner_application_ids.len(), 2);
    assert_eq!(outcome.non_winner_application_ids.len(), 1);
    assert!(engine.verify_allotment(&IpoId::new("ipo-http")).await.unwrap());

    let later = scheduler.run_once(now + Duration::minutes(1)).await.unwrap();
    assert!(later.drawn.is_empty());
    assert!(outcomes.try_recv().is_err());
}
