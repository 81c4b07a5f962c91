//! Integration tests for AllotmentEngine

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use ipo_allotment::lottery;
use ipo_allotment::notifier::{NotifierStats, OutcomeNotifier};
use ipo_allotment::{AllotError, ApplicantStatus, ApplicationId, IpoId, ManualTrigger};
use tokio::sync::Barrier;

use crate::support::{app, Harness};

#[tokio::test]
async fn test_undersubscribed_issue_allots_everyone() {
    let mut harness = Harness::new();
    harness.admit("A", "ipo-2024-01", 5).await;
    harness.admit("B", "ipo-2024-01", 3).await;
    harness.admit("C", "ipo-2024-01", 2).await;

    let record = harness
        .engine
        .run_allotment(&IpoId::new("ipo-2024-01"), 100)
        .await
        .unwrap();

    let expected: BTreeSet<ApplicationId> = [app("A"), app("B"), app("C")].into_iter().collect();
    assert_eq!(record.winner_application_ids, expected);
    assert!(record.non_winner_application_ids.is_empty());

    let outcomes = harness.drain_outcomes();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].winner_application_ids, expected);
}

#[tokio::test]
async fn test_single_share_draw_is_reproducible() {
    let harness = Harness::new();
    for id in ["A", "B", "C"] {
        harness.admit(id, "ipo-2024-01", 1).await;
    }

    let ipo = IpoId::new("ipo-2024-01");
    let entries = harness.engine.tracker().list_eligible(&ipo);
    let record = harness.engine.run_allotment(&ipo, 1).await.unwrap();
    assert_eq!(record.winner_application_ids.len(), 1);
    assert_eq!(record.non_winner_application_ids.len(), 2);

    // Same entries, shares and seed give the same single winner every time
    let first = lottery::select_winners(&entries, 1, &record.seed);
    let mut reversed = entries.clone();
    reversed.reverse();
    let second = lottery::select_winners(&reversed, 1, &record.seed);
    assert_eq!(first, second);

    let winner_application: BTreeSet<ApplicationId> = entries
        .iter()
        .filter(|e| first.contains(&e.applicant_id))
        .map(|e| e.application_id.clone())
        .collect();
    assert_eq!(winner_application, record.winner_application_ids);

    assert!(harness.engine.verify_allotment(&ipo).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_draws_produce_one_record() {
    let mut harness = Harness::with_store_pause(Duration::from_millis(20));
    for i in 0..20 {
        harness.admit(&format!("app-{:02}", i), "ipo-x", (i % 4) + 1).await;
    }

    let ipo = IpoId::new("ipo-x");
    let barrier = Arc::new(Barrier::new(2));
    let spawn_draw = || {
        let engine = Arc::clone(&harness.engine);
        let barrier = Arc::clone(&barrier);
        let ipo = ipo.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            engine.run_allotment(&ipo, 10).await
        })
    };
    let first = spawn_draw();
    let second = spawn_draw();

    let (first, second) = tokio::join!(first, second);
    let results = [first.unwrap(), second.unwrap()];

    let succeeded: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(AllotError::AlreadyDrawn { .. })))
        .count();
    assert_eq!(succeeded.len(), 1);
    assert_eq!(rejected, 1);

    // The loser saw the stored record and never attempted its own insert
    assert_eq!(harness.store.create_calls(), 1);
    assert_eq!(harness.store.count(), 1);
    assert_eq!(harness.drain_outcomes().len(), 1);

    let stored = harness.engine.get_allotment(&ipo).await.unwrap().unwrap();
    assert_eq!(&stored, succeeded[0]);
    assert_eq!(stored.winner_application_ids.len(), 10);

    let counts = harness.engine.tracker().count_by_status();
    assert_eq!(counts.get(&ApplicantStatus::Allotted), Some(&10));
    assert_eq!(counts.get(&ApplicantStatus::NotAllotted), Some(&10));
    assert_eq!(counts.get(&ApplicantStatus::Eligible), None);
}

#[tokio::test]
async fn test_repeat_draw_has_no_side_effects() {
    let mut harness = Harness::new();
    harness.admit("A", "ipo-1", 2).await;
    harness.admit("B", "ipo-1", 2).await;

    let ipo = IpoId::new("ipo-1");
    let record = harness.engine.run_allotment(&ipo, 1).await.unwrap();
    let statuses_before = harness.engine.tracker().count_by_status();
    harness.drain_outcomes();

    let again = harness.engine.run_allotment(&ipo, 1).await;
    let err = again.unwrap_err();
    assert!(err.is_already_drawn());
    assert!(!err.is_retryable());

    assert!(harness.drain_outcomes().is_empty());
    assert_eq!(harness.engine.tracker().count_by_status(), statuses_before);
    assert_eq!(harness.engine.get_allotment(&ipo).await.unwrap(), Some(record));
}

#[tokio::test]
async fn test_partition_covers_every_eligible_entry() {
    let harness = Harness::new();
    for i in 0..12 {
        harness.admit(&format!("app-{}", i), "ipo-1", (i % 3) + 1).await;
    }
    // Different IPO and a failed mandate stay out of the draw
    harness.admit("other", "ipo-2", 4).await;
    harness.admit("bounced", "ipo-1", 4).await;
    harness
        .engine
        .tracker()
        .on_mandate_failed(&app("bounced"), &ipo_allotment::MandateId::new("m-bounced"), "Bank rejected");

    let record = harness
        .engine
        .run_allotment(&IpoId::new("ipo-1"), 5)
        .await
        .unwrap();

    assert!(record.is_consistent());
    assert_eq!(record.entry_count(), 12);
    assert_eq!(record.winner_application_ids.len(), 5);
    assert!(record
        .winner_application_ids
        .is_disjoint(&record.non_winner_application_ids));
    assert!(record.status_of(&app("bounced")).is_none());
    assert!(record.status_of(&app("other")).is_none());

    let tracker = harness.engine.tracker();
    for id in &record.winner_application_ids {
        assert_eq!(tracker.get(id).unwrap().status, ApplicantStatus::Allotted);
    }
    for id in &record.non_winner_application_ids {
        assert_eq!(tracker.get(id).unwrap().status, ApplicantStatus::NotAllotted);
    }
    assert_eq!(tracker.get(&app("bounced")).unwrap().status, ApplicantStatus::Failed);
    assert_eq!(tracker.get(&app("other")).unwrap().status, ApplicantStatus::Eligible);
}

#[tokio::test]
async fn test_manual_trigger_and_notifications() {
    let harness = Harness::new();
    for (id, lots) in [("A", 3), ("B", 1), ("C", 1), ("D", 2)] {
        harness.admit(id, "ipo-1", lots).await;
    }

    let Harness {
        engine, outcomes, ..
    } = harness;
    let notifier = OutcomeNotifier::new(outcomes).spawn();

    let rejected = engine
        .trigger(ManualTrigger {
            ipo_id: "ipo-1".to_string(),
            total_shares: -1,
        })
        .await;
    assert!(matches!(rejected, Err(AllotError::InvalidInput(_))));

    let record = engine
        .trigger(ManualTrigger {
            ipo_id: "ipo-1".to_string(),
            total_shares: 2,
        })
        .await
        .unwrap();
    assert_eq!(record.winner_application_ids.len(), 2);

    drop(engine);
    let stats = notifier.await.unwrap();
    assert_eq!(
        stats,
        NotifierStats {
            outcomes: 1,
            congratulations: 2,
            regrets: 2,
        }
    );
}
