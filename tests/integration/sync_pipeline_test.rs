//! End-to-end sync passes: upstream pages through normalization, conflict
//! resolution and the store, with checkpoints, the failure ledger and alerts.

#[path = "../common/mod.rs"]
mod common;

use common::mock_services::harness;
use common::test_data::*;
use grant_sync::services::core::infrastructure::data_synchronization::{
    CheckpointStore, SYNC_FAILURES_TABLE, SYNC_LOCKS_TABLE, SYNC_PROGRESS_TABLE,
};
use grant_sync::{EntityKind, ScheduledSyncOutcome};
use serde_json::json;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_full_sync_normalizes_every_entity() {
    let h = harness();
    h.upstream.respond(CALLS_PATH, 200, calls_page());
    h.upstream.respond(APPLICATIONS_PATH, 200, mixed_applications_page());
    h.upstream.respond(ACTIVITIES_PATH, 200, activities_page());

    let reports = h.service.sync_all().await;
    assert_eq!(reports.len(), 3);

    let grants = &reports[0];
    assert_eq!(grants.entity, "grants");
    assert_eq!((grants.total, grants.inserted, grants.failed), (2, 2, 0));

    let rows = h.store.rows("grants");
    let second = rows
        .iter()
        .find(|row| row["id"] == "2024-00102")
        .expect("second grant stored");
    assert_eq!(second["title"], "Hållbar industri");
    assert_eq!(second["deadline"], "2024-04-01");
    assert_eq!(second["sector"], json!(null));

    // One good record, one without an id, one non-object
    let applications = &reports[1];
    assert_eq!(applications.total, 3);
    assert_eq!(applications.inserted, 1);
    assert_eq!(applications.failed, 2);
    assert_eq!(applications.errors.len(), 2);
    assert!(applications
        .errors
        .iter()
        .all(|entry| entry.error == "Malformed or missing id"));
    assert_eq!(h.store.rows("applications")[0]["decision_date"], "2023-11-20");
    // Malformed input is reported, not queued for replay
    assert_eq!(h.store.count(SYNC_FAILURES_TABLE), 0);

    let activities = &reports[2];
    assert_eq!(activities.inserted, 1);
    let activity = &h.store.rows("activities")[0];
    assert_eq!(activity["name"], "Pilotstudie");
    assert_eq!(activity["updated_at"], "2024-02-01T00:00:00Z");

    assert_eq!(h.store.count(SYNC_PROGRESS_TABLE), 3);
    assert!(h.alerts.messages().is_empty());
}

#[tokio::test]
async fn test_second_pass_is_incremental_and_idempotent() {
    let h = harness();
    h.upstream.respond(CALLS_PATH, 200, calls_page());

    let first = h.service.sync_grants().await;
    assert_eq!(first.inserted, 2);
    let checkpoint = CheckpointStore::new(h.store.clone())
        .last_synced_at("grants")
        .await;
    assert!(checkpoint.is_some());

    let second = h.service.sync_grants().await;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.unchanged, 2);
    assert_eq!(h.store.count("grants"), 2);

    let sent = h.upstream.requests_to(CALLS_PATH);
    assert_eq!(sent.len(), 2);
    let has_filter = |i: usize| sent[i].query.iter().any(|(k, _)| k == "updated_after");
    assert!(!has_filter(0));
    assert!(has_filter(1));
}

#[tokio::test]
async fn test_newer_edit_wins_and_older_copy_is_ignored() {
    let h = harness();
    h.upstream.respond(CALLS_PATH, 200, calls_page());
    h.upstream.respond(CALLS_PATH, 200, updated_call());
    h.upstream.respond(CALLS_PATH, 200, outdated_call());

    h.service.sync_grants().await;

    let edited = h.service.sync_grants().await;
    assert_eq!(edited.updated, 1);

    let outdated = h.service.sync_grants().await;
    assert_eq!(outdated.unchanged, 1);
    assert_eq!(outdated.updated, 0);

    let rows = h.store.rows("grants");
    let grant = rows
        .iter()
        .find(|row| row["id"] == "2024-00101")
        .expect("grant stored");
    assert_eq!(grant["title"], "Innovativa startups 2.0");
    assert_eq!(grant["updated_at"], "2024-04-01T10:00:00Z");
}

#[tokio::test]
async fn test_write_failures_are_ledgered_and_replayed() {
    let h = harness();
    h.upstream.respond(CALLS_PATH, 200, calls_page());
    h.flaky.fail_writes_to("grants");

    let report = h.service.sync_grants().await;
    assert_eq!(report.failed, 2);
    assert!(report.all_failed());

    // Every record failed, so the next run starts from the same point
    let checkpoint = CheckpointStore::new(h.store.clone())
        .last_synced_at("grants")
        .await;
    assert!(checkpoint.is_none());
    assert_eq!(h.store.count(SYNC_FAILURES_TABLE), 2);
    assert!(h
        .alerts
        .messages()
        .iter()
        .any(|message| message.contains("Sync for grants failed for all 2 records")));

    h.flaky.heal();
    let replay = assert_ok!(h.service.retry_failed_syncs(EntityKind::Grants).await);
    assert_eq!(replay.attempted, 2);
    assert_eq!(replay.resolved, 2);
    assert_eq!(replay.still_failing, 0);
    assert_eq!(h.store.count("grants"), 2);

    let again = assert_ok!(h.service.retry_failed_syncs(EntityKind::Grants).await);
    assert_eq!(again.attempted, 0);
}

#[tokio::test]
async fn test_fetch_failure_alerts_after_retries() {
    let h = harness();
    h.upstream.respond(CALLS_PATH, 500, json!({"error": "boom"}));

    let report = h.service.sync_grants().await;
    assert_eq!(report.total, 0);
    assert!(report.errors[0].global);
    assert!(report.errors[0].error.starts_with("Fetch failed"));

    // Four client attempts inside each of three fetch attempts
    assert_eq!(h.upstream.requests_to(CALLS_PATH).len(), 12);
    assert!(h
        .alerts
        .messages()
        .iter()
        .any(|message| message.starts_with("Sync failed for grants")));
    assert!(CheckpointStore::new(h.store.clone())
        .last_synced_at("grants")
        .await
        .is_none());
}

#[test]
fn test_scheduled_sync_runs_everything_and_releases_lease() {
    let h = harness();
    h.upstream.respond(ACTIVITIES_PATH, 200, activities_page());

    let outcome = assert_ok!(tokio_test::block_on(h.service.run_scheduled_sync()));
    match outcome {
        ScheduledSyncOutcome::Completed { reports } => {
            assert_eq!(reports.len(), 3);
            assert_eq!(reports[2].inserted, 1);
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
    assert_eq!(h.store.count(SYNC_LOCKS_TABLE), 0);
    assert!(!h.service.is_sync_running());
}
