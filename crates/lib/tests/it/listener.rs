//! Merging remote snapshots and reconnecting the change stream.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use chrono::TimeDelta;
use crs_sync::{
    SyncConfig,
    constants::CONNECTION_LOST_MESSAGE,
    model::AssessmentRecord,
    sync::{RetryPolicy, SyncPhase},
};
use tokio::time::sleep;

use crate::helpers::*;

fn count_notifications(store: &crs_sync::Store) -> (Arc<AtomicUsize>, crs_sync::Subscription) {
    let count = Arc::new(AtomicUsize::new(0));
    let sub = {
        let count = count.clone();
        store.subscribe(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    };
    (count, sub)
}

#[tokio::test(start_paused = true)]
async fn equal_timestamp_snapshot_is_ignored() {
    let h = scripted_harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;
    assert_eq!(h.remote.feed_count(), 1);

    let before = h.engine.state();
    let stamp = before.sync.last_synced_at.unwrap();
    let (notified, _sub) = count_notifications(&h.store);

    h.remote.push(record_at("u1", crs_with_age(77), stamp));
    settle().await;

    assert_eq!(notified.load(Ordering::SeqCst), 0);
    let after = h.engine.state();
    assert!(Arc::ptr_eq(&before.crs_data, &after.crs_data));
    sleep(ms(5_000)).await;
    assert_eq!(h.remote.inner.write_count("u1"), 1);
}

#[tokio::test(start_paused = true)]
async fn older_snapshot_is_ignored() {
    let h = scripted_harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;

    let stamp = h.engine.state().sync.last_synced_at.unwrap();
    h.remote
        .push(record_at("u1", crs_with_age(77), stamp - TimeDelta::seconds(10)));
    settle().await;

    let state = h.engine.state();
    assert_eq!(state.crs_data.age, 29);
    assert_eq!(state.sync.last_synced_at, Some(stamp));
}

#[tokio::test(start_paused = true)]
async fn newer_snapshot_is_merged_without_writing_back() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;
    let writes_before = h.remote.write_count("u1");

    let mut patch = patch_for("u1", crs_with_age(66));
    patch.user_profile.bio = "edited elsewhere".to_string();
    patch.assessment_history = patch.assessment_history.with_record(AssessmentRecord::new(
        crs_sync::clock::timestamp_from_millis(1_700_000_000_000),
        true,
        "cec",
        Some(501),
    ));
    let stamp = h.remote.external_write("u1", &patch).unwrap();
    settle().await;

    let state = h.engine.state();
    assert_eq!(state.crs_data.age, 66);
    assert_eq!(state.assessment_history.len(), 1);
    // Only calculator input and history follow the remote.
    assert_eq!(state.user_profile.bio, "");
    assert_eq!(state.sync.last_synced_at, Some(stamp));
    assert_eq!(state.phase, SyncPhase::Idle);

    sleep(ms(10_000)).await;
    assert_eq!(h.remote.write_count("u1"), writes_before);
}

#[tokio::test(start_paused = true)]
async fn merge_runs_inside_applying_remote_phase() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;

    let phases = Arc::new(std::sync::Mutex::new(Vec::new()));
    let _sub = {
        let phases = phases.clone();
        h.store.subscribe(move |current, previous| {
            if current.synced_fields_changed(previous) {
                phases.lock().unwrap().push(current.phase);
            }
        })
    };

    h.remote
        .external_write("u1", &patch_for("u1", crs_with_age(30)))
        .unwrap();
    settle().await;

    assert_eq!(
        *phases.lock().unwrap(),
        vec![SyncPhase::ApplyingRemote {
            write_in_flight: false
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn first_snapshot_completes_a_failed_load() {
    let h = harness();
    h.remote
        .external_write("u1", &patch_for("u1", crs_with_age(52)))
        .unwrap();
    h.remote.fail_next_reads(1);

    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;

    let state = h.engine.state();
    assert!(state.sync.is_authenticated);
    assert_eq!(state.sync.sync_error, None);
    assert_eq!(state.crs_data.age, 52);
    assert_eq!(state.user_profile.uid, "u1");

    // The full load came from the remote, so nothing is written back.
    sleep(ms(5_000)).await;
    assert_eq!(h.remote.write_count("u1"), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_stream_reconnects_and_clears_error() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;
    assert_eq!(h.remote.subscriber_count("u1"), 1);

    h.remote.drop_subscribers("u1");
    settle().await;
    assert_eq!(
        h.engine.state().sync.sync_error.as_deref(),
        Some(CONNECTION_LOST_MESSAGE)
    );

    // First retry after the 1 s base delay.
    sleep(ms(1_100)).await;
    assert_eq!(h.remote.subscriber_count("u1"), 1);
    assert_eq!(h.engine.state().sync.sync_error, None);

    h.remote
        .external_write("u1", &patch_for("u1", crs_with_age(39)))
        .unwrap();
    settle().await;
    assert_eq!(h.engine.state().crs_data.age, 39);
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_max_attempts() {
    let config = SyncConfig::default().with_reconnect(RetryPolicy {
        max_attempts: 2,
        base_delay: ms(100),
        max_delay: ms(1_000),
    });
    let h = harness_with(config);
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;

    h.remote.fail_next_subscribes(10);
    h.remote.drop_subscribers("u1");
    sleep(ms(10_000)).await;

    assert_eq!(h.remote.subscriber_count("u1"), 0);
    assert_eq!(
        h.engine.state().sync.sync_error.as_deref(),
        Some(CONNECTION_LOST_MESSAGE)
    );
    // Local edits are still pushed.
    h.store.update_crs(|crs| crs.age = 31);
    sleep(ms(2_000)).await;
    assert_eq!(h.remote.record("u1").unwrap().crs_data.age, 31);
}

#[tokio::test(start_paused = true)]
async fn reconnect_does_not_clear_write_errors() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;

    h.remote.drop_subscribers("u1");
    settle().await;
    h.store
        .update(|state| state.sync.sync_error = Some("Failed to save changes: x".to_string()));
    sleep(ms(1_100)).await;

    assert_eq!(h.remote.subscriber_count("u1"), 1);
    assert_eq!(
        h.engine.state().sync.sync_error.as_deref(),
        Some("Failed to save changes: x")
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_stops_listening() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;
    assert_eq!(h.remote.subscriber_count("u1"), 1);

    h.engine.teardown();
    settle().await;
    assert_eq!(h.remote.subscriber_count("u1"), 0);

    let before = h.engine.state();
    h.remote
        .external_write("u1", &patch_for("u1", crs_with_age(80)))
        .unwrap();
    settle().await;
    assert!(Arc::ptr_eq(&before.crs_data, &h.engine.state().crs_data));
}
