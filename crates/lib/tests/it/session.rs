//! Initial load, sign-out and user switches.

use std::sync::Arc;

use crs_sync::{
    Error, Store, SyncConfig, SyncEngine,
    model::{AssessmentRecord, CrsProfile, EducationLevel},
    remote::{InMemoryRemote, RemoteOp},
    store::{LocalCache, MemoryCache},
    sync::{RetryPolicy, SyncError, SyncPhase},
};

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn first_sign_in_creates_record_before_subscribing() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    settle().await;

    let ops: Vec<_> = h
        .remote
        .ops()
        .into_iter()
        .filter(|op| op.key() == "u1")
        .collect();
    assert_eq!(ops.len(), 3);
    assert!(matches!(ops[0], RemoteOp::Get { .. }));
    assert!(matches!(ops[1], RemoteOp::Write { .. }));
    assert!(matches!(ops[2], RemoteOp::Subscribe { .. }));

    let record = h.remote.record("u1").unwrap();
    let state = h.engine.state();
    assert_eq!(record.user_profile.uid, "u1");
    assert_eq!(record.user_profile.display_name, "u1");
    assert!(record.assessment_history.is_empty());
    assert_eq!(*state.user_profile, record.user_profile);
    assert!(state.sync.is_authenticated);
    assert_eq!(state.sync.sync_error, None);
    assert_eq!(state.sync.last_synced_at, Some(record.updated_at));
}

#[tokio::test(start_paused = true)]
async fn first_sign_in_uploads_cached_calculator_input() {
    let cache = Arc::new(MemoryCache::with_profile(CrsProfile {
        age: 41,
        education: EducationLevel::Masters,
        ..CrsProfile::default()
    }));
    let store = Store::open(cache);
    let remote = Arc::new(InMemoryRemote::new());
    let engine = SyncEngine::new(store, remote.clone(), SyncConfig::default());

    engine.handle_session_change(Some(session("u1"))).await;
    let record = remote.record("u1").unwrap();
    assert_eq!(record.crs_data.age, 41);
    assert_eq!(record.crs_data.education, EducationLevel::Masters);
}

#[tokio::test(start_paused = true)]
async fn existing_record_replaces_local_state() {
    let h = harness();
    let mut patch = patch_for("u1", crs_with_age(55));
    patch.user_profile.bio = "from another device".to_string();
    patch.assessment_history = patch
        .assessment_history
        .with_record(AssessmentRecord::new(
            crs_sync::clock::timestamp_from_millis(1_700_000_000_000),
            false,
            "study-permit",
            None,
        ));
    let stamp = h.remote.external_write("u1", &patch).unwrap();
    h.store.update_crs(|crs| crs.age = 22);

    h.engine.handle_session_change(Some(session("u1"))).await;
    let state = h.engine.state();
    assert_eq!(state.crs_data.age, 55);
    assert_eq!(state.user_profile.bio, "from another device");
    assert_eq!(state.assessment_history.len(), 1);
    assert_eq!(state.sync.last_synced_at, Some(stamp));
    // Loading is not a local edit.
    tokio::time::sleep(ms(5_000)).await;
    assert_eq!(h.remote.write_count("u1"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_load_sets_error_and_stays_unauthenticated() {
    let h = harness();
    h.remote.fail_next_reads(1);
    h.engine.handle_session_change(Some(session("u1"))).await;

    let state = h.engine.state();
    assert!(!state.sync.is_authenticated);
    let error = state.sync.sync_error.unwrap();
    assert!(error.starts_with("Failed to load your profile: "), "{error}");
    // Listener and synchronizer are attached regardless.
    assert!(h.engine.is_attached());
    assert_eq!(h.remote.write_count("u1"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_create_reports_create_error() {
    let h = harness();
    h.remote.fail_next_writes(1);
    h.engine.handle_session_change(Some(session("u1"))).await;

    let state = h.engine.state();
    assert!(!state.sync.is_authenticated);
    assert!(
        state
            .sync
            .sync_error
            .unwrap()
            .starts_with("Failed to create your profile: ")
    );
    assert!(h.remote.record("u1").is_none());
}

#[tokio::test(start_paused = true)]
async fn unauthenticated_edits_are_not_written() {
    let h = harness();
    h.remote.fail_next_reads(100);
    h.engine.handle_session_change(Some(session("u1"))).await;

    h.store.update_crs(|crs| crs.age = 60);
    tokio::time::sleep(ms(10_000)).await;
    assert!(!h.engine.state().sync.is_authenticated);
    assert_eq!(h.remote.write_count("u1"), 0);
    // Still cached locally.
    assert_eq!(h.cache.save_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_create_is_retried_with_local_edits() {
    let h = harness();
    h.remote.fail_next_writes(1);
    h.engine.handle_session_change(Some(session("u1"))).await;
    assert!(h.remote.record("u1").is_none());

    for age in 30..35 {
        h.store.update_crs(|crs| crs.age = age);
    }
    // First retry after the 1 s base delay.
    tokio::time::sleep(ms(1_100)).await;

    let record = h.remote.record("u1").unwrap();
    assert_eq!(record.crs_data.age, 34);
    let state = h.engine.state();
    assert!(state.sync.is_authenticated);
    assert_eq!(state.sync.sync_error, None);
    assert_eq!(state.sync.last_synced_at, Some(record.updated_at));
    assert_eq!(state.phase, SyncPhase::Idle);

    // Loading is not an edit; later edits go through the synchronizer.
    tokio::time::sleep(ms(5_000)).await;
    assert_eq!(h.remote.write_count("u1"), 1);
    h.store.update_crs(|crs| crs.age = 40);
    h.engine.flush().await.unwrap();
    assert_eq!(h.remote.record("u1").unwrap().crs_data.age, 40);
}

#[tokio::test(start_paused = true)]
async fn failed_read_is_retried_with_backoff() {
    let h = harness();
    h.remote
        .external_write("u1", &patch_for("u1", crs_with_age(57)))
        .unwrap();
    h.remote.fail_next_reads(3);
    // Keep the change stream from loading the record instead.
    h.remote.fail_next_subscribes(100);
    h.engine.handle_session_change(Some(session("u1"))).await;

    // Retries after 1 s and 2 s fail, the one after another 4 s succeeds.
    tokio::time::sleep(ms(6_500)).await;
    assert!(!h.engine.state().sync.is_authenticated);
    tokio::time::sleep(ms(1_000)).await;

    let state = h.engine.state();
    assert!(state.sync.is_authenticated);
    assert_eq!(state.crs_data.age, 57);
    assert_eq!(h.remote.write_count("u1"), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_load_retries_resume_on_next_edit() {
    let config = SyncConfig::default().with_write_retry(RetryPolicy {
        max_attempts: 2,
        base_delay: ms(100),
        max_delay: ms(1_000),
    });
    let h = harness_with(config);
    // The initial attempt plus two retries.
    h.remote.fail_next_reads(3);
    h.engine.handle_session_change(Some(session("u1"))).await;

    tokio::time::sleep(ms(60_000)).await;
    assert!(!h.engine.state().sync.is_authenticated);
    assert!(h.remote.record("u1").is_none());

    h.store.update_crs(|crs| crs.age = 47);
    settle().await;
    let state = h.engine.state();
    assert!(state.sync.is_authenticated);
    assert_eq!(h.remote.record("u1").unwrap().crs_data.age, 47);
}

#[tokio::test(start_paused = true)]
async fn flush_before_load_reports_not_loaded() {
    let h = harness();
    h.remote.fail_next_reads(100);
    h.engine.handle_session_change(Some(session("u1"))).await;
    assert!(h.engine.is_attached());

    let err = h.engine.flush().await.unwrap_err();
    assert!(matches!(err, Error::Sync(SyncError::NotLoaded)), "{err}");
}

#[tokio::test(start_paused = true)]
async fn sign_out_after_failed_load_keeps_cached_input() {
    let cache = Arc::new(MemoryCache::with_profile(crs_with_age(44)));
    let store = Store::open(cache.clone());
    let remote = Arc::new(InMemoryRemote::new());
    let engine = SyncEngine::new(store, remote.clone(), SyncConfig::default());

    remote.fail_next_reads(1);
    engine.handle_session_change(Some(session("u1"))).await;
    engine.handle_session_change(None).await;

    let state = engine.state();
    assert_eq!(state.crs_data.age, 44);
    assert!(state.user_profile.is_guest());
    assert_eq!(cache.load().unwrap().unwrap().age, 44);
}

#[tokio::test(start_paused = true)]
async fn sign_out_resets_to_guest_and_detaches() {
    let h = harness();
    h.engine.handle_session_change(Some(session("u1"))).await;
    h.store.update_crs(|crs| crs.age = 48);
    h.engine.handle_session_change(None).await;

    let state = h.engine.state();
    assert!(state.user_profile.is_guest());
    assert_eq!(*state.crs_data, CrsProfile::default());
    assert!(state.assessment_history.is_empty());
    assert!(!state.sync.is_authenticated);
    assert_eq!(state.sync.last_synced_at, None);
    assert_eq!(state.phase, SyncPhase::Idle);
    assert!(!h.engine.is_attached());
    assert_eq!(h.store.listener_count(), 0);

    // The pending edit was cancelled along with the session.
    tokio::time::sleep(ms(10_000)).await;
    assert_eq!(h.remote.record("u1").unwrap().crs_data.age, 29);
}

#[tokio::test(start_paused = true)]
async fn no_session_at_startup_keeps_cached_input() {
    let cache = Arc::new(MemoryCache::with_profile(crs_with_age(44)));
    let store = Store::open(cache);
    let engine = SyncEngine::new(store, Arc::new(InMemoryRemote::new()), SyncConfig::default());

    engine.handle_session_change(None).await;
    let state = engine.state();
    assert_eq!(state.crs_data.age, 44);
    assert!(state.user_profile.is_guest());
}

#[tokio::test(start_paused = true)]
async fn switching_users_loads_the_new_users_record() {
    let h = harness();
    h.remote
        .external_write("u2", &patch_for("u2", crs_with_age(63)))
        .unwrap();

    h.engine.handle_session_change(Some(session("u1"))).await;
    h.store.update_crs(|crs| crs.age = 35);
    h.engine.flush().await.unwrap();

    h.engine.handle_session_change(Some(session("u2"))).await;
    let state = h.engine.state();
    assert_eq!(state.user_profile.uid, "u2");
    assert_eq!(state.crs_data.age, 63);
    assert_eq!(h.engine.current_uid().as_deref(), Some("u2"));

    // Edits now go to u2 only.
    h.store.update_crs(|crs| crs.age = 64);
    tokio::time::sleep(ms(2_000)).await;
    assert_eq!(h.remote.record("u2").unwrap().crs_data.age, 64);
    assert_eq!(h.remote.record("u1").unwrap().crs_data.age, 35);
}
