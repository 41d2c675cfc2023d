//! Driving the engine from a session provider.

use crs_sync::{
    SessionMonitor,
    session::{LocalSessionProvider, Session, SessionProvider},
};
use tokio::time::sleep;

use crate::helpers::*;

#[tokio::test(start_paused = true)]
async fn follows_sign_in_and_sign_out() {
    let h = harness();
    let provider = LocalSessionProvider::new();
    let monitor = SessionMonitor::start(&provider, h.engine.clone());
    settle().await;
    assert!(monitor.is_running());
    assert!(!h.engine.is_attached());

    provider.sign_in(Session::new("u1").with_display_name("Ada"));
    settle().await;
    assert_eq!(h.engine.current_uid().as_deref(), Some("u1"));
    assert_eq!(h.engine.state().user_profile.display_name, "Ada");

    h.store.update_crs(|crs| crs.age = 36);
    sleep(ms(2_000)).await;
    assert_eq!(h.remote.record("u1").unwrap().crs_data.age, 36);

    provider.sign_out();
    settle().await;
    assert!(!h.engine.is_attached());
    assert!(h.engine.state().user_profile.is_guest());
}

#[tokio::test(start_paused = true)]
async fn rapid_session_changes_end_on_the_last_one() {
    let h = harness();
    h.remote.set_read_latency(ms(500));
    let provider = LocalSessionProvider::new();
    let _monitor = SessionMonitor::start(&provider, h.engine.clone());

    provider.sign_in(session("u1"));
    provider.sign_in(session("u2"));
    provider.sign_out();
    provider.sign_in(session("u3"));
    sleep(ms(10_000)).await;

    assert_eq!(h.engine.current_uid().as_deref(), Some("u3"));
    let state = h.engine.state();
    assert_eq!(state.user_profile.uid, "u3");
    assert!(state.sync.is_authenticated);
    assert_eq!(h.store.listener_count(), 1);
    assert_eq!(h.remote.subscriber_count("u1"), 0);
    assert_eq!(h.remote.subscriber_count("u2"), 0);
    assert_eq!(h.remote.subscriber_count("u3"), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_detaches_and_ignores_later_changes() {
    let h = harness();
    let provider = LocalSessionProvider::new();
    provider.sign_in(session("u1"));
    let monitor = SessionMonitor::start(&provider, h.engine.clone());
    settle().await;
    assert!(h.engine.is_attached());

    monitor.stop();
    settle().await;
    assert!(!monitor.is_running());
    assert!(!h.engine.is_attached());
    // Store contents are kept.
    assert_eq!(h.engine.state().user_profile.uid, "u1");

    provider.sign_in(session("u2"));
    settle().await;
    assert!(!h.engine.is_attached());
    assert!(h.remote.record("u2").is_none());
    assert_eq!(provider.subscriber_count(), 0);
    assert!(provider.current_session().is_some());
}
