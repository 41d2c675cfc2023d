/*! Integration tests for crs-sync.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - store: Tests for the reactive Store and its local cache
 * - session: Tests for the initial load on sign-in, sign-out and user switches
 * - writer: Tests for the debounced write-behind synchronizer
 * - listener: Tests for merging remote snapshots and reconnecting
 * - monitor: Tests for driving the engine from a session provider
 *
 * Most tests run on a paused Tokio clock, so debounce and backoff timings are
 * exact and the suite does not actually sleep.
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("crs_sync=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod helpers;
mod listener;
mod monitor;
mod session;
