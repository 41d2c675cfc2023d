//! Change listener: merges remote snapshots into the store.
//!
//! Snapshots stamped at or before `last_synced_at` are dropped, which covers
//! the echo of this engine's own writes. Newer snapshots are merged inside the
//! `ApplyingRemote` phase so the write-behind synchronizer does not bounce them
//! back.
//!
//! A failed or closed stream sets the connection-lost error and resubscribes
//! with bounded backoff.

use std::sync::Arc;

use tokio::{task::JoinHandle, time::sleep};
use tracing::{Instrument, debug, info, info_span, warn};

use super::{
    engine::SessionContext, error::SyncError, loader::apply_full_record, state::PhaseEvent,
};
use crate::{constants::CONNECTION_LOST_MESSAGE, remote::RemoteRecord};

/// Handle to the listener task. Dropping it detaches.
pub(crate) struct ChangeListener {
    task: JoinHandle<()>,
}

impl ChangeListener {
    pub(crate) fn attach(ctx: SessionContext) -> Self {
        let span = info_span!("change_listener", uid = %ctx.uid);
        Self {
            task: tokio::spawn(listen(ctx).instrument(span)),
        }
    }

    pub(crate) fn detach(&self) {
        self.task.abort();
    }
}

impl Drop for ChangeListener {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn listen(ctx: SessionContext) {
    let mut failures = 0u32;
    loop {
        let reason = match ctx.remote.subscribe(&ctx.uid).await {
            Ok(mut stream) => {
                if !ctx.guard.is_current() {
                    return;
                }
                if failures > 0 {
                    info!(failures, "Reconnected to change stream");
                    clear_connection_error(&ctx);
                }
                failures = 0;

                loop {
                    match stream.recv().await {
                        Some(Ok(record)) => apply_snapshot(&ctx, record),
                        Some(Err(e)) => break e.to_string(),
                        None => break "stream closed".to_string(),
                    }
                }
            }
            Err(e) => e.to_string(),
        };
        if !ctx.guard.is_current() {
            return;
        }

        let err = SyncError::ListenerDisconnected {
            key: ctx.uid.clone(),
            reason,
        };
        warn!("{err}");
        let message = err.user_message();
        ctx.store.update(|state| state.sync.sync_error = Some(message));

        failures += 1;
        match ctx.config.reconnect.delay_for(failures) {
            Some(delay) => {
                debug!(attempt = failures, ?delay, "Resubscribing after backoff");
                sleep(delay).await;
            }
            None => {
                warn!(failures, "Giving up on change stream");
                return;
            }
        }
    }
}

fn clear_connection_error(ctx: &SessionContext) {
    let lost = ctx.store.get_state().sync.sync_error.as_deref() == Some(CONNECTION_LOST_MESSAGE);
    if lost {
        ctx.store.update(|state| {
            if state.sync.sync_error.as_deref() == Some(CONNECTION_LOST_MESSAGE) {
                state.sync.sync_error = None;
            }
        });
    }
}

/// Merge one snapshot into the store if it is newer than anything seen.
fn apply_snapshot(ctx: &SessionContext, record: RemoteRecord) {
    if !ctx.guard.is_current() {
        return;
    }
    let state = ctx.store.get_state();
    if !state.sync.is_newer(&record.updated_at) {
        debug!(updated_at = %record.updated_at, "Discarding snapshot that is not newer");
        return;
    }
    if let Err(e) = ctx.store.transition(PhaseEvent::RemoteApplyStarted) {
        warn!("Cannot apply remote snapshot: {e}");
        return;
    }

    // Without a successful initial load the first snapshot stands in for it.
    let full_load = !state.sync.is_authenticated;
    debug!(updated_at = %record.updated_at, full_load, "Applying remote snapshot");
    ctx.store.update(|state| {
        if !state.sync.is_newer(&record.updated_at) {
            return;
        }
        if full_load {
            apply_full_record(state, record);
        } else {
            state.crs_data = Arc::new(record.crs_data);
            state.assessment_history = Arc::new(record.assessment_history);
            state.sync.advance_synced_at(record.updated_at);
        }
    });

    if let Err(e) = ctx.store.transition(PhaseEvent::RemoteApplyFinished) {
        warn!("Unexpected phase after remote merge: {e}");
    }
}
