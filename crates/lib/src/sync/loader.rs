//! Initial load of a signed-in user's remote record.
//!
//! When the first attempt fails, a [`LoadRetry`] keeps trying with the write
//! retry backoff until the session is loaded, either by a later attempt or by
//! the change listener's first snapshot. Once the attempts are spent it waits
//! for the next local edit and starts over, so a record that could not be
//! created at sign-in is still created and carries the user's edits.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{Instrument, debug, info, info_span, warn};

use super::{engine::SessionContext, error::SyncError, state::PhaseEvent};
use crate::{
    model::{AssessmentHistory, UserProfile},
    remote::{RecordPatch, RemoteRecord},
    session::Session,
    store::{AppState, Subscription},
};

/// How the initial load ended.
#[derive(Debug)]
pub(crate) enum LoadOutcome {
    /// An existing record was loaded.
    Loaded,
    /// No record existed; one was created from local state and loaded.
    Created,
    /// The load failed; the error is in `sync_error`.
    Failed,
    /// The session ended while the load was in flight.
    Stale,
}

impl LoadOutcome {
    pub(crate) fn is_stale(&self) -> bool {
        matches!(self, LoadOutcome::Stale)
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(self, LoadOutcome::Failed)
    }
}

/// Replace the synced entities with `record` and mark the session loaded.
pub(crate) fn apply_full_record(state: &mut AppState, record: RemoteRecord) {
    state.user_profile = Arc::new(record.user_profile);
    state.crs_data = Arc::new(record.crs_data);
    state.assessment_history = Arc::new(record.assessment_history);
    state.sync.is_authenticated = true;
    state.sync.sync_error = None;
    state.sync.advance_synced_at(record.updated_at);
}

/// Read the user's record, creating it first if it does not exist yet, and
/// seed the store with it.
pub(crate) async fn load_session(ctx: &SessionContext, session: &Session) -> LoadOutcome {
    match fetch_or_create(ctx, session).await {
        Ok(Some((record, created))) => {
            let stamp = record.updated_at;
            if !apply_loaded(ctx, record) {
                return LoadOutcome::Failed;
            }
            if created {
                info!(%stamp, "Created remote record for first sign-in");
                LoadOutcome::Created
            } else {
                info!(%stamp, "Loaded remote record");
                LoadOutcome::Loaded
            }
        }
        Ok(None) => LoadOutcome::Stale,
        Err(_) if !ctx.guard.is_current() => LoadOutcome::Stale,
        Err(err) => {
            warn!("Initial load failed: {err}");
            let message = err.user_message();
            ctx.store.update(|state| state.sync.sync_error = Some(message));
            LoadOutcome::Failed
        }
    }
}

/// Apply a loaded record inside the `ApplyingRemote` phase, so an attached
/// synchronizer does not push it straight back.
fn apply_loaded(ctx: &SessionContext, record: RemoteRecord) -> bool {
    if let Err(e) = ctx.store.transition(PhaseEvent::RemoteApplyStarted) {
        warn!("Cannot apply loaded record: {e}");
        return false;
    }
    ctx.store.update(|state| apply_full_record(state, record));
    if let Err(e) = ctx.store.transition(PhaseEvent::RemoteApplyFinished) {
        warn!("Unexpected phase after initial load: {e}");
    }
    true
}

/// `Ok(None)` when the session went stale while talking to the remote.
async fn fetch_or_create(
    ctx: &SessionContext,
    session: &Session,
) -> Result<Option<(RemoteRecord, bool)>, SyncError> {
    let existing = ctx
        .remote
        .get(&ctx.uid)
        .await
        .map_err(|e| SyncError::RemoteRead {
            key: ctx.uid.clone(),
            reason: e.to_string(),
        })?;
    if !ctx.guard.is_current() {
        return Ok(None);
    }
    if let Some(record) = existing {
        return Ok(Some((record, false)));
    }

    debug!("No remote record yet, creating one");
    let state = ctx.store.get_state();
    let patch = RecordPatch {
        user_profile: UserProfile::from_session(session),
        crs_data: (*state.crs_data).clone(),
        assessment_history: AssessmentHistory::new(),
    };
    let updated_at = ctx
        .remote
        .merge_write(&ctx.uid, &patch)
        .await
        .map_err(|e| SyncError::RecordCreate {
            key: ctx.uid.clone(),
            reason: e.to_string(),
        })?;
    if !ctx.guard.is_current() {
        return Ok(None);
    }
    Ok(Some((patch.into_record(updated_at), true)))
}

/// Handle to the task retrying a failed initial load. Dropping it detaches.
pub(crate) struct LoadRetry {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl LoadRetry {
    pub(crate) fn attach(ctx: SessionContext, session: Session) -> Self {
        let (edits, receiver) = mpsc::unbounded_channel();

        let guard = ctx.guard.clone();
        let subscription = ctx.store.subscribe(move |current, previous| {
            if guard.is_current()
                && !current.sync.is_authenticated
                && !current.is_applying_remote()
                && current.synced_fields_changed(previous)
            {
                let _ = edits.send(());
            }
        });

        let span = info_span!("load_retry", uid = %ctx.uid);
        let task = tokio::spawn(retry_load(ctx, session, receiver).instrument(span));
        Self { subscription, task }
    }

    pub(crate) fn detach(&self) {
        self.subscription.unsubscribe();
        self.task.abort();
    }
}

impl Drop for LoadRetry {
    fn drop(&mut self) {
        self.detach();
    }
}

async fn retry_load(
    ctx: SessionContext,
    session: Session,
    mut edits: mpsc::UnboundedReceiver<()>,
) {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match ctx.config.write_retry.delay_for(attempts) {
            Some(delay) => {
                debug!(attempt = attempts, ?delay, "Retrying initial load after backoff");
                sleep(delay).await;
            }
            None => {
                warn!(attempts, "Initial load still failing, waiting for the next edit");
                while edits.try_recv().is_ok() {}
                if edits.recv().await.is_none() {
                    return;
                }
                attempts = 0;
            }
        }

        if !ctx.guard.is_current() {
            return;
        }
        if ctx.store.get_state().sync.is_authenticated {
            debug!("Session was loaded from the change stream");
            return;
        }
        if !load_session(&ctx, &session).await.is_failed() {
            return;
        }
    }
}
