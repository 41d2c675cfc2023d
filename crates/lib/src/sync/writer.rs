//! Write-behind synchronizer.
//!
//! A store listener filters mutations and forwards the qualifying ones to a
//! background task over a channel. The task keeps a single deadline: every
//! forwarded change pushes it out to `now + debounce`, so a burst of edits
//! becomes one merge-write carrying the state after the last edit.
//!
//! Failed writes set `sync_error` and are retried with bounded exponential
//! backoff. A fresh edit re-arms the debounce and restarts the attempt count.
//! Every attempt writes the full current state, so edits made between a
//! failure and its retry are never lost.

use std::future::pending;

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{Instrument, debug, info_span, trace, warn};

use super::{
    engine::{EpochGuard, SessionContext},
    error::SyncError,
    state::PhaseEvent,
};
use crate::{
    Result,
    remote::RecordPatch,
    store::{AppState, Subscription},
};

/// Messages to the writer task.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// A qualifying local change happened.
    Changed,
    /// Write pending changes now and report the result.
    Flush(oneshot::Sender<Result<()>>),
}

/// What one write attempt amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    /// A remote merge held the phase; try again after another debounce.
    Busy,
    /// The session ended; nothing to do.
    Stale,
}

/// Whether a store notification should schedule an outbound write.
fn qualifies(guard: &EpochGuard, current: &AppState, previous: &AppState) -> bool {
    guard.is_current()
        && !current.is_applying_remote()
        && current.sync.is_authenticated
        && current.synced_fields_changed(previous)
}

/// Handle to an attached synchronizer. Dropping it detaches.
pub(crate) struct WriteBehind {
    subscription: Subscription,
    task: JoinHandle<()>,
    commands: mpsc::UnboundedSender<WriterCommand>,
}

impl WriteBehind {
    pub(crate) fn attach(ctx: SessionContext) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();

        let guard = ctx.guard.clone();
        let forward = commands.clone();
        let subscription = ctx.store.subscribe(move |current, previous| {
            if qualifies(&guard, current, previous) {
                let _ = forward.send(WriterCommand::Changed);
            }
        });

        let span = info_span!("write_behind", uid = %ctx.uid);
        let task = tokio::spawn(
            WriterTask {
                ctx,
                commands: receiver,
                deadline: None,
                attempts: 0,
            }
            .run()
            .instrument(span),
        );

        Self {
            subscription,
            task,
            commands,
        }
    }

    pub(crate) fn commands(&self) -> mpsc::UnboundedSender<WriterCommand> {
        self.commands.clone()
    }

    /// Unsubscribe from the store and cancel the task with its deadline.
    pub(crate) fn detach(&self) {
        self.subscription.unsubscribe();
        self.task.abort();
    }
}

impl Drop for WriteBehind {
    fn drop(&mut self) {
        self.detach();
    }
}

struct WriterTask {
    ctx: SessionContext,
    commands: mpsc::UnboundedReceiver<WriterCommand>,
    deadline: Option<Instant>,
    /// Failed attempts since the last edit
    attempts: u32,
}

impl WriterTask {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            let expired = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(WriterCommand::Changed) => {
                        self.attempts = 0;
                        self.arm(self.ctx.config.debounce);
                        trace!("Local change, write deadline re-armed");
                    }
                    Some(WriterCommand::Flush(reply)) => {
                        let result = if self.deadline.take().is_some() {
                            self.write_and_schedule().await
                        } else {
                            Ok(())
                        };
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                _ = expired => {
                    self.deadline = None;
                    let _ = self.write_and_schedule().await;
                }
            }
        }
    }

    fn arm(&mut self, delay: std::time::Duration) {
        self.deadline = Some(Instant::now() + delay);
    }

    /// One write attempt plus whatever follow-up it requires.
    async fn write_and_schedule(&mut self) -> Result<()> {
        match write_once(&self.ctx).await {
            Ok(WriteOutcome::Written) | Ok(WriteOutcome::Stale) => {
                self.attempts = 0;
                Ok(())
            }
            Ok(WriteOutcome::Busy) => {
                self.arm(self.ctx.config.debounce);
                Ok(())
            }
            Err(err) => {
                self.attempts += 1;
                match self.ctx.config.write_retry.delay_for(self.attempts) {
                    Some(delay) => {
                        warn!(attempt = self.attempts, ?delay, "{err}, retrying");
                        self.arm(delay);
                    }
                    None => {
                        warn!(
                            attempts = self.attempts,
                            "{err}, giving up until the next edit"
                        );
                        self.attempts = 0;
                    }
                }
                Err(err.into())
            }
        }
    }
}

/// Push the current synced subset once.
async fn write_once(ctx: &SessionContext) -> std::result::Result<WriteOutcome, SyncError> {
    if !ctx.guard.is_current() {
        return Ok(WriteOutcome::Stale);
    }
    if let Err(e) = ctx.store.transition(PhaseEvent::WriteStarted) {
        debug!("Deferring write: {e}");
        return Ok(WriteOutcome::Busy);
    }

    let patch = RecordPatch::from_state(&ctx.store.get_state());
    let result = ctx.remote.merge_write(&ctx.uid, &patch).await;
    if !ctx.guard.is_current() {
        debug!("Discarding write result from an ended session");
        return Ok(WriteOutcome::Stale);
    }
    if let Err(e) = ctx.store.transition(PhaseEvent::WriteFinished) {
        warn!("Unexpected phase after write: {e}");
    }

    match result {
        Ok(updated_at) => {
            debug!(%updated_at, "Pushed local changes");
            ctx.store.update(|state| {
                state.sync.advance_synced_at(updated_at);
                state.sync.sync_error = None;
            });
            Ok(WriteOutcome::Written)
        }
        Err(e) => {
            let err = SyncError::RemoteWrite {
                key: ctx.uid.clone(),
                reason: e.to_string(),
            };
            let message = err.user_message();
            ctx.store.update(|state| state.sync.sync_error = Some(message));
            Err(err)
        }
    }
}
