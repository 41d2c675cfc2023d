//! The sync engine: one object owning everything a signed-in session needs.
//!
//! A session goes through three steps, always in this order:
//!
//! 1. teardown of whatever the previous session attached,
//! 2. the initial load (see [`loader`](super::loader)),
//! 3. attaching the [`ChangeListener`] and the [`WriteBehind`] synchronizer.
//!
//! Every teardown bumps the engine's epoch. Tasks capture the epoch they were
//! started under in an [`EpochGuard`] and drop whatever they were doing once it
//! no longer matches, so nothing from session N can land in session N+1.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::oneshot;
use tracing::{Instrument, debug, info, info_span};

use super::{
    config::SyncConfig,
    error::SyncError,
    listener::ChangeListener,
    loader::{self, LoadRetry},
    state::{PhaseEvent, SyncPhase},
    writer::{WriteBehind, WriterCommand},
};
use crate::{
    Result,
    remote::RemoteStore,
    session::Session,
    store::{AppState, Store},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The session epoch a task was started under.
#[derive(Debug, Clone)]
pub(crate) struct EpochGuard {
    counter: Arc<AtomicU64>,
    epoch: u64,
}

impl EpochGuard {
    /// Capture the counter's current value.
    pub(crate) fn new(counter: Arc<AtomicU64>) -> Self {
        let epoch = counter.load(Ordering::Acquire);
        Self { counter, epoch }
    }

    /// False once the engine has been torn down since this guard was taken.
    pub(crate) fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.epoch
    }
}

/// Everything a session-scoped task needs.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) uid: String,
    pub(crate) guard: EpochGuard,
    pub(crate) store: Store,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) config: SyncConfig,
}

/// Listener and synchronizer attached for one session, plus the load retry
/// when the initial load failed.
struct ActiveSession {
    uid: String,
    writer: WriteBehind,
    listener: ChangeListener,
    load_retry: Option<LoadRetry>,
}

impl ActiveSession {
    fn detach(&self) {
        self.writer.detach();
        self.listener.detach();
        if let Some(retry) = &self.load_retry {
            retry.detach();
        }
    }
}

struct EngineInner {
    store: Store,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    epoch: Arc<AtomicU64>,
    active: Mutex<Option<ActiveSession>>,
    /// Uid of the last signed-in session, whether or not its load succeeded
    session_uid: Mutex<Option<String>>,
}

/// Keeps the store and the signed-in user's remote record consistent.
///
/// Cloning is cheap; clones drive the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("epoch", &self.epoch())
            .field("attached", &self.current_uid())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SyncEngine {
    pub fn new(store: Store, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                remote,
                config,
                epoch: Arc::new(AtomicU64::new(0)),
                active: Mutex::new(None),
                session_uid: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Snapshot of the store.
    pub fn state(&self) -> AppState {
        self.inner.store.get_state()
    }

    /// Current session epoch. Bumped by every teardown.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    /// Whether a listener and synchronizer are attached.
    pub fn is_attached(&self) -> bool {
        lock(&self.inner.active).is_some()
    }

    /// Uid of the attached session.
    pub fn current_uid(&self) -> Option<String> {
        lock(&self.inner.active).as_ref().map(|s| s.uid.clone())
    }

    /// React to a session change reported by the auth provider.
    ///
    /// Never fails: remote errors end up in `sync_error`. Callers must not run
    /// two of these concurrently; [`SessionMonitor`](super::SessionMonitor)
    /// serializes them.
    pub async fn handle_session_change(&self, session: Option<Session>) {
        self.teardown();

        let Some(session) = session else {
            lock(&self.inner.session_uid).take();
            // Only a loaded user's data is wiped; unsynced guest input stays.
            if self.inner.store.get_state().sync.is_authenticated {
                info!("Signed out, resetting to guest state");
                self.inner.store.reset_to_guest();
            } else {
                debug!("No loaded session");
                self.inner.store.clear_session();
            }
            return;
        };

        let span = info_span!("session", uid = %session.uid);
        async {
            let previous = lock(&self.inner.session_uid).replace(session.uid.clone());
            if previous.is_some_and(|uid| uid != session.uid) {
                debug!("Different user signed in, clearing previous user's state");
                self.inner.store.reset_to_guest();
            }

            let ctx = self.session_context(&session.uid);
            let outcome = loader::load_session(&ctx, &session).await;
            if outcome.is_stale() {
                debug!("Session superseded during initial load");
                return;
            }
            debug!(?outcome, "Initial load finished");
            let retry = outcome.is_failed().then(|| (ctx.clone(), session.clone()));
            self.attach(ctx, retry);
        }
        .instrument(span)
        .await
    }

    /// Detach the listener and synchronizer of the current session.
    ///
    /// Bumps the epoch first, then cancels pending writes and the change
    /// stream, and returns the phase to idle. Calling it again is harmless.
    pub fn teardown(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        let detached = lock(&self.inner.active).take();
        if let Some(session) = detached {
            session.detach();
            info!(uid = %session.uid, "Detached sync session");
        }
        if self.inner.store.get_state().phase != SyncPhase::Idle {
            // Reset is accepted from every phase.
            let _ = self.inner.store.transition(PhaseEvent::Reset);
        }
    }

    /// Push any pending local changes now instead of waiting for the debounce.
    ///
    /// Fails with [`SyncError::NotLoaded`] while the session's record has not
    /// been loaded, since edits cannot be pushed yet.
    pub async fn flush(&self) -> Result<()> {
        let commands = lock(&self.inner.active)
            .as_ref()
            .map(|session| session.writer.commands())
            .ok_or(SyncError::NotAttached)?;
        if !self.inner.store.get_state().sync.is_authenticated {
            return Err(SyncError::NotLoaded.into());
        }
        let (reply, response) = oneshot::channel();
        commands
            .send(WriterCommand::Flush(reply))
            .map_err(|_| SyncError::NotAttached)?;
        response.await.map_err(|_| SyncError::NotAttached)?
    }

    fn session_context(&self, uid: &str) -> SessionContext {
        SessionContext {
            uid: uid.to_string(),
            guard: EpochGuard::new(self.inner.epoch.clone()),
            store: self.inner.store.clone(),
            remote: self.inner.remote.clone(),
            config: self.inner.config.clone(),
        }
    }

    fn attach(&self, ctx: SessionContext, retry: Option<(SessionContext, Session)>) {
        let mut active = lock(&self.inner.active);
        if !ctx.guard.is_current() {
            return;
        }
        info!("Attaching change listener and write-behind synchronizer");
        *active = Some(ActiveSession {
            uid: ctx.uid.clone(),
            writer: WriteBehind::attach(ctx.clone()),
            listener: ChangeListener::attach(ctx),
            load_retry: retry.map(|(ctx, session)| LoadRetry::attach(ctx, session)),
        });
    }
}
