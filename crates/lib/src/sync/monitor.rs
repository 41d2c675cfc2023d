//! Session monitor: drives the engine from the auth provider's session stream.

use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};

use super::engine::SyncEngine;
use crate::session::SessionProvider;

/// Background task feeding session changes into a [`SyncEngine`].
///
/// Changes are handled one at a time: teardown and setup for one change
/// finish before the next change is looked at. Dropping the monitor stops it.
pub struct SessionMonitor {
    engine: SyncEngine,
    task: JoinHandle<()>,
}

impl SessionMonitor {
    /// Subscribe to `provider` and start handling session changes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(provider: &dyn SessionProvider, engine: SyncEngine) -> Self {
        let mut changes = provider.session_changes();
        let worker = engine.clone();
        let task = tokio::spawn(
            async move {
                info!("Session monitor started");
                while let Some(session) = changes.recv().await {
                    worker.handle_session_change(session).await;
                }
                info!("Session stream ended");
            }
            .instrument(info_span!("session_monitor")),
        );
        Self { engine, task }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Whether the monitor task is still consuming session changes.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop consuming session changes and detach the current session.
    ///
    /// The store keeps its current contents.
    pub fn stop(&self) {
        self.task.abort();
        self.engine.teardown();
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("engine", &self.engine)
            .field("running", &self.is_running())
            .finish()
    }
}
