//! In-process session provider.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::{Session, SessionProvider, SessionStream};

#[derive(Default)]
struct ProviderState {
    current: Option<Session>,
    subscribers: Vec<mpsc::UnboundedSender<Option<Session>>>,
}

/// A [`SessionProvider`] driven by explicit `sign_in`/`sign_out` calls.
///
/// Used by the CLI and by tests in place of a hosted auth service.
#[derive(Default)]
pub struct LocalSessionProvider {
    state: Mutex<ProviderState>,
}

impl LocalSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) the session and notify subscribers.
    pub fn sign_in(&self, session: Session) {
        debug!(uid = %session.uid, "Signing in");
        self.publish(Some(session));
    }

    /// End the session and notify subscribers.
    pub fn sign_out(&self) {
        debug!("Signing out");
        self.publish(None);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn publish(&self, session: Option<Session>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.current = session.clone();
        state
            .subscribers
            .retain(|tx| tx.send(session.clone()).is_ok());
    }
}

impl SessionProvider for LocalSessionProvider {
    fn session_changes(&self) -> SessionStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if tx.send(state.current.clone()).is_ok() {
            state.subscribers.push(tx);
        }
        rx
    }

    fn current_session(&self) -> Option<Session> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }
}
