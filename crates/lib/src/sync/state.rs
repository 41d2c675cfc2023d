//! Coordination state between the inbound and outbound sync paths.
//!
//! The store carries a [`SyncPhase`]. The change listener moves it into
//! `ApplyingRemote` for the whole duration of a merge, and the write-behind
//! synchronizer ignores every store notification raised in that phase. Every
//! path that wants to mutate the phase goes through [`SyncPhase::next`], so an
//! additional writer cannot slip a change past the loop guard.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::SyncError;

/// What the sync engine is currently doing to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum SyncPhase {
    /// No remote merge or outbound write in progress.
    #[default]
    Idle,
    /// A remote snapshot is being merged into the store.
    ///
    /// `write_in_flight` remembers whether an outbound write was pending when
    /// the merge started, so the phase can return to `Writing` afterwards.
    ApplyingRemote { write_in_flight: bool },
    /// An outbound write has been issued and not yet answered.
    Writing,
}

/// Transition requests accepted by [`SyncPhase::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    RemoteApplyStarted,
    RemoteApplyFinished,
    WriteStarted,
    WriteFinished,
    /// Session teardown; always returns to `Idle`.
    Reset,
}

impl SyncPhase {
    /// Compute the phase that follows `event`.
    ///
    /// | from                      | event               | to                        |
    /// |---------------------------|---------------------|---------------------------|
    /// | Idle                      | RemoteApplyStarted  | ApplyingRemote(false)     |
    /// | Writing                   | RemoteApplyStarted  | ApplyingRemote(true)      |
    /// | ApplyingRemote(false)     | RemoteApplyFinished | Idle                      |
    /// | ApplyingRemote(true)      | RemoteApplyFinished | Writing                   |
    /// | Idle                      | WriteStarted        | Writing                   |
    /// | Writing                   | WriteFinished       | Idle                      |
    /// | ApplyingRemote(true)      | WriteFinished       | ApplyingRemote(false)     |
    /// | any                       | Reset               | Idle                      |
    ///
    /// Everything else is rejected with [`SyncError::InvalidPhaseTransition`].
    pub fn next(self, event: PhaseEvent) -> Result<SyncPhase, SyncError> {
        use PhaseEvent::*;
        use SyncPhase::*;

        match (self, event) {
            (_, Reset) => Ok(Idle),
            (Idle, RemoteApplyStarted) => Ok(ApplyingRemote {
                write_in_flight: false,
            }),
            (Writing, RemoteApplyStarted) => Ok(ApplyingRemote {
                write_in_flight: true,
            }),
            (ApplyingRemote { write_in_flight }, RemoteApplyFinished) => {
                Ok(if write_in_flight { Writing } else { Idle })
            }
            (Idle, WriteStarted) => Ok(Writing),
            (Writing, WriteFinished) => Ok(Idle),
            (
                ApplyingRemote {
                    write_in_flight: true,
                },
                WriteFinished,
            ) => Ok(ApplyingRemote {
                write_in_flight: false,
            }),
            (from, event) => Err(SyncError::InvalidPhaseTransition { from, event }),
        }
    }

    /// Whether a remote merge is in progress. Local-change observers must
    /// ignore notifications while this is true.
    pub fn is_applying_remote(&self) -> bool {
        matches!(self, SyncPhase::ApplyingRemote { .. })
    }

    /// Whether an outbound write is awaiting its response.
    pub fn is_writing(&self) -> bool {
        matches!(
            self,
            SyncPhase::Writing
                | SyncPhase::ApplyingRemote {
                    write_in_flight: true
                }
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Idle => write!(f, "idle"),
            SyncPhase::ApplyingRemote {
                write_in_flight: false,
            } => write!(f, "applying-remote"),
            SyncPhase::ApplyingRemote {
                write_in_flight: true,
            } => write!(f, "applying-remote (write in flight)"),
            SyncPhase::Writing => write!(f, "writing"),
        }
    }
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseEvent::RemoteApplyStarted => "remote-apply-started",
            PhaseEvent::RemoteApplyFinished => "remote-apply-finished",
            PhaseEvent::WriteStarted => "write-started",
            PhaseEvent::WriteFinished => "write-finished",
            PhaseEvent::Reset => "reset",
        };
        f.write_str(name)
    }
}
