//! Per-connection session bookkeeping.

use crate::error::sync::SyncError;

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

/// Where a session is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Pushing snapshots and waiting for the client's replacement.
    Listening,
    /// The client's replacement was committed.
    Applied,
    Closed,
}

impl SessionPhase {
    /// Legal moves: `Listening → Applied → Closed` and `Listening → Closed`.
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::{Applied, Closed, Listening};

        matches!(
            (self, next),
            (Listening, Applied) | (Listening, Closed) | (Applied, Closed)
        )
    }
}

impl Display for SessionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            SessionPhase::Listening => "listening",
            SessionPhase::Applied => "applied",
            SessionPhase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a session ended when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client's replacement was committed as `revision`.
    Applied { revision: u64 },
    /// The client closed the connection.
    Disconnected,
    /// No inbound frame within the configured idle timeout.
    IdleTimeout,
    /// The hub is shutting down.
    HubShutdown,
}

impl Display for SessionEnd {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        match self {
            SessionEnd::Applied { revision } => write!(f, "applied revision {revision}"),
            SessionEnd::Disconnected => f.write_str("client disconnected"),
            SessionEnd::IdleTimeout => f.write_str("idle timeout"),
            SessionEnd::HubShutdown => f.write_str("hub shutdown"),
        }
    }
}

/// Ephemeral record of one connection. The id only exists for log correlation.
pub(crate) struct Session {
    id: Uuid,
    peer: SocketAddr,
    phase: SessionPhase,
}

impl Session {
    pub(crate) fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            phase: SessionPhase::Listening,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[track_caller]
    pub(crate) fn transition(&mut self, next: SessionPhase) -> Result<(), SyncError> {
        if !self.phase.can_transition_to(next) {
            return Err(SyncError::Transition {
                message: format!(
                    "session {} cannot move from {} to {}",
                    self.id, self.phase, next
                ),
                location: ErrorLocation::caller(),
            });
        }

        self.phase = next;
        Ok(())
    }

    /// Close the session. Idempotent.
    pub(crate) fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }
}

/// Counts a session as active for as long as the guard lives.
pub(crate) struct ActiveSession {
    counter: Arc<AtomicUsize>,
}

impl ActiveSession {
    pub(crate) fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
