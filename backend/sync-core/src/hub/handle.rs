//! Handle to a running hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::warn;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running state sync hub.
///
/// Returned by [`start_sync_hub`](crate::hub::start_sync_hub).
///
/// # Lifecycle
///
/// The hub runs until [`shutdown`](Self::shutdown) is called or the handle is
/// dropped. Either way the accept loop stops and every live session is told to
/// close; `shutdown` additionally waits until they have.
pub struct SyncHubHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    active_sessions: Arc<AtomicUsize>,
}

impl SyncHubHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        shutdown_tx: watch::Sender<bool>,
        accept_task: JoinHandle<()>,
        active_sessions: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            local_addr,
            shutdown_tx,
            accept_task,
            active_sessions,
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sessions whose send task has not yet been torn down.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    /// Stop accepting, close every session, and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.accept_task.await {
            warn!("State sync hub accept loop ended abnormally: {e}");
        }
    }
}
