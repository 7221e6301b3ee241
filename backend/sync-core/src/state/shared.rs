use crate::error::state::StateError;
use crate::state::listener::ChangeListener;
use crate::state::{SyncState, decode_candidate};

use common::ErrorLocation;

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot, watch};

/// Commands that mutate shared state.
#[derive(Debug)]
enum StateCommand<S> {
    /// Validate and commit a full replacement, replying with the new revision.
    Apply {
        candidate: S,
        reply: oneshot::Sender<Result<u64, StateError>>,
    },
}

/// The single mutable state object owned by the host.
///
/// # Thread Safety
///
/// This type is `Clone` and can be shared across tasks. All clones share the
/// same underlying value, commit actor and change channel.
#[derive(Clone)]
pub struct SharedState<S: SyncState> {
    /// Channel to send commit commands to the actor
    command_tx: Arc<Mutex<Option<mpsc::Sender<StateCommand<S>>>>>,

    /// Current committed value
    current: Arc<RwLock<S>>,

    /// Revision counter; every commit bumps it exactly once
    revision_tx: Arc<watch::Sender<u64>>,

    /// Track if actor initialized
    actor_init: Arc<Mutex<bool>>,
}

impl<S: SyncState> SharedState<S> {
    /// Wrap an initial value.
    ///
    /// The actor is spawned lazily on the first [`apply`](Self::apply), so this
    /// can be called outside a runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Validation`] if `initial` is not well-formed.
    pub fn new(initial: S) -> Result<Self, StateError> {
        initial.validate()?;

        let (revision_tx, _) = watch::channel(0);

        Ok(Self {
            command_tx: Arc::new(Mutex::new(None)),
            current: Arc::new(RwLock::new(initial)),
            revision_tx: Arc::new(revision_tx),
            actor_init: Arc::new(Mutex::new(false)),
        })
    }

    /// Independent copy of the committed value.
    pub async fn snapshot(&self) -> S {
        self.current.read().await.clone()
    }

    /// Number of commits since construction.
    pub fn revision(&self) -> u64 {
        *self.revision_tx.borrow()
    }

    /// Register a change listener.
    pub fn subscribe(&self) -> ChangeListener {
        ChangeListener::new(self.revision_tx.subscribe())
    }

    /// Validate `candidate` and, if it holds, replace the current value.
    ///
    /// Commits from concurrent callers are serialized by the actor; the last
    /// one to reach it wins.
    ///
    /// # Errors
    ///
    /// - [`StateError::Validation`] if the candidate is rejected (state unchanged)
    /// - [`StateError::Actor`] if the commit actor is gone
    pub async fn apply(&self, candidate: S) -> Result<u64, StateError> {
        self.ensure_actor().await;

        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let tx_guard = self.command_tx.lock().await;
            let tx = tx_guard.as_ref().ok_or_else(|| StateError::Actor {
                message: "State actor not initialized".to_string(),
                location: ErrorLocation::caller(),
            })?;

            tx.send(StateCommand::Apply {
                candidate,
                reply: reply_tx,
            })
            .await
            .map_err(|e| StateError::Actor {
                message: format!("State actor died: {e}"),
                location: ErrorLocation::caller(),
            })?;
        }

        reply_rx.await.map_err(|e| StateError::Actor {
            message: format!("State actor dropped reply: {e}"),
            location: ErrorLocation::caller(),
        })?
    }

    /// Decode a raw client payload and [`apply`](Self::apply) it.
    ///
    /// # Errors
    ///
    /// Adds [`StateError::Decode`] for payloads that are not a complete document.
    pub async fn apply_json(&self, payload: &[u8]) -> Result<u64, StateError> {
        let candidate = decode_candidate::<S>(payload)?;
        self.apply(candidate).await
    }

    /// Edit a copy of the current value and commit it through [`apply`](Self::apply).
    ///
    /// Meant for host-side changes. Not atomic with respect to other writers.
    pub async fn modify<F>(&self, edit: F) -> Result<u64, StateError>
    where
        F: FnOnce(&mut S),
    {
        let mut candidate = self.snapshot().await;
        edit(&mut candidate);
        self.apply(candidate).await
    }

    /// Ensure actor is spawned (lazy init).
    async fn ensure_actor(&self) {
        let mut init_guard = self.actor_init.lock().await;
        if !*init_guard {
            let (tx, rx) = mpsc::channel(32);

            // Store tx BEFORE spawning
            let mut tx_guard = self.command_tx.lock().await;
            *tx_guard = Some(tx);
            drop(tx_guard);

            tokio::spawn(state_actor(
                rx,
                Arc::clone(&self.current),
                Arc::clone(&self.revision_tx),
            ));

            *init_guard = true;
            info!("Shared state actor spawned");
        }
    }
}

/// Commit actor task.
///
/// Runs until every [`SharedState`] handle is dropped.
async fn state_actor<S: SyncState>(
    mut command_rx: mpsc::Receiver<StateCommand<S>>,
    current: Arc<RwLock<S>>,
    revision_tx: Arc<watch::Sender<u64>>,
) {
    info!("Shared state actor started");

    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            StateCommand::Apply { candidate, reply } => {
                let result = commit(&current, &revision_tx, candidate).await;

                if let Err(ref e) = result {
                    warn!("Rejected state candidate: {e}");
                }

                // The caller may have given up waiting; the commit stands either way.
                let _ = reply.send(result);
            }
        }
    }

    info!("Shared state actor stopped");
}

async fn commit<S: SyncState>(
    current: &RwLock<S>,
    revision_tx: &watch::Sender<u64>,
    candidate: S,
) -> Result<u64, StateError> {
    // Validate first (before any changes)
    candidate.validate()?;

    {
        let mut current_write = current.write().await;
        *current_write = candidate;
    }

    // Signal after the lock is released so woken listeners read the new value.
    revision_tx.send_modify(|revision| *revision += 1);
    let revision = *revision_tx.borrow();
    debug!("Committed state revision {revision}");

    Ok(revision)
}
