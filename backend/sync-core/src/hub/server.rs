//! State sync WebSocket server implementation.
//!
//! The server:
//!
//! - Upgrades only the configured path (404 for anything else)
//! - Pushes the current snapshot as a JSON text frame on connect
//! - Re-pushes the newest snapshot whenever the shared state commits
//! - Accepts one full replacement per connection, commits it, records it,
//!   then closes the connection
//!
//! # Errors
//!
//! Every failure is scoped to the session that hit it. The accept loop keeps
//! serving other connections regardless of how a session ends.

use crate::error::persistence::PersistenceError;
use crate::error::sync::SyncError;
use crate::hub::config::HubConfig;
use crate::hub::handle::SyncHubHandle;
use crate::hub::session::{ActiveSession, Session, SessionEnd, SessionPhase};
use crate::persistence::PersistenceSink;
use crate::state::{ChangeListener, SharedState, SyncState, decode_candidate};

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn as TokioSpawn;
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinHandle, JoinSet, spawn_blocking};
use tokio_tungstenite::tungstenite::Error as TungsteniteError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use uuid::Uuid;

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Everything a session needs from the hub.
struct HubContext<S: SyncState> {
    config: HubConfig,
    state: SharedState<S>,
    sink: Arc<dyn PersistenceSink<S>>,
    active_sessions: Arc<AtomicUsize>,
    /// Held across apply and record so disk order matches commit order.
    commit_lock: Mutex<()>,
}

/// What the receive loop produced.
enum Inbound<S> {
    /// A fully decoded replacement, not yet validated.
    Candidate(S),
    Ended(SessionEnd),
}

/// One read from the socket, or the idle timer firing first.
enum Frame {
    Message(Option<Result<Message, TungsteniteError>>),
    IdleTimeout,
}

/// Starts the state sync hub.
///
/// Binds `config.host:config.port` and spawns the accept loop in the
/// background. Each accepted connection becomes a session that mirrors `state`
/// and may submit one replacement, which is recorded through `sink`.
///
/// # Errors
///
/// - [`SyncError::Config`] if `config` fails validation
/// - [`SyncError::Io`] if the address cannot be bound
pub async fn start_sync_hub<S: SyncState>(
    config: HubConfig,
    state: SharedState<S>,
    sink: Arc<dyn PersistenceSink<S>>,
) -> Result<SyncHubHandle, SyncError> {
    config.validate()?;

    let listener = TcpListener::bind(config.address()).await?;
    let local_addr = listener.local_addr()?;

    info!("State sync hub listening on ws://{}{}", local_addr, config.path);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let active_sessions = Arc::new(AtomicUsize::new(0));

    let hub = Arc::new(HubContext {
        config,
        state,
        sink,
        active_sessions: Arc::clone(&active_sessions),
        commit_lock: Mutex::new(()),
    });

    let accept_task = TokioSpawn(accept_loop(listener, hub, shutdown_rx));

    Ok(SyncHubHandle::new(
        local_addr,
        shutdown_tx,
        accept_task,
        active_sessions,
    ))
}

/// Accepts connections until the handle asks for shutdown (or is dropped),
/// then waits for every session to finish.
async fn accept_loop<S: SyncState>(
    listener: TcpListener,
    hub: Arc<HubContext<S>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("Client connecting from {}", addr);
                    sessions.spawn(run_session(
                        stream,
                        addr,
                        Arc::clone(&hub),
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => {
                    // Usually fd exhaustion; retrying at once would spin.
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    info!(
        "State sync hub shutting down, closing {} session(s)",
        sessions.len()
    );
    while sessions.join_next().await.is_some() {}
    info!("State sync hub stopped");
}

/// Runs one session to completion and logs how it ended.
async fn run_session<S: SyncState>(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<HubContext<S>>,
    hub_shutdown: watch::Receiver<bool>,
) {
    let _active = ActiveSession::enter(Arc::clone(&hub.active_sessions));
    let mut session = Session::new(addr);

    let result = handle_connection(stream, &hub, &mut session, hub_shutdown).await;
    session.close();

    match result {
        Ok(end) => info!(
            "Session {} ({}) {} after {}",
            session.id(),
            session.peer(),
            session.phase(),
            end
        ),
        Err(SyncError::Persistence(e)) => error!(
            "Session {} ({}) committed its update but recording it failed: {}",
            session.id(),
            session.peer(),
            e
        ),
        Err(e) if e.is_transport() => warn!(
            "Session {} ({}) transport failure: {}",
            session.id(),
            session.peer(),
            e
        ),
        Err(e) => warn!(
            "Session {} ({}) closed without commit: {}",
            session.id(),
            session.peer(),
            e
        ),
    }
}

/// Handles a single WebSocket connection.
///
/// 1. Performs the WebSocket handshake (path-checked)
/// 2. Subscribes to changes, then pushes the initial snapshot
/// 3. Spawns the send task
/// 4. Waits for one inbound replacement (or disconnect, shutdown, idle timeout)
/// 5. Stops the send task
/// 6. Commits and records the replacement, if there is one
/// 7. Closes the socket
async fn handle_connection<S: SyncState>(
    stream: TcpStream,
    hub: &HubContext<S>,
    session: &mut Session,
    mut hub_shutdown: watch::Receiver<bool>,
) -> Result<SessionEnd, SyncError> {
    let ws_stream = accept_hdr_async(stream, route_guard(hub.config.path.clone()))
        .await
        .map_err(|e| SyncError::Handshake {
            message: format!("WebSocket handshake failed: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    let (mut write, mut read) = ws_stream.split();

    // Subscribe before reading the snapshot so a commit racing the initial
    // push still wakes the send task.
    let listener = hub.state.subscribe();
    let snapshot = hub.state.snapshot().await;
    send_snapshot(&mut write, &snapshot).await?;
    debug!(
        "Session {} received initial snapshot at revision {}",
        session.id(),
        listener.seen_revision()
    );

    let (close_tx, close_rx) = watch::channel(false);
    let forwarder = TokioSpawn(forward_changes(
        write,
        listener,
        hub.state.clone(),
        close_rx,
        session.id(),
    ));

    let inbound =
        receive_candidate::<S>(&mut read, hub.config.idle_timeout, &mut hub_shutdown).await;

    let write = stop_forwarder(close_tx, forwarder, session.id()).await;

    let outcome = match inbound {
        Ok(Inbound::Candidate(candidate)) => commit_candidate(hub, session, candidate).await,
        Ok(Inbound::Ended(end)) => Ok(end),
        Err(e) => Err(e),
    };

    if let Some(mut write) = write {
        if let Err(e) = write.close().await {
            debug!("Session {} close frame not delivered: {}", session.id(), e);
        }
    }

    outcome
}

/// Send task: push the newest snapshot every time the state commits.
///
/// Returns the sink when told to stop so the caller can close the socket, or
/// `None` if a push failed (the socket is unusable).
async fn forward_changes<S: SyncState>(
    mut write: WsSink,
    mut listener: ChangeListener,
    state: SharedState<S>,
    mut close_rx: watch::Receiver<bool>,
    session_id: Uuid,
) -> Option<WsSink> {
    loop {
        tokio::select! {
            biased;
            _ = close_rx.changed() => return Some(write),
            changed = listener.changed() => match changed {
                Ok(revision) => {
                    // Re-read rather than trusting the revision: later commits
                    // may already have landed.
                    let snapshot = state.snapshot().await;
                    if let Err(e) = send_snapshot(&mut write, &snapshot).await {
                        warn!("Session {session_id} push of revision {revision} failed: {e}");
                        return None;
                    }
                    debug!("Session {session_id} pushed revision {revision}");
                }
                Err(e) => {
                    info!("Session {session_id} send task stopping: {e}");
                    return Some(write);
                }
            },
        }
    }
}

/// Signal the send task to stop and wait for it.
async fn stop_forwarder(
    close_tx: watch::Sender<bool>,
    forwarder: JoinHandle<Option<WsSink>>,
    session_id: Uuid,
) -> Option<WsSink> {
    // Fails only if the task already returned, which is fine.
    let _ = close_tx.send(true);

    match forwarder.await {
        Ok(write) => write,
        Err(e) => {
            warn!("Session {session_id} send task aborted: {e}");
            None
        }
    }
}

/// Receive loop: wait for the first data frame and decode it.
///
/// Control frames are skipped. A payload that does not decode into a complete
/// state ends the session with a decode error and no reply to the client.
async fn receive_candidate<S: SyncState>(
    read: &mut WsSource,
    idle_timeout: Option<Duration>,
    hub_shutdown: &mut watch::Receiver<bool>,
) -> Result<Inbound<S>, SyncError> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = hub_shutdown.changed() => return Ok(Inbound::Ended(SessionEnd::HubShutdown)),
            frame = next_frame(read, idle_timeout) => frame,
        };

        match frame {
            Frame::IdleTimeout => return Ok(Inbound::Ended(SessionEnd::IdleTimeout)),
            Frame::Message(None) | Frame::Message(Some(Ok(Message::Close(_)))) => {
                return Ok(Inbound::Ended(SessionEnd::Disconnected));
            }
            Frame::Message(Some(Err(e))) => {
                return Err(SyncError::Read {
                    message: format!("Error reading message: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            Frame::Message(Some(Ok(Message::Text(text)))) => {
                return Ok(Inbound::Candidate(decode_candidate(text.as_bytes())?));
            }
            Frame::Message(Some(Ok(Message::Binary(data)))) => {
                return Ok(Inbound::Candidate(decode_candidate(&data)?));
            }
            Frame::Message(Some(Ok(_))) => continue,
        }
    }
}

async fn next_frame(read: &mut WsSource, idle_timeout: Option<Duration>) -> Frame {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, read.next()).await {
            Ok(message) => Frame::Message(message),
            Err(_) => Frame::IdleTimeout,
        },
        None => Frame::Message(read.next().await),
    }
}

/// Apply → record. The resulting change signal reaches every other session.
///
/// Commits from different sessions are serialized here, so the last state
/// recorded is always the last state applied.
async fn commit_candidate<S: SyncState>(
    hub: &HubContext<S>,
    session: &mut Session,
    candidate: S,
) -> Result<SessionEnd, SyncError> {
    let _commit = hub.commit_lock.lock().await;

    let revision = hub.state.apply(candidate.clone()).await?;
    session.transition(SessionPhase::Applied)?;
    info!(
        "Session {} applied client state as revision {}",
        session.id(),
        revision
    );

    record_blocking(Arc::clone(&hub.sink), candidate).await?;

    Ok(SessionEnd::Applied { revision })
}

/// Run the sink on the blocking pool; the session still waits for it.
async fn record_blocking<S: SyncState>(
    sink: Arc<dyn PersistenceSink<S>>,
    state: S,
) -> Result<(), PersistenceError> {
    spawn_blocking(move || sink.record(&state))
        .await
        .map_err(|e| PersistenceError::Aborted {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?
}

/// Serialize a snapshot and send it as one text frame.
async fn send_snapshot<S: Serialize>(write: &mut WsSink, snapshot: &S) -> Result<(), SyncError> {
    let json = serde_json::to_string(snapshot).map_err(|e| SyncError::Encode {
        message: format!("Failed to serialize state snapshot: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    write
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| SyncError::Send {
            message: format!("Failed to send state snapshot: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
}

/// Handshake callback that refuses every path except `path`.
fn route_guard(path: String) -> impl FnOnce(&Request, Response) -> Result<Response, ErrorResponse> {
    move |request: &Request, response: Response| {
        if request.uri().path() == path {
            return Ok(response);
        }

        let mut rejection = ErrorResponse::new(Some(format!(
            "No state sync endpoint at {}",
            request.uri().path()
        )));
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        Err(rejection)
    }
}
