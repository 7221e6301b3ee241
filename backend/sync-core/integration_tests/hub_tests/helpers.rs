//! Test helpers for hub integration tests.
//!
//! This module provides utilities for testing the state sync hub:
//! - A minimal mirrored state and a recording persistence sink
//! - Starting a hub on an ephemeral port
//! - Sending/receiving JSON frames
//! - Connection state checks

use sync_core::error::{PersistenceError, StateError};
use sync_core::hub::{HubConfig, SyncHubHandle, start_sync_hub};
use sync_core::persistence::PersistenceSink;
use sync_core::state::{SharedState, SyncState};

use common::ErrorLocation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for something that should happen.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait before concluding that nothing will happen.
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// Minimal mirrored state: the panel server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Panel {
    pub port: u16,
    pub open: bool,
}

impl Panel {
    pub fn new(port: u16, open: bool) -> Self {
        Self { port, open }
    }
}

impl SyncState for Panel {
    fn validate(&self) -> Result<(), StateError> {
        if self.port == 0 {
            return Err(StateError::validation("port must be non-zero"));
        }
        Ok(())
    }
}

/// Sink that remembers every recorded state and can be told to fail or stall.
#[derive(Default)]
pub struct RecordingSink {
    recorded: Mutex<Vec<Panel>>,
    failing: AtomicBool,
    stall: Option<(u16, Duration)>,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sleeps for `delay` before recording a state on `port`.
    pub fn stalling_on(port: u16, delay: Duration) -> Self {
        Self {
            stall: Some((port, delay)),
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<Panel> {
        self.recorded.lock().expect("sink lock poisoned").clone()
    }
}

impl PersistenceSink<Panel> for RecordingSink {
    fn record(&self, state: &Panel) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Serialize {
                location: ErrorLocation::caller(),
                reason: "simulated disk failure".to_string(),
            });
        }

        if let Some((port, delay)) = self.stall {
            if state.port == port {
                std::thread::sleep(delay);
            }
        }

        self.recorded
            .lock()
            .expect("sink lock poisoned")
            .push(state.clone());
        Ok(())
    }
}

/// A running hub plus the collaborators a test needs to observe it.
pub struct TestHub<K = RecordingSink> {
    pub handle: SyncHubHandle,
    pub state: SharedState<Panel>,
    pub sink: Arc<K>,
}

impl<K> TestHub<K> {
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.handle.local_addr())
    }
}

/// Test helper: Start a hub on an ephemeral localhost port.
pub async fn start_test_hub(initial: Panel) -> TestHub {
    start_test_hub_with(initial, RecordingSink::default(), None).await
}

pub async fn start_test_hub_with(
    initial: Panel,
    sink: RecordingSink,
    idle_timeout: Option<Duration>,
) -> TestHub {
    start_test_hub_with_sink(initial, sink, idle_timeout).await
}

/// Test helper: Start a hub that records through any sink.
pub async fn start_test_hub_with_sink<K: PersistenceSink<Panel> + 'static>(
    initial: Panel,
    sink: K,
    idle_timeout: Option<Duration>,
) -> TestHub<K> {
    let state = SharedState::new(initial).expect("initial state should be valid");
    let sink = Arc::new(sink);

    let config = HubConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        idle_timeout,
        ..HubConfig::default()
    };

    let dyn_sink: Arc<dyn PersistenceSink<Panel>> = sink.clone();
    let handle = start_sync_hub(config, state.clone(), dyn_sink)
        .await
        .expect("Failed to start state sync hub");

    TestHub {
        handle,
        state,
        sink,
    }
}

/// Test helper: Connect to the hub's WebSocket endpoint.
pub async fn connect<K>(hub: &TestHub<K>) -> WsClient {
    let (ws_stream, _) = connect_async(hub.url())
        .await
        .expect("Failed to connect to WebSocket server");
    ws_stream
}

/// Test helper: Receive the next data frame as raw text.
pub async fn receive_text(ws: &mut WsClient) -> String {
    loop {
        let msg = tokio::time::timeout(RECEIVE_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for a message")
            .expect("No message received")
            .expect("Error receiving message");

        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected a text frame, got {other:?}"),
        }
    }
}

/// Test helper: Receive the next data frame as a decoded state.
pub async fn receive_state(ws: &mut WsClient) -> Panel {
    let text = receive_text(ws).await;
    serde_json::from_str(&text).expect("Pushed frame should be a complete state")
}

/// Test helper: Send a raw text frame.
pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("Failed to send message");
}

/// Test helper: Check that no data frame arrives within the quiet period.
pub async fn expect_silence(ws: &mut WsClient) {
    match tokio::time::timeout(QUIET_PERIOD, ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
        Ok(other) => panic!("Expected no message, got {other:?}"),
    }
}

/// Test helper: Wait for the server to close the connection.
///
/// Returns false if a data frame arrives first or nothing happens in time.
pub async fn wait_for_close(ws: &mut WsClient) -> bool {
    loop {
        match tokio::time::timeout(RECEIVE_TIMEOUT, ws.next()).await {
            Err(_) => return false,
            Ok(None) => return true,
            Ok(Some(Err(_))) => return true,
            Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(Some(Ok(_))) => return false,
        }
    }
}

/// Test helper: Wait for the server to close the connection, skipping any
/// snapshots pushed before it does.
pub async fn drain_until_close(ws: &mut WsClient) -> bool {
    loop {
        match tokio::time::timeout(RECEIVE_TIMEOUT, ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

/// Test helper: Poll until the hub reports `expected` live sessions.
pub async fn wait_for_active_sessions<K>(hub: &TestHub<K>, expected: usize) -> bool {
    let deadline = tokio::time::Instant::now() + RECEIVE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if hub.handle.active_sessions() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    hub.handle.active_sessions() == expected
}
