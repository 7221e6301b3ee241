use crate::hub_tests::helpers::{
    Panel, RecordingSink, connect, receive_state, send_text, start_test_hub,
    start_test_hub_with, wait_for_active_sessions, wait_for_close,
};

use sync_core::hub::{HubConfig, start_sync_hub};
use sync_core::persistence::{NullSink, PersistenceSink};
use sync_core::state::SharedState;

use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::connect_async;

// ============================================================================
// Session teardown tests
// ============================================================================

/// **VALUE**: Verifies that closing a client tears down its send task.
///
/// **WHY THIS MATTERS**: The send task spends its life waiting on a change signal. If
/// it is not cancelled with the connection, every closed tab leaks a task.
///
/// **BUG THIS CATCHES**: Would catch the send task being detached from the session's
/// lifetime (spawned and forgotten).
#[tokio::test]
async fn given_idle_send_task_when_client_closes_then_session_torn_down() {
    // GIVEN: A connected client whose send task is waiting for a change
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;
    assert!(wait_for_active_sessions(&hub, 1).await);

    // WHEN: The client closes the connection
    ws.close(None).await.expect("close");

    // THEN: The session (and its send task) is gone
    assert!(
        wait_for_active_sessions(&hub, 0).await,
        "Session should be torn down after the client closes"
    );
}

#[tokio::test]
async fn given_connected_client_when_socket_dropped_then_session_torn_down() {
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;
    assert!(wait_for_active_sessions(&hub, 1).await);

    drop(ws);

    assert!(wait_for_active_sessions(&hub, 0).await);
}

/// **VALUE**: Verifies that an applied update ends its session and frees it.
#[tokio::test]
async fn given_applied_update_when_session_ends_then_no_active_sessions() {
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;

    send_text(&mut ws, r#"{"port":6000,"open":false}"#).await;

    assert!(wait_for_close(&mut ws).await);
    assert!(wait_for_active_sessions(&hub, 0).await);
}

/// **VALUE**: Verifies that the optional idle timeout closes silent sessions.
///
/// **BUG THIS CATCHES**: Would catch the timeout being configured but never armed.
#[tokio::test]
async fn given_idle_timeout_when_client_stays_silent_then_session_closed() {
    let hub = start_test_hub_with(
        Panel::new(5001, false),
        RecordingSink::default(),
        Some(Duration::from_millis(100)),
    )
    .await;

    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;

    assert!(wait_for_close(&mut ws).await);
    assert!(wait_for_active_sessions(&hub, 0).await);
    assert_eq!(hub.state.revision(), 0);
}

/// **VALUE**: Verifies that shutdown closes live sessions and returns.
///
/// **BUG THIS CATCHES**: Would catch `shutdown` hanging on a session blocked in its
/// receive loop.
#[tokio::test]
async fn given_live_sessions_when_hub_shut_down_then_clients_disconnected() {
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let url = hub.url();

    let mut first = connect(&hub).await;
    receive_state(&mut first).await;
    let mut second = connect(&hub).await;
    receive_state(&mut second).await;

    tokio::time::timeout(Duration::from_secs(2), hub.handle.shutdown())
        .await
        .expect("shutdown should complete");

    assert!(wait_for_close(&mut first).await);
    assert!(wait_for_close(&mut second).await);
    assert!(
        connect_async(url).await.is_err(),
        "Listener should be closed after shutdown"
    );
}

// ============================================================================
// Transport surface tests
// ============================================================================

/// **VALUE**: Verifies that only the configured path is upgraded.
#[tokio::test]
async fn given_wrong_path_when_connecting_then_handshake_rejected() {
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let url = format!("ws://{}/not-the-socket", hub.handle.local_addr());

    let result = connect_async(url).await;

    assert!(result.is_err(), "Unknown path should not be upgraded");
    assert!(wait_for_active_sessions(&hub, 0).await);
}

#[tokio::test]
async fn given_invalid_config_when_starting_then_error() {
    let state = SharedState::new(Panel::new(5001, false)).expect("valid");
    let config = HubConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        path: "ws".to_string(),
        idle_timeout: None,
    };

    let sink: Arc<dyn PersistenceSink<Panel>> = Arc::new(NullSink);

    let result = start_sync_hub(config, state, sink).await;

    assert!(result.is_err(), "Path without leading slash should be rejected");
}
