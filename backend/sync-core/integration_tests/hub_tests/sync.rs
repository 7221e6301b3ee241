use crate::hub_tests::helpers::{
    Panel, RecordingSink, connect, drain_until_close, expect_silence, receive_state,
    receive_text, send_text, start_test_hub, start_test_hub_with, start_test_hub_with_sink,
    wait_for_active_sessions, wait_for_close,
};

use sync_core::error::StateError;
use sync_core::hub::{HubConfig, start_sync_hub};
use sync_core::persistence::{JsonFileSink, NullSink, PersistenceSink};
use sync_core::state::{SharedState, SyncState};

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

// ============================================================================
// Snapshot push tests
// ============================================================================

/// **VALUE**: Walks the full dashboard round trip: initial push, host change, client
/// replacement, and a later viewer seeing the replacement.
///
/// **WHY THIS MATTERS**: This is the whole point of the hub. Every other test covers a
/// slice of this flow.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - The initial push is missing or stale
/// - Host-side commits are not forwarded
/// - Client replacements are not applied, not recorded, or not closed
/// - New connections see a state older than the last commit
#[tokio::test]
async fn given_running_hub_when_host_and_client_change_state_then_all_viewers_follow() {
    // GIVEN: A hub mirroring {"port":5001,"open":false}
    let hub = start_test_hub(Panel::new(5001, false)).await;

    // WHEN: Client A connects
    let mut client_a = connect(&hub).await;

    // THEN: A receives the current state
    assert_eq!(
        receive_text(&mut client_a).await,
        r#"{"port":5001,"open":false}"#
    );

    // WHEN: The host flips `open`
    hub.state
        .modify(|panel| panel.open = true)
        .await
        .expect("host change");

    // THEN: A receives the new state
    assert_eq!(
        receive_text(&mut client_a).await,
        r#"{"port":5001,"open":true}"#
    );

    // WHEN: A submits a replacement
    send_text(&mut client_a, r#"{"port":6000,"open":true}"#).await;

    // THEN: A's session ends without echoing the update back
    assert!(
        wait_for_close(&mut client_a).await,
        "Session should close after its update is applied"
    );

    // THEN: The replacement was applied and recorded
    assert_eq!(hub.state.snapshot().await, Panel::new(6000, true));
    assert_eq!(hub.sink.recorded(), vec![Panel::new(6000, true)]);

    // WHEN: Client B connects
    let mut client_b = connect(&hub).await;

    // THEN: B immediately receives the replacement
    assert_eq!(
        receive_text(&mut client_b).await,
        r#"{"port":6000,"open":true}"#
    );
}

/// **VALUE**: Verifies that a late client gets only the latest state, once.
///
/// **WHY THIS MATTERS**: History replay is explicitly not offered; a late viewer that
/// received stale intermediates would render the wrong state briefly.
///
/// **BUG THIS CATCHES**: Would catch a queued broadcast channel replaying earlier commits.
#[tokio::test]
async fn given_prior_commits_when_client_connects_then_single_latest_snapshot() {
    // GIVEN: Three commits before anyone connects
    let hub = start_test_hub(Panel::new(5001, false)).await;
    for port in [5002, 5003, 5004] {
        hub.state
            .apply(Panel::new(port, false))
            .await
            .expect("apply");
    }

    // WHEN: A client connects
    let mut ws = connect(&hub).await;

    // THEN: Exactly one message with the latest state
    assert_eq!(receive_state(&mut ws).await, Panel::new(5004, false));
    expect_silence(&mut ws).await;
}

/// **VALUE**: Verifies that every connected client receives host changes.
///
/// **BUG THIS CATCHES**: Would catch a single shared listener that only wakes one session.
#[tokio::test]
async fn given_several_clients_when_host_commits_then_each_receives_snapshot() {
    let hub = start_test_hub(Panel::new(5001, false)).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut ws = connect(&hub).await;
        assert_eq!(receive_state(&mut ws).await, Panel::new(5001, false));
        clients.push(ws);
    }

    hub.state
        .apply(Panel::new(5001, true))
        .await
        .expect("apply");

    for ws in &mut clients {
        assert_eq!(receive_state(ws).await, Panel::new(5001, true));
    }
}

/// **VALUE**: Verifies that one client's replacement reaches the other live clients.
///
/// **WHY THIS MATTERS**: Apply → record → broadcast is the ordering contract; other
/// viewers must converge on the submitted state.
///
/// **BUG THIS CATCHES**: Would catch the hub writing state without emitting a change signal.
#[tokio::test]
async fn given_two_clients_when_one_submits_then_other_receives_update() {
    let hub = start_test_hub(Panel::new(5001, false)).await;

    let mut viewer = connect(&hub).await;
    receive_state(&mut viewer).await;

    let mut editor = connect(&hub).await;
    receive_state(&mut editor).await;

    send_text(&mut editor, r#"{"port":7000,"open":false}"#).await;

    assert_eq!(receive_state(&mut viewer).await, Panel::new(7000, false));
    assert!(wait_for_close(&mut editor).await);
}

/// **VALUE**: Verifies that binary frames carrying JSON are accepted like text frames.
#[tokio::test]
async fn given_binary_json_frame_when_submitted_then_applied() {
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;

    ws.send(Message::Binary(br#"{"port":6500,"open":true}"#.to_vec().into()))
        .await
        .expect("send binary");

    assert!(wait_for_close(&mut ws).await);
    assert_eq!(hub.state.snapshot().await, Panel::new(6500, true));
}

// ============================================================================
// Rejected update tests
// ============================================================================

/// **VALUE**: Verifies that a malformed payload closes the session silently and leaves
/// state untouched.
///
/// **WHY THIS MATTERS**: Garbage from one client must not corrupt what every other
/// client sees, and must not be persisted.
///
/// **BUG THIS CATCHES**: Would catch partial decoding over live state, an error frame
/// being sent back, or the sink being called for a rejected update.
#[tokio::test]
async fn given_malformed_payload_when_submitted_then_session_closed_and_state_unchanged() {
    // GIVEN: A hub and a connected client
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;

    // WHEN: The client sends a partial document
    send_text(&mut ws, r#"{"port":6000}"#).await;

    // THEN: Connection closes with no reply, nothing changes
    assert!(wait_for_close(&mut ws).await);
    assert_eq!(hub.state.snapshot().await, Panel::new(5001, false));
    assert_eq!(hub.state.revision(), 0);
    assert!(hub.sink.recorded().is_empty());
}

#[tokio::test]
async fn given_invalid_state_when_submitted_then_session_closed_and_state_unchanged() {
    let hub = start_test_hub(Panel::new(5001, false)).await;
    let mut ws = connect(&hub).await;
    receive_state(&mut ws).await;

    send_text(&mut ws, r#"{"port":0,"open":true}"#).await;

    assert!(wait_for_close(&mut ws).await);
    assert_eq!(hub.state.snapshot().await, Panel::new(5001, false));
    assert!(hub.sink.recorded().is_empty());
}

/// **VALUE**: Verifies that one session's failure does not disturb other sessions.
///
/// **BUG THIS CATCHES**: Would catch an error path that tears down the accept loop or
/// the shared listener.
#[tokio::test]
async fn given_one_session_fails_when_host_commits_then_other_session_still_served() {
    let hub = start_test_hub(Panel::new(5001, false)).await;

    let mut healthy = connect(&hub).await;
    receive_state(&mut healthy).await;

    let mut broken = connect(&hub).await;
    receive_state(&mut broken).await;
    send_text(&mut broken, "definitely not json").await;
    assert!(wait_for_close(&mut broken).await);

    hub.state
        .apply(Panel::new(5001, true))
        .await
        .expect("apply");

    assert_eq!(receive_state(&mut healthy).await, Panel::new(5001, true));

    let mut late = connect(&hub).await;
    assert_eq!(receive_state(&mut late).await, Panel::new(5001, true));
}

/// **VALUE**: Verifies the documented behaviour when recording fails after a commit.
///
/// **WHY THIS MATTERS**: Memory is already updated when the sink runs. Viewers must still
/// converge on the committed state even though storage lags behind.
///
/// **BUG THIS CATCHES**: Would catch a rollback attempt or a hub crash on sink failure.
#[tokio::test]
async fn given_failing_sink_when_client_submits_then_state_applied_and_broadcast() {
    // GIVEN: A hub whose sink always fails
    let hub = start_test_hub_with(Panel::new(5001, false), RecordingSink::failing(), None).await;

    let mut viewer = connect(&hub).await;
    receive_state(&mut viewer).await;

    let mut editor = connect(&hub).await;
    receive_state(&mut editor).await;

    // WHEN: A client submits a valid replacement
    send_text(&mut editor, r#"{"port":6100,"open":false}"#).await;

    // THEN: Memory holds it, other viewers see it, the editor's session ends
    assert!(wait_for_close(&mut editor).await);
    assert_eq!(hub.state.snapshot().await, Panel::new(6100, false));
    assert_eq!(receive_state(&mut viewer).await, Panel::new(6100, false));
    assert!(hub.sink.recorded().is_empty());
}

// ============================================================================
// Concurrent editor tests
// ============================================================================

const EDITORS: u16 = 6;

/// **VALUE**: Verifies that after many editors submit at once, the state file holds
/// exactly what memory holds.
///
/// **WHY THIS MATTERS**: The host restarts from disk. If the last commit is not the last
/// record, a restart silently reverts to an older edit even though every call succeeded.
///
/// **BUG THIS CATCHES**: Would catch:
/// - Records racing each other out of commit order
/// - Overlapping records clobbering a shared temp file and failing
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_concurrent_editors_when_all_submit_then_disk_matches_memory() {
    // GIVEN: A hub recording into a real state file
    let dir = tempfile::tempdir().expect("tempdir");
    let hub = start_test_hub_with_sink(
        Panel::new(5001, false),
        JsonFileSink::new(dir.path()),
        None,
    )
    .await;

    for round in 0..3u16 {
        let mut editors = Vec::new();
        for _ in 0..EDITORS {
            let mut ws = connect(&hub).await;
            receive_state(&mut ws).await;
            editors.push(ws);
        }

        // WHEN: Every editor submits a different replacement at once
        let submissions: Vec<_> = editors
            .into_iter()
            .zip(0..EDITORS)
            .map(|(mut ws, editor)| {
                let candidate = Panel::new(6000 + round * 100 + editor, editor % 2 == 0);
                tokio::spawn(async move {
                    let json = serde_json::to_string(&candidate).expect("encode");
                    send_text(&mut ws, &json).await;
                    drain_until_close(&mut ws).await
                })
            })
            .collect();

        for submission in submissions {
            assert!(
                submission.await.expect("editor task panicked"),
                "round {round}: every editor session should close after applying"
            );
        }
        assert!(wait_for_active_sessions(&hub, 0).await);

        // THEN: The file and memory agree on the last commit
        let memory = hub.state.snapshot().await;
        let contents = std::fs::read_to_string(hub.sink.path()).expect("read state file");
        let on_disk: Panel = serde_json::from_str(&contents).expect("parse state file");
        assert_eq!(on_disk, memory, "round {round}");
    }

    assert_eq!(hub.state.revision(), u64::from(3 * EDITORS));
}

/// **VALUE**: Verifies that a slow record cannot be overtaken by a later editor.
///
/// **WHY THIS MATTERS**: Last writer wins in memory; it has to win on disk too.
///
/// **BUG THIS CATCHES**: Would catch the second editor applying and recording while the
/// first is still writing, leaving the first (older) state as the final record.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_slow_record_when_second_editor_submits_then_last_record_is_last_commit() {
    // GIVEN: A sink that stalls while recording port 6001
    let hub = start_test_hub_with(
        Panel::new(5001, false),
        RecordingSink::stalling_on(6001, Duration::from_millis(300)),
        None,
    )
    .await;

    let mut first = connect(&hub).await;
    receive_state(&mut first).await;
    let mut second = connect(&hub).await;
    receive_state(&mut second).await;

    // WHEN: The second editor submits while the first is still being recorded
    send_text(&mut first, r#"{"port":6001,"open":false}"#).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    send_text(&mut second, r#"{"port":6002,"open":false}"#).await;

    assert!(drain_until_close(&mut first).await);
    assert!(drain_until_close(&mut second).await);

    // THEN: Records follow commit order and end on what memory holds
    assert_eq!(hub.state.snapshot().await, Panel::new(6002, false));
    assert_eq!(
        hub.sink.recorded(),
        vec![Panel::new(6001, false), Panel::new(6002, false)]
    );
}

// ============================================================================
// Coalescing tests
// ============================================================================

const STALLED_VALUE: u32 = 1;
const STALL: Duration = Duration::from_millis(300);

/// Mirrored state whose serialization stalls on one value, holding the send task
/// busy mid-push.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct Gauge {
    value: u32,
}

impl Serialize for Gauge {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        if self.value == STALLED_VALUE {
            std::thread::sleep(STALL);
        }
        let mut gauge = serializer.serialize_struct("Gauge", 1)?;
        gauge.serialize_field("value", &self.value)?;
        gauge.end()
    }
}

impl SyncState for Gauge {
    fn validate(&self) -> Result<(), StateError> {
        Ok(())
    }
}

/// **VALUE**: Verifies that commits landing while a push is in flight produce one frame
/// carrying the newest state.
///
/// **WHY THIS MATTERS**: A slow viewer must catch up to the present, not replay every
/// intermediate state behind it.
///
/// **BUG THIS CATCHES**: Would catch a queued per-commit broadcast that sends the
/// intermediate state, or a send task that misses the final commit.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_busy_send_task_when_host_commits_twice_then_one_newest_frame() {
    // GIVEN: A hub mirroring a gauge and one connected client
    let state = SharedState::new(Gauge { value: 0 }).expect("valid gauge");
    let sink: Arc<dyn PersistenceSink<Gauge>> = Arc::new(NullSink);
    let config = HubConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..HubConfig::default()
    };
    let handle = start_sync_hub(config, state.clone(), sink)
        .await
        .expect("Failed to start state sync hub");

    let (mut ws, _) = connect_async(format!("ws://{}/ws", handle.local_addr()))
        .await
        .expect("Failed to connect to WebSocket server");
    assert_eq!(receive_text(&mut ws).await, r#"{"value":0}"#);

    // WHEN: Two more commits land while the send task is stuck pushing value 1
    state.apply(Gauge { value: 1 }).await.expect("apply 1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    state.apply(Gauge { value: 2 }).await.expect("apply 2");
    state.apply(Gauge { value: 3 }).await.expect("apply 3");

    // THEN: The in-flight push, then exactly one frame with the newest state
    assert_eq!(receive_text(&mut ws).await, r#"{"value":1}"#);
    assert_eq!(receive_text(&mut ws).await, r#"{"value":3}"#);
    expect_silence(&mut ws).await;

    handle.shutdown().await;
}
