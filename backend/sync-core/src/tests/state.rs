// Unit tests for SharedState commits and change listeners.
// Hub-level behaviour is covered in integration_tests/hub_tests.

use crate::error::StateError;
use crate::state::{SharedState, SyncState};

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Panel {
    port: u16,
    open: bool,
}

impl SyncState for Panel {
    fn validate(&self) -> Result<(), StateError> {
        if self.port == 0 {
            return Err(StateError::validation("port must be non-zero"));
        }
        Ok(())
    }
}

fn panel(port: u16, open: bool) -> Panel {
    Panel { port, open }
}

const QUIET_PERIOD: Duration = Duration::from_millis(50);

/// **VALUE**: Verifies that a committed candidate is exactly what later snapshots return.
///
/// **WHY THIS MATTERS**: Every client push is built from `snapshot()`. If apply and
/// snapshot disagree, dashboards show a state the host never accepted.
///
/// **BUG THIS CATCHES**: Would catch if the actor dropped the candidate, wrote it to a
/// stale copy, or forgot to bump the revision.
#[tokio::test]
async fn given_valid_candidate_when_apply_then_snapshot_matches() {
    // GIVEN: Shared state with an initial value
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");

    // WHEN: Applying a valid candidate
    let revision = state
        .apply(panel(6000, true))
        .await
        .expect("apply should succeed");

    // THEN: Snapshot equals the candidate and the revision moved once
    assert_eq!(revision, 1);
    assert_eq!(state.revision(), 1);
    assert_eq!(state.snapshot().await, panel(6000, true));
}

/// **VALUE**: Verifies that a candidate failing validation leaves state untouched.
///
/// **WHY THIS MATTERS**: The state must always be well-formed at rest.
///
/// **BUG THIS CATCHES**: Would catch if the value were swapped before validation ran.
#[tokio::test]
async fn given_invalid_candidate_when_apply_then_state_unchanged() {
    // GIVEN: Shared state with an initial value
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");

    // WHEN: Applying a candidate that breaks an invariant
    let result = state.apply(panel(0, true)).await;

    // THEN: Validation error, no commit
    assert!(matches!(result, Err(StateError::Validation { .. })));
    assert_eq!(state.revision(), 0);
    assert_eq!(state.snapshot().await, panel(5001, false));
}

/// **VALUE**: Verifies that malformed and partial JSON payloads are rejected before commit.
///
/// **WHY THIS MATTERS**: Clients send raw JSON. A partial document must never be merged
/// over existing fields.
///
/// **BUG THIS CATCHES**: Would catch serde defaults sneaking onto required fields, or
/// decoding into the live value instead of a fresh candidate.
#[tokio::test]
async fn given_malformed_or_partial_payloads_when_apply_json_then_decode_error() {
    // GIVEN: Shared state with an initial value
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");

    let payloads: [&[u8]; 5] = [
        b"not json",
        b"{\"port\":6000",
        b"{\"port\":6000}",
        b"{\"port\":6000,\"open\":true,\"extra\":1}",
        b"[6000,true,false]",
    ];

    for payload in payloads {
        // WHEN: Applying the raw payload
        let result = state.apply_json(payload).await;

        // THEN: Decode error, state untouched
        assert!(
            matches!(result, Err(StateError::Decode { .. })),
            "payload {:?} should fail to decode, got {:?}",
            String::from_utf8_lossy(payload),
            result
        );
    }

    assert_eq!(state.revision(), 0);
    assert_eq!(state.snapshot().await, panel(5001, false));
}

/// **VALUE**: Verifies that a complete JSON document is applied.
///
/// **WHY THIS MATTERS**: This is the path the hub takes for every client replacement.
///
/// **BUG THIS CATCHES**: Would catch if `apply_json` decoded correctly but skipped the commit.
#[tokio::test]
async fn given_complete_payload_when_apply_json_then_committed() {
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");

    let revision = state
        .apply_json(br#"{"port":6000,"open":true}"#)
        .await
        .expect("complete payload should apply");

    assert_eq!(revision, 1);
    assert_eq!(state.snapshot().await, panel(6000, true));
}

/// **VALUE**: Verifies that the initial value is validated.
#[test]
fn given_invalid_initial_value_when_new_then_error() {
    let result = SharedState::new(panel(0, false));

    assert!(matches!(result, Err(StateError::Validation { .. })));
}

/// **VALUE**: Verifies that each commit wakes a waiting listener exactly once.
///
/// **WHY THIS MATTERS**: The send task relies on one wake-up per commit when it keeps up.
///
/// **BUG THIS CATCHES**: Would catch a missing signal after commit, or a double signal.
#[tokio::test]
async fn given_listener_when_each_commit_then_one_signal_each() {
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");
    let mut listener = state.subscribe();

    state.apply(panel(5001, true)).await.expect("apply");
    assert_eq!(listener.changed().await.expect("signal"), 1);

    state.apply(panel(5002, true)).await.expect("apply");
    assert_eq!(listener.changed().await.expect("signal"), 2);

    // No further commit, no further signal
    let extra = tokio::time::timeout(QUIET_PERIOD, listener.changed()).await;
    assert!(extra.is_err(), "No signal expected without a commit");
}

/// **VALUE**: Verifies that signals emitted while a listener is busy collapse into one.
///
/// **WHY THIS MATTERS**: A slow client must receive the newest state once, not a
/// backlog of stale intermediates.
///
/// **BUG THIS CATCHES**: Would catch replacing the watch channel with a queue
/// (mpsc/broadcast), which would replay every intermediate commit.
#[tokio::test]
async fn given_two_commits_before_listener_polls_when_changed_then_single_wake_with_latest() {
    // GIVEN: A listener that is not currently waiting
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");
    let mut listener = state.subscribe();

    // WHEN: Two commits land before it polls
    state.apply(panel(5001, true)).await.expect("apply");
    state.apply(panel(7000, true)).await.expect("apply");

    // THEN: One wake-up, carrying the newest revision and snapshot
    assert_eq!(listener.changed().await.expect("signal"), 2);
    assert_eq!(state.snapshot().await, panel(7000, true));

    let extra = tokio::time::timeout(QUIET_PERIOD, listener.changed()).await;
    assert!(extra.is_err(), "Coalesced commits must not wake twice");
}

/// **VALUE**: Verifies that a late subscriber does not see earlier commits.
///
/// **WHY THIS MATTERS**: A newly connected client gets one initial snapshot; replaying
/// old signals would push it duplicate states.
///
/// **BUG THIS CATCHES**: Would catch listeners starting from revision 0 instead of the
/// current revision.
#[tokio::test]
async fn given_prior_commits_when_subscribe_then_listener_caught_up() {
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");
    for port in 6001..=6003 {
        state.apply(panel(port, false)).await.expect("apply");
    }

    let mut listener = state.subscribe();

    assert_eq!(listener.seen_revision(), 3);
    let pending = tokio::time::timeout(QUIET_PERIOD, listener.changed()).await;
    assert!(pending.is_err(), "Late subscriber should not be woken by old commits");
}

/// **VALUE**: Verifies that concurrent writers are serialized and none is lost.
///
/// **WHY THIS MATTERS**: Several dashboard sessions can submit at the same moment.
///
/// **BUG THIS CATCHES**: Would catch a torn write or a revision bump skipped under contention.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_concurrent_writers_when_apply_then_every_commit_counted() {
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");

    let mut tasks = Vec::new();
    for port in 8000..8010 {
        let state = state.clone();
        tasks.push(tokio::spawn(
            async move { state.apply(panel(port, true)).await },
        ));
    }

    for task in tasks {
        task.await.expect("task").expect("apply");
    }

    assert_eq!(state.revision(), 10);
    let snapshot = state.snapshot().await;
    assert!((8000..8010).contains(&snapshot.port));
    assert!(snapshot.open);
}

/// **VALUE**: Verifies that `modify` goes through validation like any other write.
#[tokio::test]
async fn given_host_edit_when_modify_then_validated_and_committed() {
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");

    state
        .modify(|panel| panel.open = true)
        .await
        .expect("valid edit");
    assert_eq!(state.snapshot().await, panel(5001, true));

    let rejected = state.modify(|panel| panel.port = 0).await;
    assert!(rejected.is_err());
    assert_eq!(state.snapshot().await, panel(5001, true));
    assert_eq!(state.revision(), 1);
}

/// **VALUE**: Verifies that listeners stop once the shared state is gone.
///
/// **BUG THIS CATCHES**: Would catch send tasks hanging forever after the host drops its state.
#[tokio::test]
async fn given_state_dropped_when_listener_waits_then_error() {
    let state = SharedState::new(panel(5001, false)).expect("initial state is valid");
    let mut listener = state.subscribe();

    drop(state);

    let result = tokio::time::timeout(Duration::from_secs(1), listener.changed())
        .await
        .expect("listener should not hang");
    assert!(matches!(result, Err(StateError::Actor { .. })));
}
