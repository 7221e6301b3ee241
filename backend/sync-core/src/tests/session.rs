// Unit tests for the session state machine.

use crate::error::SyncError;
use crate::hub::{Session, SessionPhase};

use std::net::SocketAddr;

fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 50000))
}

/// **VALUE**: Verifies the only legal phase moves.
///
/// **WHY THIS MATTERS**: A session accepts at most one replacement; a second `Applied`
/// or a reopen after `Closed` would mean a closed connection kept editing state.
///
/// **BUG THIS CATCHES**: Would catch a permissive `can_transition_to`.
#[test]
fn given_each_phase_pair_when_checked_then_only_forward_moves_allowed() {
    use SessionPhase::{Applied, Closed, Listening};

    let allowed = [(Listening, Applied), (Listening, Closed), (Applied, Closed)];
    let phases = [Listening, Applied, Closed];

    for from in phases {
        for to in phases {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&(from, to)),
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn given_new_session_when_applied_then_closed_then_phases_follow() {
    let mut session = Session::new(peer());
    assert_eq!(session.phase(), SessionPhase::Listening);
    assert_eq!(session.peer(), peer());

    session
        .transition(SessionPhase::Applied)
        .expect("listening -> applied");
    assert_eq!(session.phase(), SessionPhase::Applied);

    session.close();
    assert_eq!(session.phase(), SessionPhase::Closed);
}

/// **VALUE**: Verifies that a second apply on the same session is refused.
///
/// **BUG THIS CATCHES**: Would catch the receive loop being turned into a stream of edits
/// without revisiting the session contract.
#[test]
fn given_applied_session_when_applied_again_then_transition_error() {
    let mut session = Session::new(peer());
    session
        .transition(SessionPhase::Applied)
        .expect("first apply");

    let result = session.transition(SessionPhase::Applied);

    assert!(matches!(result, Err(SyncError::Transition { .. })));
    assert_eq!(session.phase(), SessionPhase::Applied);
}

#[test]
fn given_closed_session_when_close_again_then_stays_closed() {
    let mut session = Session::new(peer());
    session.close();
    session.close();

    assert_eq!(session.phase(), SessionPhase::Closed);
    assert!(session.transition(SessionPhase::Listening).is_err());
}

#[test]
fn given_two_sessions_when_created_then_ids_differ() {
    let first = Session::new(peer());
    let second = Session::new(peer());

    assert_ne!(first.id(), second.id());
}
