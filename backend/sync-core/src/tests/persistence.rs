// Unit tests for the JSON file sink.

use crate::error::PersistenceError;
use crate::model::{DashboardState, Project};
use crate::persistence::{JsonFileSink, NullSink, PersistenceSink};

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

fn entries_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read_dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// **VALUE**: Verifies that a recorded state is read back unchanged.
///
/// **WHY THIS MATTERS**: The host restarts from this file; a lossy round trip would
/// silently revert the user's dashboard edits.
///
/// **BUG THIS CATCHES**: Would catch writing to the temp path without the rename.
#[test]
fn given_recorded_state_when_loaded_then_identical() {
    // GIVEN: A sink in an empty directory
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = JsonFileSink::new(dir.path());

    let mut state = DashboardState::default();
    state.server.open = true;
    state.projects.push(Project::new("api", "/src/api"));

    // WHEN: Recording then loading
    sink.record(&state).expect("record");
    let loaded: DashboardState = sink.load().expect("load");

    // THEN: Same state, no temp file left behind
    assert_eq!(loaded, state);
    assert_eq!(entries_in(dir.path()), vec!["state.json".to_string()]);
}

#[test]
fn given_missing_file_when_loaded_then_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = JsonFileSink::new(dir.path().join("not-created-yet"));

    let loaded: DashboardState = sink.load().expect("load");

    assert_eq!(loaded, DashboardState::default());
}

#[test]
fn given_missing_directory_when_recorded_then_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = JsonFileSink::new(dir.path().join("nested").join("realize"));

    sink.record(&DashboardState::default()).expect("record");

    assert!(sink.path().exists());
}

/// **VALUE**: Verifies that a corrupt file is reported, not replaced by defaults.
///
/// **BUG THIS CATCHES**: Would catch `load` swallowing parse errors and the host then
/// overwriting the user's file on the next record.
#[test]
fn given_corrupt_file_when_loaded_then_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = JsonFileSink::new(dir.path());
    std::fs::write(sink.path(), "{ not json").expect("write");

    let result = sink.load::<DashboardState>();

    assert!(matches!(result, Err(PersistenceError::Parse { .. })));
}

#[test]
fn given_invalid_persisted_state_when_loaded_then_invalid_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = JsonFileSink::new(dir.path());
    std::fs::write(
        sink.path(),
        r#"{"server":{"status":false,"open":false,"port":0,"host":"localhost"},"projects":[]}"#,
    )
    .expect("write");

    let result = sink.load::<DashboardState>();

    assert!(matches!(result, Err(PersistenceError::Invalid { .. })));
}

#[test]
fn given_unwritable_directory_when_recorded_then_write_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "").expect("write");
    let sink = JsonFileSink::new(blocker.join("sub"));

    let result = sink.record(&DashboardState::default());

    assert!(matches!(result, Err(PersistenceError::Write { .. })));
}

#[test]
fn given_null_sink_when_recorded_then_ok() {
    assert!(NullSink.record(&DashboardState::default()).is_ok());
}

/// **VALUE**: Verifies that overlapping records from several sessions all succeed and
/// leave one of the recorded states on disk.
///
/// **WHY THIS MATTERS**: Sessions commit from different runtime workers, so two
/// records can hit the directory at the same instant.
///
/// **BUG THIS CATCHES**: Would catch writers sharing a temp file, where one truncates
/// the other's half-written document or renames it away before the other's rename.
#[test]
fn given_concurrent_writers_when_recording_then_every_record_succeeds() {
    // GIVEN: One sink shared by four writers released together
    let dir = tempfile::tempdir().expect("tempdir");
    let sink = Arc::new(JsonFileSink::new(dir.path()));
    let writers = 4u16;

    for round in 0..50u16 {
        let barrier = Arc::new(Barrier::new(usize::from(writers)));
        let candidates: Vec<DashboardState> = (0..writers)
            .map(|writer| {
                let mut state = DashboardState::default();
                state.server.port = 6000 + round * writers + writer;
                state
                    .projects
                    .push(Project::new(format!("project-{writer}"), "/src"));
                state
            })
            .collect();

        // WHEN: All of them record at once
        let handles: Vec<_> = candidates
            .iter()
            .cloned()
            .map(|state| {
                let sink = Arc::clone(&sink);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sink.record(&state)
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|writer| writer.join().expect("writer thread panicked"))
            .collect();

        // THEN: No write failed and the file holds one complete candidate
        for result in results {
            assert!(result.is_ok(), "round {round}: {result:?}");
        }
        let loaded: DashboardState = sink.load().expect("load");
        assert!(candidates.contains(&loaded), "round {round}: {loaded:?}");
    }

    assert_eq!(entries_in(dir.path()), vec!["state.json".to_string()]);
}
