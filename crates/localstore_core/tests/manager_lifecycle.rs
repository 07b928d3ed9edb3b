use localstore_core::{
    ContextManager, LifecycleState, ManagerError, SqliteStoreEngine, StoreError, StoreLocation,
};
use rusqlite::Connection;

fn file_manager(dir: &tempfile::TempDir) -> ContextManager<SqliteStoreEngine> {
    let location = StoreLocation::file(dir.path().join("store.sqlite3"));
    ContextManager::new(SqliteStoreEngine, location)
}

fn scratch_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM scratch;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn fresh_manager_runs_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    assert_eq!(manager.status().state, LifecycleState::Uninitialized);

    manager.initialize().unwrap();
    assert!(manager.context().is_some());
    assert_eq!(manager.status().state, LifecycleState::Ready);

    manager.clear().unwrap();
    assert!(manager.context().is_none());
    assert_eq!(manager.status().state, LifecycleState::Uninitialized);

    // Access after clear is an ordinary absence, not an error.
    assert!(manager.with_context(|context| context.generation()).is_none());
}

#[test]
fn clear_twice_is_a_noop_the_second_time() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    manager.initialize().unwrap();

    manager.clear().unwrap();
    manager.clear().unwrap();
    assert!(manager.context().is_none());
}

#[test]
fn initialize_against_directory_path_reports_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    // The tempdir itself is a directory, not an openable database file.
    let manager = ContextManager::new(SqliteStoreEngine, StoreLocation::file(dir.path()));

    let err = manager.initialize().unwrap_err();
    match err {
        ManagerError::Store(StoreError::Unavailable { .. }) => {}
        other => panic!("unexpected error: {other}"),
    }
    assert!(!manager.is_initialized());
    assert!(manager.context().is_none());
}

#[test]
fn committed_data_survives_clear_and_reinitialize() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    manager.initialize().unwrap();

    manager
        .with_context(|context| {
            context
                .handle()
                .execute_batch("CREATE TABLE scratch (value TEXT); INSERT INTO scratch (value) VALUES ('kept');")
        })
        .unwrap()
        .unwrap();

    let first_generation = manager.current_generation().unwrap();
    manager.clear().unwrap();
    manager.initialize().unwrap();

    assert!(manager.current_generation().unwrap() > first_generation);
    let count = manager
        .with_context(|context| scratch_count(context.handle()))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn uncommitted_changes_are_discarded_by_clear() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    manager.initialize().unwrap();

    manager
        .with_context(|context| {
            context
                .handle()
                .execute_batch("CREATE TABLE scratch (value TEXT);")
        })
        .unwrap()
        .unwrap();
    manager
        .with_context(|context| {
            context
                .handle()
                .execute_batch("BEGIN; INSERT INTO scratch (value) VALUES ('pending');")
        })
        .unwrap()
        .unwrap();

    manager.clear().unwrap();
    manager.initialize().unwrap();

    let count = manager
        .with_context(|context| scratch_count(context.handle()))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn reinitialize_while_ready_preserves_in_flight_state() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    manager.initialize().unwrap();
    let generation = manager.current_generation().unwrap();

    manager
        .with_context(|context| {
            context.handle().execute_batch(
                "CREATE TABLE scratch (value TEXT); BEGIN; INSERT INTO scratch (value) VALUES ('pending');",
            )
        })
        .unwrap()
        .unwrap();

    // No-op re-initialization must not touch the open transaction.
    manager.initialize().unwrap();
    assert_eq!(manager.current_generation(), Some(generation));

    let (in_transaction, count) = manager
        .with_context(|context| {
            let conn = context.handle();
            (!conn.is_autocommit(), scratch_count(conn))
        })
        .unwrap();
    assert!(in_transaction);
    assert_eq!(count, 1);
}

#[test]
fn stale_generation_tag_is_detected_after_clear() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    manager.initialize().unwrap();

    let tag = manager.context().unwrap().generation();
    manager.ensure_current(tag).unwrap();

    manager.clear().unwrap();
    let err = manager.ensure_current(tag).unwrap_err();
    match err {
        ManagerError::StaleContext {
            held_generation,
            current_generation,
        } => {
            assert_eq!(held_generation, tag);
            assert_eq!(current_generation, None);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn context_guard_exposes_handle_for_reads_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir);
    manager.initialize().unwrap();

    {
        let mut guard = manager.context().unwrap();
        guard
            .handle_mut()
            .execute_batch("CREATE TABLE scratch (value TEXT); INSERT INTO scratch (value) VALUES ('row');")
            .unwrap();
        assert_eq!(scratch_count(guard.handle()), 1);
    }

    manager.clear().unwrap();
}
