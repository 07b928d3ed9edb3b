//! Process-wide shared manager accessor.
//!
//! # Responsibility
//! - Hand out the single manager instance shared by the whole process.
//! - Resolve the shared store location from the environment.
//!
//! # Invariants
//! - Exactly one manager is ever constructed, including under concurrent
//!   first access.
//! - The shared store location is resolved once and never changes afterward.

use crate::manager::ContextManager;
use crate::store::{SqliteStoreEngine, StoreLocation};
use std::sync::OnceLock;

const SHARED_STORE_FILE_NAME: &str = "localstore.sqlite3";
const SHARED_STORE_PATH_ENV: &str = "LOCALSTORE_DB_PATH";

static SHARED_MANAGER: OnceLock<ContextManager<SqliteStoreEngine>> = OnceLock::new();

/// Returns the process-wide shared manager, constructing it on first call.
///
/// Every call returns the same instance. Construction performs no store
/// I/O; callers drive `initialize`/`clear` explicitly.
pub fn shared_manager() -> &'static ContextManager<SqliteStoreEngine> {
    SHARED_MANAGER
        .get_or_init(|| ContextManager::new(SqliteStoreEngine, resolve_shared_location()))
}

fn resolve_shared_location() -> StoreLocation {
    if let Ok(raw) = std::env::var(SHARED_STORE_PATH_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return StoreLocation::file(trimmed.to_string());
        }
    }
    StoreLocation::File(std::env::temp_dir().join(SHARED_STORE_FILE_NAME))
}
