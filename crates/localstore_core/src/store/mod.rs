//! Local storage engine boundary.
//!
//! # Responsibility
//! - Define the narrow capability surface the context manager needs from a
//!   storage engine: open-or-create a store, discard a handle's pending work.
//! - Provide the SQLite-backed engine used by the process-wide manager.
//!
//! # Invariants
//! - The engine never retries on its own; every failure is returned to the
//!   caller as an explicit result.
//! - A failed discard hands the handle back so the caller can keep it live.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod engine;

pub use engine::{SqliteStoreEngine, StoreEngine};

pub type StoreResult<T> = Result<T, StoreError>;

/// Where a store's data lives.
///
/// `Memory` exists for tests and throwaway sessions; file stores are the
/// normal mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

impl StoreLocation {
    /// Creates a file-backed location.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Stable label used in `mode=` log fields.
    pub fn mode_label(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

impl Display for StoreLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => write!(f, ":memory:"),
        }
    }
}

/// Engine-level failure taxonomy.
#[derive(Debug)]
pub enum StoreError {
    /// The backing store could not be opened or created.
    Unavailable {
        location: String,
        source: rusqlite::Error,
    },
    /// Pending changes could not be discarded or the handle not released.
    DiscardFailed { source: rusqlite::Error },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { location, source } => {
                write!(f, "store at `{location}` is unavailable: {source}")
            }
            Self::DiscardFailed { source } => {
                write!(f, "failed to discard pending changes: {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            Self::DiscardFailed { source } => Some(source),
        }
    }
}
