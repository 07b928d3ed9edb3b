//! Storage engine contract and SQLite implementation.
//!
//! # Responsibility
//! - Open file or in-memory SQLite stores and configure the connection.
//! - Release a connection, dropping any uncommitted work first.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a bounded busy timeout.
//! - A corrupt store file fails `open_or_create`, not some later caller query.

use super::{StoreError, StoreLocation, StoreResult};
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Capability surface the context manager needs from a storage engine.
///
/// `discard_pending` consumes the handle; on failure the handle is returned
/// alongside the error so the caller can keep treating it as live.
pub trait StoreEngine {
    type Handle;

    fn open_or_create(&self, location: &StoreLocation) -> StoreResult<Self::Handle>;
    fn discard_pending(&self, handle: Self::Handle) -> Result<(), (Self::Handle, StoreError)>;
}

/// SQLite-backed storage engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteStoreEngine;

impl StoreEngine for SqliteStoreEngine {
    type Handle = Connection;

    /// Opens the store at `location`, creating the file when absent.
    ///
    /// # Side effects
    /// - Configures connection pragmas and busy timeout.
    /// - Emits `store_open` logging events with duration and status.
    fn open_or_create(&self, location: &StoreLocation) -> StoreResult<Connection> {
        let started_at = Instant::now();
        let mode = location.mode_label();
        info!("event=store_open module=store status=start mode={mode}");

        let opened = match location {
            StoreLocation::File(path) => Connection::open(path),
            StoreLocation::Memory => Connection::open_in_memory(),
        };

        let conn = opened
            .and_then(|conn| configure(&conn).map(|()| conn))
            .map_err(|err| {
                error!(
                    "event=store_open module=store status=error mode={mode} duration_ms={} error_code=store_unavailable error={err}",
                    started_at.elapsed().as_millis()
                );
                StoreError::Unavailable {
                    location: location.to_string(),
                    source: err,
                }
            })?;

        info!(
            "event=store_open module=store status=ok mode={mode} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(conn)
    }

    /// Rolls back any open transaction and releases the connection.
    ///
    /// # Side effects
    /// - Emits `store_discard` logging events with duration and status.
    fn discard_pending(&self, handle: Connection) -> Result<(), (Connection, StoreError)> {
        let started_at = Instant::now();
        let rolled_back = !handle.is_autocommit();

        if rolled_back {
            if let Err(err) = handle.execute_batch("ROLLBACK;") {
                error!(
                    "event=store_discard module=store status=error stage=rollback duration_ms={} error_code=discard_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                return Err((handle, StoreError::DiscardFailed { source: err }));
            }
        }

        match handle.close() {
            Ok(()) => {
                info!(
                    "event=store_discard module=store status=ok rolled_back={rolled_back} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err((handle, err)) => {
                error!(
                    "event=store_discard module=store status=error stage=close duration_ms={} error_code=discard_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                Err((handle, StoreError::DiscardFailed { source: err }))
            }
        }
    }
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    // Probe read so a corrupt or non-database file is rejected here.
    conn.query_row("PRAGMA schema_version;", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}
