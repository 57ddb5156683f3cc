//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from a `StoreConfig`.
//! - Configure connection pragmas required by core behavior.
//! - Ensure entity tables before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have the configured `foreign_keys` state.
//! - Returned connections have every entity table in place.
//! - A connection that fails bootstrap is dropped (closed) before the error
//!   is returned.

use super::schema::ensure_schema;
use super::StoreConfig;
use crate::error::EntResult;
use crate::model::entity::EntityDef;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::time::Instant;

/// In-memory database shared by every shared-cache connection of the process.
const SHARED_MEMORY_URI: &str = "file::memory:?cache=shared";

/// Opens the configured database and ensures tables for `entities`.
///
/// # Side effects
/// - Creates the database file when it does not exist.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(config: &StoreConfig, entities: &[&EntityDef]) -> EntResult<Connection> {
    let started_at = Instant::now();
    let mode = config.mode();
    info!("event=db_open module=db status=start mode={mode}");

    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if config.shared_cache {
        flags |= OpenFlags::SQLITE_OPEN_SHARED_CACHE;
    }

    let opened = match config.path.as_deref() {
        Some(path) => Connection::open_with_flags(path, flags),
        None if config.shared_cache => Connection::open_with_flags(SHARED_MEMORY_URI, flags),
        None => Connection::open_in_memory_with_flags(flags),
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, config, entities) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(
    conn: &mut Connection,
    config: &StoreConfig,
    entities: &[&EntityDef],
) -> EntResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(config.busy_timeout)?;
    ensure_schema(conn, entities)?;
    Ok(())
}
