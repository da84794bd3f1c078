//! Shared SQLite-backed store.
//!
//! One `Connection` behind a `parking_lot::Mutex`, the same shape as the
//! teacher's `VaultDb`/`DbSignalStorage`: WAL mode for concurrent readers,
//! every business table created here at construction, and every component
//! module (`signals`, `delivery`, `intents`, `broker`, `instruments`,
//! `watchlist`, `mtf_config`, `events`, `monitoring`) adds an `impl Store`
//! block with its own queries against the one connection. Sharing a single
//! connection (rather than a pool) is what lets the race-free primitives in
//! spec §4 (`consume_delivery`, `generate_exit_episode`, `place_exit_order`)
//! run as a single `BEGIN IMMEDIATE` transaction without cross-connection
//! lock contention.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;

use crate::error::AppError;

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

const SCHEMA_SQL: &str = include_str!("schema.sql");

impl Store {
    pub fn open(database_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(database_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn health_check(&self) -> bool {
        self.conn
            .lock()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

/// Reads the current (`deleted_at IS NULL`) `version` for `id` in `table`,
/// failing with `NotFound` if no current row exists (spec §4.1 step 1).
pub(crate) fn current_version(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: &str,
) -> Result<i64, AppError> {
    conn.query_row(
        &format!(
            "SELECT version FROM {table} WHERE {id_column} = ?1 AND deleted_at IS NULL"
        ),
        [id],
        |row| row.get(0),
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("{table}({id_column}={id})"))
        }
        other => AppError::Internal(other.to_string()),
    })
}

/// Soft-deletes the current `(id, version)` row, failing with
/// `ConflictVersion` if it already vanished (spec §4.1 step 2, the
/// optimistic check).
pub(crate) fn soft_delete_current(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: &str,
    version: i64,
    now: &str,
) -> Result<(), AppError> {
    let affected = conn.execute(
        &format!(
            "UPDATE {table} SET deleted_at = ?1 WHERE {id_column} = ?2 AND version = ?3 AND deleted_at IS NULL"
        ),
        rusqlite::params![now, id, version],
    )?;
    if affected == 0 {
        return Err(AppError::ConflictVersion(format!(
            "{table}({id_column}={id}, version={version})"
        )));
    }
    Ok(())
}
