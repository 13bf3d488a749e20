//! SQLite connection ownership, schema bootstrap and migration.

use crate::{EngineConfig, NoteTreeError, Result};
use log::{info, warn};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::path::Path;

/// Name of the unique index that enforces one sequence per slot in a group.
pub const GROUP_SEQUENCE_INDEX: &str = "note_order_group_seq";

pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Creates (or re-initialises) a store at `path` and applies the schema.
    pub fn create<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        configure(&conn, config)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        info!(
            "event=store_create module=storage status=ok path={}",
            path.as_ref().display()
        );
        Ok(Self { conn })
    }

    /// Opens an existing store, validating its tables and migrating indexes.
    pub fn open<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        configure(&conn, config)?;

        // Validate database structure
        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type='table'
                 AND name IN ('projects', 'notes', 'note_order')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| NoteTreeError::InvalidStore(e.to_string()))?;

        if table_count != 3 {
            return Err(NoteTreeError::InvalidStore(
                "Not a valid Notetree database".to_string(),
            ));
        }

        // Migrate: stores written before uniqueness was enforced lack the index.
        let index_exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?1",
            [GROUP_SEQUENCE_INDEX],
            |row| row.get::<_, i64>(0).map(|count| count > 0),
        )?;

        if !index_exists {
            let created = conn.execute_batch(
                "CREATE UNIQUE INDEX note_order_group_seq
                    ON note_order(project_id, IFNULL(parent_id, ''), sequence)",
            );
            match created {
                Ok(()) => info!("event=store_migrate module=storage status=ok index={GROUP_SEQUENCE_INDEX}"),
                // Existing duplicates; the store stays usable so normalize can repair it.
                Err(rusqlite::Error::SqliteFailure(e, msg))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    warn!(
                        "event=store_migrate module=storage status=skipped index={GROUP_SEQUENCE_INDEX} error={}",
                        msg.unwrap_or_default()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "event=store_open module=storage status=ok path={}",
            path.as_ref().display()
        );
        Ok(Self { conn })
    }

    /// Opens a private in-memory store with the schema applied.
    pub fn open_in_memory(config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn, config)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begins a transaction that takes the database write lock up front.
    ///
    /// Every read-compute-write sequence (next sequence, park/shift/place,
    /// subtree collection) runs under this lock, so two sessions on the same
    /// file serialize instead of reading each other's intermediate ranks.
    pub fn immediate_transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

fn configure(conn: &Connection, config: &EngineConfig) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(config.busy_timeout())?;
    Ok(())
}
