//! Short-lived connections to the embedded SQL engine.
//!
//! One connection is opened per thread of use: API handlers and workers open,
//! use and close a connection per call; the scheduler keeps one for the
//! lifetime of its loop. Every connection gets the same pragmas so the
//! durability and concurrency story is identical no matter who opens it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::StoreResult;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the database file. Cheap to clone; holds no connection itself.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection, configured per the store's durability and
    /// concurrency defaults: WAL journaling, foreign keys enforced, a 5s
    /// busy-wait on writer contention, and normal-synchronous durability.
    pub fn connect(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Begin an immediate transaction: the writer lock is acquired at `BEGIN`,
/// so concurrent writers serialize at transaction start rather than at the
/// first write statement. Every claim, terminal transition and batch insert
/// in this crate uses this.
pub fn begin_immediate(conn: &mut Connection) -> StoreResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Begin a deferred transaction, for read paths that don't need the writer
/// lock up front.
pub fn begin_deferred(conn: &mut Connection) -> StoreResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Deferred)?)
}
