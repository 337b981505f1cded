//! SQLite persistence for photos, diaries, categories and emotions.
//!
//! Every writer that can race another upload (category names, the lazily
//! created diary) goes through a UNIQUE constraint. A violation surfaces as
//! [`DbError::ConflictRetry`] and is resolved inside this module by reading
//! back the row that won.

mod schema;
pub mod categories;
pub mod diaries;
pub mod emotions;
pub mod photos;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub use categories::{Category, CategorySummary};
pub use diaries::Diary;
pub use emotions::Emotion;
pub use photos::{NewPhoto, Photo, SignedUrl};
pub use schema::SCHEMA;

/// Errors produced by the persistence layer.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A UNIQUE constraint rejected an insert because another writer got there first.
    /// Never leaves this module.
    #[error("Uniqueness conflict on {0}")]
    ConflictRetry(&'static str),

    /// A row that was just observed (or just lost a race) could not be read back.
    #[error("{0} vanished after a uniqueness conflict")]
    Vanished(&'static str),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Start a write transaction that takes the database write lock up front,
    /// so two connections cannot both read "absent" and then both insert.
    pub(crate) fn immediate_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

/// Map a unique-constraint violation on `what` to [`DbError::ConflictRetry`].
fn guard_unique<T>(result: rusqlite::Result<T>, what: &'static str) -> Result<T> {
    result.map_err(|e| {
        if is_unique_violation(&e) {
            DbError::ConflictRetry(what)
        } else {
            DbError::Sqlite(e)
        }
    })
}

/// `query_row` that maps "no rows" to `None`.
fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
