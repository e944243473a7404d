//! Persistence for users and posts.
//!
//! Handlers only see the repository traits; the SQLite implementations run
//! their queries on the shared r2d2 pool.

pub mod posts;
pub mod users;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// True when `err` is a UNIQUE violation whose message names `column`
/// (`table.column`). Other constraint failures stay plain SQL errors.
pub(crate) fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains(column)
        }
        _ => false,
    }
}
