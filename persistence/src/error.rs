//! Errors produced by the persistence substrate.

use thiserror::Error;

/// Errors from the immutable versioned repository substrate (`spec.md` §4.1).
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A partial unique index on active rows was violated by `insert_v1`.
    #[error("duplicate active row for business id {0}")]
    DuplicateActive(String),

    /// `update`/`soft_delete` found no active row for the given business id.
    #[error("no active row for business id {0}")]
    NotFound(String),

    /// The caller's `update` was based on a version that is no longer current —
    /// another writer raced ahead. Single-writer components (SMS, TMS) should
    /// never see this in practice; it is a correctness backstop.
    #[error("stale version: business id {id} expected version {expected}, current is {current}")]
    StaleVersion {
        id: String,
        expected: i64,
        current: i64,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
