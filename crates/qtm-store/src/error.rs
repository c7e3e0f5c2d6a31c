//! Error type for the qtm store.
//!
//! Wraps the failure stages a store call can hit: opening the
//! database, running a transaction, touching a table, reading or
//! writing rows, committing, and (de)serializing record values.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open store: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("store transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("store table unavailable: {0}")]
    Table(#[from] redb::TableError),

    #[error("store access failed: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("store commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("bad store record: {0}")]
    Encoding(#[from] serde_json::Error),
}
