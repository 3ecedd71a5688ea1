//! Error types for the buffered store.

use certgen_core::EntityKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing to or reading from the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Invalid sizing or pagination parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The store directory could not be created.
    #[error("Failed to prepare store directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Opening or configuring the connection failed.
    #[error("Failed to connect to {path}: {source}")]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// An operation needed the connection before `connect` was called.
    #[error("Store is not connected")]
    NotConnected,

    /// Table or index creation failed; the schema transaction was rolled back.
    #[error("Schema creation failed: {0}")]
    Schema(#[source] rusqlite::Error),

    /// A buffer could not be committed. The buffer is kept, so the flush can
    /// be retried.
    #[error("Failed to flush {entity}: {source}")]
    Flush {
        entity: EntityKind,
        #[source]
        source: rusqlite::Error,
    },

    /// A page of the active-assignment stream could not be read.
    #[error("Streaming query failed at offset {offset}: {source}")]
    StreamingQuery {
        offset: u64,
        #[source]
        source: rusqlite::Error,
    },

    /// The store file does not exist yet.
    #[error("Store not found at {0}; run a generation first")]
    NotFound(PathBuf),

    /// Any other SQLite failure.
    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// A thread panicked while holding a store lock.
    #[error("Store lock poisoned")]
    Poisoned,
}
