//! Error types for the record generator.

use thiserror::Error;

/// Errors that can occur while generating records.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Invalid sizing parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A worker thread could not be started.
    #[error("Failed to spawn generator worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// One or more worker threads panicked; their batches are missing.
    #[error("{count} generator worker(s) panicked")]
    WorkerPanicked { count: usize },

    /// Reading the certificate pool failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}
