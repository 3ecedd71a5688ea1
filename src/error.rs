//! Error types for the pipeline and service layers.

use certgen_generator::GeneratorError;
use certgen_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during an end-to-end generation run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Record generation failed, including invalid batch or worker sizes.
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// Writing to or reading from the store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An output file or directory could not be written.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors surfaced to callers of the certificate service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A generation is already running.
    #[error("Generation already in progress")]
    Conflict,

    /// The store or report does not exist yet.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request parameters out of range.
    #[error("Invalid request: {0}")]
    Configuration(String),

    /// The background generation failed; carries the recorded message.
    #[error("Generation failed: {0}")]
    Pipeline(String),

    /// A read query failed.
    #[error("Query error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => ServiceError::NotFound(format!(
                "no certificate store at {}; run a generation first",
                path.display()
            )),
            StoreError::Configuration(message) => ServiceError::Configuration(message),
            other => ServiceError::Store(other),
        }
    }
}
