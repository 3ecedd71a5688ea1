//! certgen library
//!
//! Generates synthetic clients, certificates and client-certificate
//! assignments at scale, streams them into a SQLite store under bounded
//! memory, and serves paginated queries plus a CSV export of the
//! assignments that are still active.
//!
//! # Crates
//!
//! - `certgen_core` - record, row and page types
//! - `certgen_advisor` - host detection and batch/worker/buffer sizing
//! - `certgen_generator` - deterministic IDs and the parallel batch generator
//! - `certgen_store` - buffered writes, streaming reads and report queries
//!
//! This crate sequences them ([`pipeline`]), tracks progress ([`status`]),
//! exposes the in-process service API ([`service`]) and writes CSV
//! ([`export`]).
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate with advised sizing
//! certgen generate --num-clients 100000 --num-certificates 200000
//!
//! # Show what the advisor would pick on this host
//! certgen advise --num-clients 1000000 --num-certificates 2000000
//!
//! # Page through the results
//! certgen active --page 2 --page-size 100
//! certgen assignments --client-id 42 --active-only
//! ```

use clap::Parser;
use std::path::PathBuf;

pub mod error;
pub mod export;
pub mod pipeline;
pub mod service;
pub mod status;

pub use error::{PipelineError, ServiceError};
pub use pipeline::{run_pipeline, run_pipeline_with_host, PipelineConfig, PipelineReport};
pub use service::{CertificateService, GenerationAccepted, GenerationRequest};
pub use status::{GenerationStatus, NoProgress, ProgressSink, Stage, StatusHandle};

#[derive(Parser, Clone, Debug)]
pub struct SizingOpts {
    /// Number of clients to generate
    #[arg(long, default_value = "1000", env = "NUM_CLIENTS")]
    pub num_clients: u64,

    /// Number of certificates to generate
    #[arg(long, default_value = "2000", env = "NUM_CERTIFICATES")]
    pub num_certificates: u64,

    /// Records per generated batch (advised when omitted)
    #[arg(long, env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Generator worker threads (advised when omitted)
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Buffered records per entity before a flush (advised when omitted)
    #[arg(long, env = "BUFFER_SIZE")]
    pub write_buffer_size: Option<usize>,
}

impl From<&SizingOpts> for GenerationRequest {
    fn from(opts: &SizingOpts) -> Self {
        Self {
            num_clients: opts.num_clients,
            num_certificates: opts.num_certificates,
            batch_size: opts.batch_size,
            num_workers: opts.num_workers,
            write_buffer_size: opts.write_buffer_size,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct PathOpts {
    /// SQLite database file
    #[arg(long, default_value = certgen_generator::DEFAULT_DB_PATH, env = "DB_PATH")]
    pub db_path: PathBuf,

    /// Directory for CSV output
    #[arg(long, default_value = pipeline::DEFAULT_OUTPUT_DIR, env = "OUTPUT_DIR")]
    pub output_dir: PathBuf,
}

impl PathOpts {
    pub fn service(&self) -> CertificateService {
        CertificateService::new(&self.db_path, &self.output_dir)
    }
}
