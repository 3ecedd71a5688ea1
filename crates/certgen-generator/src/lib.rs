//! Synthetic record generator for the certgen pipeline.
//!
//! [`RecordGenerator`] produces clients, certificates and assignments in
//! batches. The `*_parallel` methods split the ID range into `batch_size`
//! chunks, hand them to a fixed pool of worker threads and return a
//! [`BatchStream`] that yields each batch as soon as a worker finishes it.
//!
//! # Architecture
//!
//! ```text
//!   task queue: (start, count) ...
//!          │
//!    ┌─────┴─────┬───────────┐
//!    ▼           ▼           ▼
//! worker 0    worker 1    worker N      each owns its worker-local state
//!    │           │           │
//!    └─────┬─────┴───────────┘
//!          ▼
//!   bounded output channel ──► BatchStream (completion order)
//! ```
//!
//! Batches arrive in completion order, not ID order. The union of all
//! batches covers the requested range exactly once.
//!
//! # Example
//!
//! ```rust
//! use certgen_generator::RecordGenerator;
//!
//! let generator = RecordGenerator::new(10, 20, Some(5), Some(2)).unwrap();
//! let mut ids: Vec<i64> = generator
//!     .generate_clients_parallel()
//!     .unwrap()
//!     .flat_map(|batch| batch.unwrap())
//!     .map(|client| client.client_id)
//!     .collect();
//! ids.sort_unstable();
//! assert_eq!(ids, (1..=10).collect::<Vec<_>>());
//! ```

pub mod batch;
pub mod certificate;
mod error;
pub mod generator;
pub mod pool;

pub use certificate::certificate_id;
pub use error::GeneratorError;
pub use generator::{RecordGenerator, DEFAULT_DB_PATH};
pub use pool::BatchStream;
