//! Buffered SQLite store for the certgen pipeline.
//!
//! [`BufferedStore`] accumulates generated records in one in-memory buffer
//! per entity type and writes a buffer out in a single transaction once it
//! reaches the configured threshold. All flushes and streaming reads share
//! one connection behind a mutex, so only one flush runs at a time.
//!
//! [`ReportQueries`] serves the paginated read side from its own connection
//! to an existing store file.
//!
//! # Example
//!
//! ```rust
//! use certgen_core::{Client, EntityKind};
//! use certgen_store::{BufferedStore, StoreSettings};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("certs.db");
//! let mut store = BufferedStore::new(path, StoreSettings::explicit(2)).unwrap();
//! store.connect().unwrap();
//! store.create_schema().unwrap();
//!
//! store.insert_clients_batch(vec![Client { client_id: 1 }]).unwrap();
//! assert_eq!(store.committed_count(EntityKind::Client).unwrap(), 0);
//!
//! store.insert_clients_batch(vec![Client { client_id: 2 }]).unwrap();
//! assert_eq!(store.committed_count(EntityKind::Client).unwrap(), 2);
//! store.close().unwrap();
//! ```

mod error;
pub mod queries;
pub mod schema;
pub mod store;
pub mod stream;

pub use error::StoreError;
pub use queries::{ReportQueries, MAX_PAGE_SIZE};
pub use store::{BufferedStore, StoreSettings};
pub use stream::ActiveAssignments;
