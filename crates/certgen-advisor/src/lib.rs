//! Resource-aware sizing for the certgen pipeline.
//!
//! [`advise`] is a pure function of the host resources and the requested
//! record counts. It picks the worker count, generation batch size, write
//! buffer threshold and read chunk size so that one batch stays within a
//! fraction of the available memory.
//!
//! [`HostResources::detect`] is the only part that touches the system; tests
//! build [`HostResources`] by hand.
//!
//! ```rust
//! use certgen_advisor::{advise, HostResources};
//!
//! let host = HostResources::new(8, 16.0, 8.0);
//! let settings = advise(1_000, 2_000, &host);
//! assert_eq!(settings.num_workers, 4);
//! assert_eq!(settings.batch_size, 10_000);
//! ```

mod host;
mod settings;

pub use host::{log_memory_usage, process_memory_mb, HostResources};
pub use settings::{
    advise, chunk_size, optimal_batch_size, optimal_workers, write_buffer_size, DataEstimate,
    Settings,
};
