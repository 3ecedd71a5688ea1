//! Core types for the certgen pipeline.
//!
//! This crate provides the record and row types shared by every other
//! certgen crate:
//!
//! - [`Client`], [`Certificate`], [`Assignment`] - records produced by the generator
//! - [`ActiveAssignment`], [`AssignmentRecord`] - rows read back from the store
//! - [`ActiveCertificatesPage`], [`AssignmentsPage`] - paginated query results
//!
//! # Architecture
//!
//! ```text
//! certgen-core (this crate)
//!    │
//!    ├─── certgen-advisor     (sizing heuristic, no dependency on records)
//!    ├─── certgen-generator   (produces Client / Certificate / Assignment)
//!    └─── certgen-store       (buffers, flushes and reads them back)
//! ```

pub mod page;
pub mod records;

pub use page::{ActiveCertificatesPage, AssignmentsPage};
pub use records::{
    days_until, today, ActiveAssignment, Assignment, AssignmentRecord, Certificate, Client,
    ClientId, EntityKind,
};
