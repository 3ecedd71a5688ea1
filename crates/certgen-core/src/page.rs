//! Paginated query results.

use crate::records::{ActiveAssignment, AssignmentRecord};
use serde::{Deserialize, Serialize};

/// One page of active certificates, addressed by 1-based page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCertificatesPage {
    pub certificates: Vec<ActiveAssignment>,
    pub total_count: u64,
    pub page: u64,
    pub page_size: u64,
    pub has_next: bool,
}

impl ActiveCertificatesPage {
    pub fn new(
        certificates: Vec<ActiveAssignment>,
        total_count: u64,
        page: u64,
        page_size: u64,
    ) -> Self {
        Self {
            certificates,
            total_count,
            page,
            page_size,
            has_next: page.saturating_mul(page_size) < total_count,
        }
    }
}

/// One window of assignments, addressed by skip/limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentsPage {
    pub assignments: Vec<AssignmentRecord>,
    pub total_count: u64,
    pub skip: u64,
    pub limit: u64,
    pub has_next: bool,
}

impl AssignmentsPage {
    pub fn new(
        assignments: Vec<AssignmentRecord>,
        total_count: u64,
        skip: u64,
        limit: u64,
    ) -> Self {
        Self {
            assignments,
            total_count,
            skip,
            limit,
            has_next: skip.saturating_add(limit) < total_count,
        }
    }
}
