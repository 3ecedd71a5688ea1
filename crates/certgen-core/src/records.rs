//! Generated records and the rows read back from the store.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client identifier. Positive and sequential within a generation run.
pub type ClientId = i64;

/// A generated client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Client {
    pub client_id: ClientId,
}

/// A generated certificate, identified by an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: String,
}

/// Assignment of a certificate to a client with an expiry date.
///
/// The surrogate key is assigned by the store on insert, so it is not
/// part of the generated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub client_id: ClientId,
    pub certificate_id: String,
    pub expiry_date: NaiveDate,
}

impl Assignment {
    /// An assignment is active while its expiry date is strictly after `today`.
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.expiry_date > today
    }
}

/// A currently-valid assignment joined with its parent client and certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAssignment {
    pub client_id: ClientId,
    pub certificate_id: String,
    pub expiry_date: NaiveDate,
    pub days_until_expiry: i64,
}

/// A stored assignment annotated with its status relative to today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: i64,
    pub client_id: ClientId,
    pub certificate_id: String,
    pub expiry_date: NaiveDate,
    pub is_active: bool,
    /// Only present for active assignments.
    pub days_until_expiry: Option<i64>,
}

/// The three entity types the pipeline writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Certificate,
    Assignment,
}

impl EntityKind {
    /// Name of the backing table.
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::Client => "clients",
            EntityKind::Certificate => "certificates",
            EntityKind::Assignment => "client_certificates",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Client => "clients",
            EntityKind::Certificate => "certificates",
            EntityKind::Assignment => "assignments",
        };
        f.write_str(name)
    }
}

/// The local calendar date used as "today" for expiry calculations.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Whole days from `today` until `expiry` (negative when already expired).
pub fn days_until(expiry: NaiveDate, today: NaiveDate) -> i64 {
    expiry.signed_duration_since(today).num_days()
}
