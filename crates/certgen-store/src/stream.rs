//! Chunked iteration over active assignments.

use crate::error::StoreError;
use certgen_core::{days_until, ActiveAssignment};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use std::sync::Mutex;
use tracing::debug;

/// Active assignments joined with both parents. `cc.id` breaks ties so
/// LIMIT/OFFSET pages never overlap.
const ACTIVE_PAGE: &str = "
    SELECT c.client_id, cert.certificate_id, cc.expiry_date
    FROM clients c
    JOIN client_certificates cc ON c.client_id = cc.client_id
    JOIN certificates cert ON cc.certificate_id = cert.certificate_id
    WHERE cc.expiry_date > ?1
    ORDER BY c.client_id, cc.expiry_date, cc.id
    LIMIT ?2 OFFSET ?3
";

pub(crate) fn active_from_row(
    row: &Row<'_>,
    today: NaiveDate,
) -> rusqlite::Result<ActiveAssignment> {
    let expiry_date: NaiveDate = row.get(2)?;
    Ok(ActiveAssignment {
        client_id: row.get(0)?,
        certificate_id: row.get(1)?,
        expiry_date,
        days_until_expiry: days_until(expiry_date, today),
    })
}

/// Lazy sequence of active-assignment chunks.
///
/// Each call to `next` locks the store connection for one page only, so
/// flushes may interleave with a running stream. Iteration ends after the
/// first short or empty page, or after the first error.
pub struct ActiveAssignments<'a> {
    connection: &'a Mutex<Connection>,
    today: NaiveDate,
    chunk_size: usize,
    offset: u64,
    done: bool,
}

impl<'a> ActiveAssignments<'a> {
    pub(crate) fn new(
        connection: &'a Mutex<Connection>,
        today: NaiveDate,
        chunk_size: usize,
    ) -> Self {
        Self {
            connection,
            today,
            chunk_size,
            offset: 0,
            done: false,
        }
    }

    fn fetch_page(&self) -> Result<Vec<ActiveAssignment>, StoreError> {
        let conn = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        let query_error = |source| StoreError::StreamingQuery {
            offset: self.offset,
            source,
        };

        let mut stmt = conn.prepare_cached(ACTIVE_PAGE).map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![self.today, self.chunk_size as i64, self.offset as i64],
                |row| active_from_row(row, self.today),
            )
            .map_err(query_error)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }
}

impl Iterator for ActiveAssignments<'_> {
    type Item = Result<Vec<ActiveAssignment>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page = match self.fetch_page() {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        if page.len() < self.chunk_size {
            self.done = true;
        }
        if page.is_empty() {
            return None;
        }

        debug!(
            "Fetched {} active assignments at offset {}",
            page.len(),
            self.offset
        );
        self.offset += page.len() as u64;
        Some(Ok(page))
    }
}
