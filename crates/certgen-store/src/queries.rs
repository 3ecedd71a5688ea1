//! Paginated read queries over a finished store.

use crate::error::StoreError;
use crate::schema::BUSY_TIMEOUT;
use crate::stream::active_from_row;
use certgen_core::{
    days_until, ActiveCertificatesPage, AssignmentRecord, AssignmentsPage, ClientId,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Largest accepted page size or limit.
pub const MAX_PAGE_SIZE: u64 = 10_000;

const ACTIVE_CERTIFICATES: &str = "
    SELECT c.client_id, cert.certificate_id, cc.expiry_date
    FROM clients c
    JOIN client_certificates cc ON c.client_id = cc.client_id
    JOIN certificates cert ON cc.certificate_id = cert.certificate_id
    WHERE cc.expiry_date > ?1 AND (?2 IS NULL OR c.client_id = ?2)
    ORDER BY c.client_id, cc.expiry_date, cc.id
    LIMIT ?3 OFFSET ?4
";

const ACTIVE_CERTIFICATES_COUNT: &str = "
    SELECT COUNT(*)
    FROM clients c
    JOIN client_certificates cc ON c.client_id = cc.client_id
    JOIN certificates cert ON cc.certificate_id = cert.certificate_id
    WHERE cc.expiry_date > ?1 AND (?2 IS NULL OR c.client_id = ?2)
";

const ASSIGNMENTS: &str = "
    SELECT cc.id, cc.client_id, cc.certificate_id, cc.expiry_date
    FROM client_certificates cc
    WHERE (?2 IS NULL OR cc.client_id = ?2) AND (?3 = 0 OR cc.expiry_date > ?1)
    ORDER BY cc.client_id, cc.expiry_date DESC, cc.id
    LIMIT ?4 OFFSET ?5
";

const ASSIGNMENTS_COUNT: &str = "
    SELECT COUNT(*)
    FROM client_certificates cc
    WHERE (?2 IS NULL OR cc.client_id = ?2) AND (?3 = 0 OR cc.expiry_date > ?1)
";

/// Read side of a store produced by a generation run.
pub struct ReportQueries {
    path: PathBuf,
    connection: Connection,
}

impl ReportQueries {
    /// Open an existing store. A missing file is [`StoreError::NotFound`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let connect_error = |source| StoreError::Connection {
            path: path.to_path_buf(),
            source,
        };
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(connect_error)?;
        connection.busy_timeout(BUSY_TIMEOUT).map_err(connect_error)?;

        Ok(Self {
            path: path.to_path_buf(),
            connection,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One page of currently active certificates.
    pub fn active_certificates(
        &self,
        page: u64,
        page_size: u64,
        client_id: Option<ClientId>,
    ) -> Result<ActiveCertificatesPage, StoreError> {
        self.active_certificates_as_of(certgen_core::today(), page, page_size, client_id)
    }

    /// One page of certificates expiring strictly after `today`, ordered by
    /// client then expiry. Pages are 1-based.
    pub fn active_certificates_as_of(
        &self,
        today: NaiveDate,
        page: u64,
        page_size: u64,
        client_id: Option<ClientId>,
    ) -> Result<ActiveCertificatesPage, StoreError> {
        if page < 1 {
            return Err(StoreError::Configuration("page must be at least 1".to_string()));
        }
        check_window("page_size", page_size)?;

        let offset = (page - 1).saturating_mul(page_size);
        let total: i64 = self.connection.query_row(
            ACTIVE_CERTIFICATES_COUNT,
            params![today, client_id],
            |row| row.get(0),
        )?;

        let mut stmt = self.connection.prepare_cached(ACTIVE_CERTIFICATES)?;
        let certificates = stmt
            .query_map(
                params![today, client_id, page_size as i64, sql_offset(offset)],
                |row| active_from_row(row, today),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Active certificates page {} ({} of {})",
            page,
            certificates.len(),
            total
        );
        Ok(ActiveCertificatesPage::new(
            certificates,
            total as u64,
            page,
            page_size,
        ))
    }

    /// A window of assignments annotated relative to the current date.
    pub fn assignments(
        &self,
        skip: u64,
        limit: u64,
        client_id: Option<ClientId>,
        active_only: bool,
    ) -> Result<AssignmentsPage, StoreError> {
        self.assignments_as_of(certgen_core::today(), skip, limit, client_id, active_only)
    }

    /// A window of assignments ordered by client, latest expiry first.
    pub fn assignments_as_of(
        &self,
        today: NaiveDate,
        skip: u64,
        limit: u64,
        client_id: Option<ClientId>,
        active_only: bool,
    ) -> Result<AssignmentsPage, StoreError> {
        check_window("limit", limit)?;

        let total: i64 = self.connection.query_row(
            ASSIGNMENTS_COUNT,
            params![today, client_id, active_only],
            |row| row.get(0),
        )?;

        let mut stmt = self.connection.prepare_cached(ASSIGNMENTS)?;
        let assignments = stmt
            .query_map(
                params![today, client_id, active_only, limit as i64, sql_offset(skip)],
                |row| {
                    let expiry_date: NaiveDate = row.get(3)?;
                    let is_active = expiry_date > today;
                    Ok(AssignmentRecord {
                        id: row.get(0)?,
                        client_id: row.get(1)?,
                        certificate_id: row.get(2)?,
                        expiry_date,
                        is_active,
                        days_until_expiry: is_active.then(|| days_until(expiry_date, today)),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AssignmentsPage::new(assignments, total as u64, skip, limit))
    }
}

/// OFFSET past every row. Offsets beyond `i64::MAX` clamp instead of wrapping
/// negative, which SQLite would read as zero.
fn sql_offset(offset: u64) -> i64 {
    i64::try_from(offset).unwrap_or(i64::MAX)
}

fn check_window(name: &str, value: u64) -> Result<(), StoreError> {
    if value == 0 || value > MAX_PAGE_SIZE {
        return Err(StoreError::Configuration(format!(
            "{name} must be between 1 and {MAX_PAGE_SIZE}, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BufferedStore, StoreSettings};
    use certgen_core::{Assignment, Certificate, Client};
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 6, 1)
    }

    /// Clients 1..=5, each with one expired and three active assignments.
    fn seed(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("report.db");
        let mut store = BufferedStore::new(&path, StoreSettings::explicit(1_000)).unwrap();
        store.connect().unwrap();
        store.create_schema().unwrap();

        store
            .insert_clients_batch((1..=5).map(|client_id| Client { client_id }))
            .unwrap();
        store
            .insert_certificates_batch((0..4).map(|i| Certificate {
                certificate_id: format!("cert-{i}"),
            }))
            .unwrap();

        let mut assignments = Vec::new();
        for client_id in 1..=5 {
            assignments.push(Assignment {
                client_id,
                certificate_id: "cert-0".to_string(),
                expiry_date: today() - chrono::Duration::days(10),
            });
            for i in 1..=3 {
                assignments.push(Assignment {
                    client_id,
                    certificate_id: format!("cert-{i}"),
                    expiry_date: today() + chrono::Duration::days(30 * i),
                });
            }
        }
        store.insert_assignments_batch(assignments).unwrap();
        store.close().unwrap();
        path
    }

    #[test]
    fn test_missing_store_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = ReportQueries::open(dir.path().join("missing.db"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_active_certificates_pagination() {
        let dir = TempDir::new().unwrap();
        let queries = ReportQueries::open(seed(&dir)).unwrap();

        let first = queries.active_certificates_as_of(today(), 1, 4, None).unwrap();
        assert_eq!(first.total_count, 15);
        assert_eq!(first.certificates.len(), 4);
        assert!(first.has_next);
        assert!(first.certificates.iter().all(|c| c.expiry_date > today()));

        let last = queries.active_certificates_as_of(today(), 4, 4, None).unwrap();
        assert_eq!(last.certificates.len(), 3);
        assert!(!last.has_next);

        let beyond = queries.active_certificates_as_of(today(), 10, 4, None).unwrap();
        assert!(beyond.certificates.is_empty());
        assert_eq!(beyond.total_count, 15);
        assert!(!beyond.has_next);

        let mut all = Vec::new();
        for page in 1..=4 {
            all.extend(
                queries
                    .active_certificates_as_of(today(), page, 4, None)
                    .unwrap()
                    .certificates,
            );
        }
        assert_eq!(all.len(), 15);
        assert!(all
            .windows(2)
            .all(|w| (w[0].client_id, w[0].expiry_date) <= (w[1].client_id, w[1].expiry_date)));
    }

    #[test]
    fn test_active_certificates_client_filter() {
        let dir = TempDir::new().unwrap();
        let queries = ReportQueries::open(seed(&dir)).unwrap();

        let page = queries
            .active_certificates_as_of(today(), 1, 100, Some(3))
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert!(page.certificates.iter().all(|c| c.client_id == 3));
        assert_eq!(page.certificates[0].days_until_expiry, 30);
    }

    #[test]
    fn test_assignments_annotation_and_order() {
        let dir = TempDir::new().unwrap();
        let queries = ReportQueries::open(seed(&dir)).unwrap();

        let page = queries
            .assignments_as_of(today(), 0, 100, Some(2), false)
            .unwrap();
        assert_eq!(page.total_count, 4);
        assert!(!page.has_next);

        let expiries: Vec<NaiveDate> = page.assignments.iter().map(|a| a.expiry_date).collect();
        let mut sorted = expiries.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(expiries, sorted);

        for record in &page.assignments {
            assert_eq!(record.is_active, record.expiry_date > today());
            assert_eq!(record.days_until_expiry.is_some(), record.is_active);
        }
    }

    #[test]
    fn test_assignments_active_only_and_window() {
        let dir = TempDir::new().unwrap();
        let queries = ReportQueries::open(seed(&dir)).unwrap();

        let active = queries.assignments_as_of(today(), 0, 100, None, true).unwrap();
        assert_eq!(active.total_count, 15);
        assert!(active.assignments.iter().all(|a| a.is_active));

        let window = queries.assignments_as_of(today(), 18, 5, None, false).unwrap();
        assert_eq!(window.total_count, 20);
        assert_eq!(window.assignments.len(), 2);
        assert!(!window.has_next);

        let window = queries.assignments_as_of(today(), 5, 5, None, false).unwrap();
        assert!(window.has_next);
        assert!(window.assignments.windows(2).all(|w| w[0].client_id <= w[1].client_id));
    }

    #[test]
    fn test_offsets_beyond_i64_are_empty() {
        let dir = TempDir::new().unwrap();
        let queries = ReportQueries::open(seed(&dir)).unwrap();

        let page = queries
            .active_certificates_as_of(today(), u64::MAX / 2, 10, None)
            .unwrap();
        assert!(page.certificates.is_empty());
        assert_eq!(page.total_count, 15);
        assert!(!page.has_next);

        let window = queries
            .assignments_as_of(today(), u64::MAX, 10, None, false)
            .unwrap();
        assert!(window.assignments.is_empty());
        assert_eq!(window.total_count, 20);
        assert!(!window.has_next);

        assert_eq!(sql_offset(i64::MAX as u64 + 1), i64::MAX);
        assert_eq!(sql_offset(40), 40);
    }

    #[test]
    fn test_invalid_windows_rejected() {
        let dir = TempDir::new().unwrap();
        let queries = ReportQueries::open(seed(&dir)).unwrap();

        for (page, size) in [(0, 10), (1, 0), (1, MAX_PAGE_SIZE + 1)] {
            assert!(matches!(
                queries.active_certificates_as_of(today(), page, size, None),
                Err(StoreError::Configuration(_))
            ));
        }
        assert!(matches!(
            queries.assignments_as_of(today(), 0, 0, None, false),
            Err(StoreError::Configuration(_))
        ));
        assert!(queries
            .active_certificates_as_of(today(), 1, MAX_PAGE_SIZE, None)
            .is_ok());
    }
}
