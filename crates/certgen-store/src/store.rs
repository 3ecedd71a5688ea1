//! Write-buffered store.
//!
//! Lock order is always connection first, then an entity buffer. Inserts
//! only touch their buffer; flushes take both so at most one flush writes
//! at a time and a buffer is cleared only after its transaction commits.

use crate::error::StoreError;
use crate::schema::{
    apply_pragmas, CREATE_SCHEMA, INSERT_ASSIGNMENT, UPSERT_CERTIFICATE, UPSERT_CLIENT,
};
use crate::stream::ActiveAssignments;
use certgen_advisor::HostResources;
use certgen_core::{Assignment, Certificate, Client, EntityKind};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Buffer threshold and streaming chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub write_buffer_size: usize,
    pub chunk_size: usize,
}

impl StoreSettings {
    /// Streaming chunk size used when the write buffer is set explicitly.
    pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

    /// Explicit write buffer threshold with the default chunk size.
    pub fn explicit(write_buffer_size: usize) -> Self {
        Self {
            write_buffer_size,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sizes derived from the advisor for this host and dataset.
    pub fn advised(num_clients: u64, num_certificates: u64, host: &HostResources) -> Self {
        let settings = certgen_advisor::advise(num_clients, num_certificates, host);
        Self {
            write_buffer_size: settings.write_buffer_size,
            chunk_size: settings.chunk_size,
        }
    }
}

/// SQLite store with one in-memory write buffer per entity type.
pub struct BufferedStore {
    path: PathBuf,
    settings: StoreSettings,
    connection: Option<Mutex<Connection>>,
    clients: Mutex<Vec<Client>>,
    certificates: Mutex<Vec<Certificate>>,
    assignments: Mutex<Vec<Assignment>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Poisoned)
}

fn write_clients(tx: &Transaction<'_>, rows: &[Client]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(UPSERT_CLIENT)?;
    for client in rows {
        stmt.execute(params![client.client_id])?;
    }
    Ok(())
}

fn write_certificates(tx: &Transaction<'_>, rows: &[Certificate]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(UPSERT_CERTIFICATE)?;
    for certificate in rows {
        stmt.execute(params![certificate.certificate_id])?;
    }
    Ok(())
}

fn write_assignments(tx: &Transaction<'_>, rows: &[Assignment]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare_cached(INSERT_ASSIGNMENT)?;
    for assignment in rows {
        stmt.execute(params![
            assignment.client_id,
            assignment.certificate_id,
            assignment.expiry_date
        ])?;
    }
    Ok(())
}

fn commit_rows<T>(
    conn: &mut Connection,
    rows: &[T],
    write: fn(&Transaction<'_>, &[T]) -> rusqlite::Result<()>,
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    write(&tx, rows)?;
    tx.commit()
}

impl BufferedStore {
    pub fn new(path: impl Into<PathBuf>, settings: StoreSettings) -> Result<Self, StoreError> {
        if settings.write_buffer_size == 0 {
            return Err(StoreError::Configuration(
                "write buffer size must be at least 1".to_string(),
            ));
        }
        if settings.chunk_size == 0 {
            return Err(StoreError::Configuration(
                "chunk size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            path: path.into(),
            settings,
            connection: None,
            clients: Mutex::new(Vec::new()),
            certificates: Mutex::new(Vec::new()),
            assignments: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    /// Open the database file, creating it and its directory if needed.
    pub fn connect(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let connect_error = |source| StoreError::Connection {
            path: self.path.clone(),
            source,
        };
        let conn = Connection::open(&self.path).map_err(connect_error)?;
        apply_pragmas(&conn).map_err(connect_error)?;

        info!(
            "Connected to {} (write buffer {}, chunk size {})",
            self.path.display(),
            self.settings.write_buffer_size,
            self.settings.chunk_size
        );
        self.connection = Some(Mutex::new(conn));
        Ok(())
    }

    /// Lock and return the shared connection.
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        lock(self.connection.as_ref().ok_or(StoreError::NotConnected)?)
    }

    /// Create tables and indexes in one transaction.
    pub fn create_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let result = conn.transaction().and_then(|tx| {
            tx.execute_batch(CREATE_SCHEMA)?;
            tx.commit()
        });

        match result {
            Ok(()) => {
                info!("Tables and indexes created");
                Ok(())
            }
            Err(source) => {
                error!("Schema creation failed: {}", source);
                Err(StoreError::Schema(source))
            }
        }
    }

    pub fn insert_clients_batch(
        &self,
        batch: impl IntoIterator<Item = Client>,
    ) -> Result<(), StoreError> {
        if self.buffer(&self.clients, batch)? {
            self.flush_clients()?;
        }
        Ok(())
    }

    pub fn insert_certificates_batch(
        &self,
        batch: impl IntoIterator<Item = Certificate>,
    ) -> Result<(), StoreError> {
        if self.buffer(&self.certificates, batch)? {
            self.flush_certificates()?;
        }
        Ok(())
    }

    pub fn insert_assignments_batch(
        &self,
        batch: impl IntoIterator<Item = Assignment>,
    ) -> Result<(), StoreError> {
        if self.buffer(&self.assignments, batch)? {
            self.flush_assignments()?;
        }
        Ok(())
    }

    /// Append to a buffer; true when it reached the flush threshold.
    fn buffer<T>(
        &self,
        buffer: &Mutex<Vec<T>>,
        batch: impl IntoIterator<Item = T>,
    ) -> Result<bool, StoreError> {
        let mut buffer = lock(buffer)?;
        buffer.extend(batch);
        Ok(buffer.len() >= self.settings.write_buffer_size)
    }

    pub fn flush_clients(&self) -> Result<usize, StoreError> {
        self.flush(EntityKind::Client, &self.clients, write_clients)
    }

    pub fn flush_certificates(&self) -> Result<usize, StoreError> {
        self.flush(EntityKind::Certificate, &self.certificates, write_certificates)
    }

    pub fn flush_assignments(&self) -> Result<usize, StoreError> {
        self.flush(EntityKind::Assignment, &self.assignments, write_assignments)
    }

    /// Flush parents before children.
    pub fn flush_all(&self) -> Result<(), StoreError> {
        self.flush_clients()?;
        self.flush_certificates()?;
        self.flush_assignments()?;
        Ok(())
    }

    fn flush<T>(
        &self,
        entity: EntityKind,
        buffer: &Mutex<Vec<T>>,
        write: fn(&Transaction<'_>, &[T]) -> rusqlite::Result<()>,
    ) -> Result<usize, StoreError> {
        if lock(buffer)?.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let mut rows = lock(buffer)?;
        if rows.is_empty() {
            return Ok(0);
        }

        match commit_rows(&mut conn, &rows, write) {
            Ok(()) => {
                let count = rows.len();
                rows.clear();
                info!("Flushed {} {}", count, entity);
                Ok(count)
            }
            Err(source) => {
                error!("Failed to flush {} {}: {}", rows.len(), entity, source);
                Err(StoreError::Flush { entity, source })
            }
        }
    }

    /// Rows of `entity` already committed to the database.
    pub fn committed_count(&self, entity: EntityKind) -> Result<u64, StoreError> {
        let conn = self.connection()?;
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table_name());
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Rows of `entity` waiting in memory.
    pub fn buffered_count(&self, entity: EntityKind) -> Result<usize, StoreError> {
        let len = match entity {
            EntityKind::Client => lock(&self.clients)?.len(),
            EntityKind::Certificate => lock(&self.certificates)?.len(),
            EntityKind::Assignment => lock(&self.assignments)?.len(),
        };
        Ok(len)
    }

    /// Stream currently active assignments in chunks.
    pub fn active_assignments_streaming(
        &self,
        chunk_size: Option<usize>,
    ) -> Result<ActiveAssignments<'_>, StoreError> {
        self.active_assignments_as_of(certgen_core::today(), chunk_size)
    }

    /// Stream assignments expiring strictly after `today`, ordered by
    /// client then expiry.
    pub fn active_assignments_as_of(
        &self,
        today: NaiveDate,
        chunk_size: Option<usize>,
    ) -> Result<ActiveAssignments<'_>, StoreError> {
        let chunk_size = chunk_size.unwrap_or(self.settings.chunk_size);
        if chunk_size == 0 {
            return Err(StoreError::Configuration(
                "chunk size must be at least 1".to_string(),
            ));
        }
        let connection = self.connection.as_ref().ok_or(StoreError::NotConnected)?;
        debug!("Streaming active assignments in chunks of {}", chunk_size);
        Ok(ActiveAssignments::new(connection, today, chunk_size))
    }

    /// Flush everything, optimize, compact and close.
    ///
    /// A failed VACUUM is logged and ignored; the data is already durable.
    pub fn close(mut self) -> Result<(), StoreError> {
        if self.connection.is_none() {
            return Ok(());
        }
        self.flush_all()?;

        let Some(connection) = self.connection.take() else {
            return Ok(());
        };
        let conn = connection.into_inner().map_err(|_| StoreError::Poisoned)?;

        conn.execute_batch("PRAGMA optimize;")?;
        if let Err(err) = conn.execute_batch("VACUUM;") {
            warn!("VACUUM skipped: {}", err);
        }
        conn.close().map_err(|(_, err)| StoreError::Query(err))?;

        info!("Closed store at {}", self.path.display());
        Ok(())
    }
}

impl Drop for BufferedStore {
    fn drop(&mut self) {
        let pending: usize = [
            EntityKind::Client,
            EntityKind::Certificate,
            EntityKind::Assignment,
        ]
        .into_iter()
        .filter_map(|entity| self.buffered_count(entity).ok())
        .sum();

        if pending > 0 {
            warn!(
                "Dropping store at {} with {} unflushed records",
                self.path.display(),
                pending
            );
        }
    }
}
