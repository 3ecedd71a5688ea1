//! Main record generator.

use crate::batch::{assignments_batch, certificates_batch, clients_batch, partition};
use crate::error::GeneratorError;
use crate::pool::BatchStream;
use certgen_advisor::{advise, HostResources};
use certgen_core::{Assignment, Certificate, Client, ClientId};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Store location used when reading the certificate pool without a connection.
pub const DEFAULT_DB_PATH: &str = "data/certificates.db";

/// Generator for clients, certificates and assignments.
#[derive(Debug, Clone)]
pub struct RecordGenerator {
    num_clients: u64,
    num_certificates: u64,
    batch_size: usize,
    num_workers: usize,
    today: NaiveDate,
    db_path: PathBuf,
}

impl RecordGenerator {
    /// Create a generator for `num_clients` clients and `num_certificates`
    /// certificates.
    ///
    /// A missing `batch_size` or `num_workers` is filled in from the
    /// resource advisor using the detected host.
    pub fn new(
        num_clients: u64,
        num_certificates: u64,
        batch_size: Option<usize>,
        num_workers: Option<usize>,
    ) -> Result<Self, GeneratorError> {
        match (batch_size, num_workers) {
            (Some(batch_size), Some(num_workers)) => {
                info!("Using explicit generator sizing");
                Self::from_parts(num_clients, num_certificates, batch_size, num_workers)
            }
            _ => Self::with_host(
                num_clients,
                num_certificates,
                batch_size,
                num_workers,
                &HostResources::detect(),
            ),
        }
    }

    /// Like [`RecordGenerator::new`], advising against the given host.
    pub fn with_host(
        num_clients: u64,
        num_certificates: u64,
        batch_size: Option<usize>,
        num_workers: Option<usize>,
        host: &HostResources,
    ) -> Result<Self, GeneratorError> {
        let settings = advise(num_clients, num_certificates, host);
        info!(
            "Advised generator sizing: batch size {}, {} workers",
            settings.batch_size, settings.num_workers
        );
        Self::from_parts(
            num_clients,
            num_certificates,
            batch_size.unwrap_or(settings.batch_size),
            num_workers.unwrap_or(settings.num_workers),
        )
    }

    fn from_parts(
        num_clients: u64,
        num_certificates: u64,
        batch_size: usize,
        num_workers: usize,
    ) -> Result<Self, GeneratorError> {
        if batch_size == 0 {
            return Err(GeneratorError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        if num_workers == 0 {
            return Err(GeneratorError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }

        info!(
            "Generator ready: {} clients, {} certificates (batch size {}, {} workers)",
            num_clients, num_certificates, batch_size, num_workers
        );

        Ok(Self {
            num_clients,
            num_certificates,
            batch_size,
            num_workers,
            today: certgen_core::today(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        })
    }

    /// Override the date expiry offsets are computed from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Store file read by [`RecordGenerator::certificate_pool`] when no
    /// connection is supplied.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn num_clients(&self) -> u64 {
        self.num_clients
    }

    pub fn num_certificates(&self) -> u64 {
        self.num_certificates
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Clients with IDs `[start_id, start_id + count)`.
    pub fn generate_clients_batch(&self, start_id: ClientId, count: usize) -> Vec<Client> {
        clients_batch(start_id, count)
    }

    /// Certificates for 1-based positions `[start_id, start_id + count)`.
    pub fn generate_certificates_batch(&self, start_id: u64, count: usize) -> Vec<Certificate> {
        certificates_batch(start_id, count)
    }

    /// Assignments for `client_ids`, sampled from `certificate_pool`.
    pub fn generate_assignments_batch(
        &self,
        client_ids: &[ClientId],
        certificate_pool: &[String],
    ) -> Vec<Assignment> {
        assignments_batch(
            &mut rand::thread_rng(),
            client_ids,
            certificate_pool,
            self.today,
        )
    }

    /// Generate all clients on the worker pool.
    pub fn generate_clients_parallel(&self) -> Result<BatchStream<Client>, GeneratorError> {
        info!("Generating {} clients in parallel...", self.num_clients);
        let tasks = partition(self.num_clients, self.batch_size);
        BatchStream::spawn(
            "clients",
            tasks,
            self.num_workers,
            || (),
            |_, (start, count)| clients_batch(start as ClientId, count),
        )
    }

    /// Generate all certificates on the worker pool.
    pub fn generate_certificates_parallel(
        &self,
    ) -> Result<BatchStream<Certificate>, GeneratorError> {
        info!(
            "Generating {} certificates in parallel...",
            self.num_certificates
        );
        let tasks = partition(self.num_certificates, self.batch_size);
        BatchStream::spawn(
            "certificates",
            tasks,
            self.num_workers,
            || (),
            |_, (start, count)| certificates_batch(start, count),
        )
    }

    /// Generate assignments for every client on the worker pool.
    ///
    /// Clients are split into `batch_size` windows. Each worker seeds its
    /// own RNG once at start and reuses it for all of its windows.
    pub fn generate_assignments_parallel(
        &self,
        certificate_pool: Vec<String>,
    ) -> Result<BatchStream<Assignment>, GeneratorError> {
        info!(
            "Generating assignments for {} clients from a pool of {} certificates...",
            self.num_clients,
            certificate_pool.len()
        );
        let pool = Arc::new(certificate_pool);
        let today = self.today;
        let tasks = partition(self.num_clients, self.batch_size);

        BatchStream::spawn(
            "assignments",
            tasks,
            self.num_workers,
            StdRng::from_entropy,
            move |rng, (start, count)| {
                let end = start + count as u64;
                let client_ids: Vec<ClientId> = (start..end).map(|id| id as ClientId).collect();
                assignments_batch(rng, &client_ids, &pool, today)
            },
        )
    }

    /// Read every committed certificate ID.
    ///
    /// Uses `connection` when given; otherwise opens the generator's store
    /// file read-only for the duration of the call.
    pub fn certificate_pool(
        &self,
        connection: Option<&Connection>,
    ) -> Result<Vec<String>, GeneratorError> {
        info!("Reading certificate pool from the database...");

        let ids = match connection {
            Some(conn) => read_certificate_ids(conn)?,
            None => {
                let conn = Connection::open_with_flags(
                    &self.db_path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                let ids = read_certificate_ids(&conn)?;
                conn.close().map_err(|(_, err)| err)?;
                ids
            }
        };

        info!("Read {} certificate IDs", ids.len());
        Ok(ids)
    }
}

fn read_certificate_ids(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT certificate_id FROM certificates ORDER BY certificate_id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}
