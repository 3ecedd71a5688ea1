//! End-to-end generation run.
//!
//! Sizing is advised once from the host, then clients and certificates are
//! generated in parallel and buffered into the store. Once both are flushed
//! the committed certificate IDs are read back as the pool that assignments
//! draw from. The run ends by streaming active assignments into a CSV report.

use crate::error::PipelineError;
use crate::export::{write_active_report, ExportMetrics};
use crate::status::{ProgressSink, Stage};
use certgen_advisor::{advise, log_memory_usage, HostResources, Settings};
use certgen_core::EntityKind;
use certgen_generator::{RecordGenerator, DEFAULT_DB_PATH};
use certgen_store::{BufferedStore, StoreSettings};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Parameters for one run. `None` sizes are filled in by the advisor.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub num_clients: u64,
    pub num_certificates: u64,
    pub batch_size: Option<usize>,
    pub num_workers: Option<usize>,
    pub write_buffer_size: Option<usize>,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub today: NaiveDate,
}

impl PipelineConfig {
    pub fn new(num_clients: u64, num_certificates: u64) -> Self {
        Self {
            num_clients,
            num_certificates,
            batch_size: None,
            num_workers: None,
            write_buffer_size: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            today: certgen_core::today(),
        }
    }

    /// Progress denominator reported to the sink.
    pub fn total_items(&self) -> u64 {
        self.num_clients.saturating_add(self.num_certificates)
    }

    fn store_settings(&self, advised: &Settings) -> StoreSettings {
        match self.write_buffer_size {
            Some(size) => StoreSettings::explicit(size),
            None => StoreSettings {
                write_buffer_size: advised.write_buffer_size,
                chunk_size: advised.chunk_size,
            },
        }
    }
}

/// Counts and artifacts of a finished run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub settings: Settings,
    pub clients: u64,
    pub certificates: u64,
    pub assignments: u64,
    pub report: ExportMetrics,
    pub duration: Duration,
}

/// Run the pipeline, advising sizes against the detected host.
pub fn run_pipeline(
    config: &PipelineConfig,
    progress: &dyn ProgressSink,
) -> Result<PipelineReport, PipelineError> {
    run_pipeline_with_host(config, &HostResources::detect(), progress)
}

/// Run the pipeline, advising sizes against `host`.
pub fn run_pipeline_with_host(
    config: &PipelineConfig,
    host: &HostResources,
    progress: &dyn ProgressSink,
) -> Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let total = config.total_items();
    let settings = advise(config.num_clients, config.num_certificates, host);

    progress.report(Stage::InitializingGenerator, 0, total);
    info!(
        "Starting generation of {} clients and {} certificates",
        config.num_clients, config.num_certificates
    );
    log_memory_usage("start");

    let generator = RecordGenerator::with_host(
        config.num_clients,
        config.num_certificates,
        config.batch_size,
        config.num_workers,
        host,
    )?
    .with_today(config.today)
    .with_db_path(&config.db_path);

    progress.report(Stage::InitializingDatabase, 0, total);
    let mut store = BufferedStore::new(&config.db_path, config.store_settings(&settings))?;
    store.connect()?;
    store.create_schema()?;

    progress.report(Stage::GeneratingClients, 0, total);
    let mut done = 0u64;
    for batch in generator.generate_clients_parallel()? {
        let batch = batch?;
        done += batch.len() as u64;
        store.insert_clients_batch(batch)?;
        progress.report(Stage::GeneratingClients, done, total);
    }
    let clients = done;
    info!("Generated {} clients", clients);
    log_memory_usage("after clients");

    progress.report(Stage::GeneratingCertificates, done, total);
    for batch in generator.generate_certificates_parallel()? {
        let batch = batch?;
        done += batch.len() as u64;
        store.insert_certificates_batch(batch)?;
        progress.report(Stage::GeneratingCertificates, done, total);
    }
    let certificates = done - clients;
    info!("Generated {} certificates", certificates);
    log_memory_usage("after certificates");

    // Assignments reference both parents
    store.flush_clients()?;
    store.flush_certificates()?;

    let pool = {
        let conn = store.connection()?;
        generator.certificate_pool(Some(&*conn))?
    };

    progress.report(Stage::GeneratingAssignments, done, total);
    let mut assignments = 0u64;
    for batch in generator.generate_assignments_parallel(pool)? {
        let batch = batch?;
        assignments += batch.len() as u64;
        store.insert_assignments_batch(batch)?;
        debug!("Buffered {} assignments", assignments);
    }
    info!("Generated {} assignments", assignments);
    log_memory_usage("after assignments");

    progress.report(Stage::FinalizingDatabase, done, total);
    store.flush_all()?;
    debug!(
        "Committed {} assignments",
        store.committed_count(EntityKind::Assignment)?
    );

    progress.report(Stage::WritingReport, done, total);
    let report = write_active_report(&store, config.today, &config.output_dir)?;
    store.close()?;

    progress.report(Stage::Completed, total, total);
    let duration = start.elapsed();
    info!(
        "Generation completed in {:?}: {} active certificates written",
        duration, report.rows_written
    );

    Ok(PipelineReport {
        settings,
        clients,
        certificates,
        assignments,
        report,
        duration,
    })
}
