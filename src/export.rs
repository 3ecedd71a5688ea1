//! CSV output.
//!
//! The active-certificate report is streamed from the store one chunk at a
//! time. The entity dump writes generator output directly, with no store
//! involved.

use crate::error::PipelineError;
use certgen_generator::RecordGenerator;
use certgen_store::BufferedStore;
use chrono::NaiveDate;
use csv::Writer;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

pub const ACTIVE_REPORT_FILE: &str = "active_certificates.csv";
pub const ACTIVE_REPORT_HEADER: [&str; 4] =
    ["client_id", "certificate_id", "expiry_date", "days_until_expiry"];

pub const CLIENTS_FILE: &str = "clients.csv";
pub const CERTIFICATES_FILE: &str = "certificates.csv";

/// Outcome of writing one CSV file.
#[derive(Debug, Clone, Default)]
pub struct ExportMetrics {
    pub path: PathBuf,
    pub rows_written: u64,
    pub file_size_bytes: u64,
    pub duration: Duration,
}

/// Outcome of [`dump_generated_entities`].
#[derive(Debug, Clone)]
pub struct DumpReport {
    pub clients: ExportMetrics,
    pub certificates: ExportMetrics,
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Rows go to a sibling `.tmp` file that replaces `path` only once complete.
fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

fn create_writer(path: &Path) -> Result<Writer<BufWriter<File>>, PipelineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let staging = staging_path(path);
    let file = File::create(&staging).map_err(io_error(&staging))?;
    Ok(Writer::from_writer(BufWriter::with_capacity(
        DEFAULT_BUFFER_SIZE,
        file,
    )))
}

fn finish(
    mut writer: Writer<BufWriter<File>>,
    path: &Path,
    rows_written: u64,
    start: Instant,
) -> Result<ExportMetrics, PipelineError> {
    let staging = staging_path(path);
    writer.flush().map_err(io_error(&staging))?;
    drop(writer);
    fs::rename(&staging, path).map_err(io_error(path))?;

    Ok(ExportMetrics {
        path: path.to_path_buf(),
        rows_written,
        file_size_bytes: fs::metadata(path).map_err(io_error(path))?.len(),
        duration: start.elapsed(),
    })
}

/// Stream active assignments from `store` into
/// `<output_dir>/active_certificates.csv`.
///
/// The header is always written, even when no assignment is active.
pub fn write_active_report(
    store: &BufferedStore,
    today: NaiveDate,
    output_dir: &Path,
) -> Result<ExportMetrics, PipelineError> {
    let start = Instant::now();
    let path = output_dir.join(ACTIVE_REPORT_FILE);
    info!("Writing active certificates to '{}'", path.display());

    let mut writer = create_writer(&path)?;
    writer.write_record(ACTIVE_REPORT_HEADER)?;

    let mut rows_written = 0u64;
    for chunk in store.active_assignments_as_of(today, None)? {
        let chunk = chunk?;
        for row in &chunk {
            writer.write_record([
                row.client_id.to_string(),
                row.certificate_id.clone(),
                row.expiry_date.format("%Y-%m-%d").to_string(),
                row.days_until_expiry.to_string(),
            ])?;
        }
        rows_written += chunk.len() as u64;
        debug!("Written {} active rows", rows_written);
    }

    let metrics = finish(writer, &path, rows_written, start)?;
    info!(
        "Wrote {} active certificates ({} bytes) in {:?}",
        metrics.rows_written, metrics.file_size_bytes, metrics.duration
    );
    Ok(metrics)
}

/// Generate clients and certificates and write them straight to
/// `clients.csv` and `certificates.csv` under `output_dir`.
pub fn dump_generated_entities(
    generator: &RecordGenerator,
    output_dir: &Path,
) -> Result<DumpReport, PipelineError> {
    let start = Instant::now();
    let path = output_dir.join(CLIENTS_FILE);
    info!("Streaming clients to '{}'", path.display());

    let mut writer = create_writer(&path)?;
    writer.write_record(["client_id"])?;
    let mut rows = 0u64;
    for batch in generator.generate_clients_parallel()? {
        let batch = batch?;
        for client in &batch {
            writer.write_record([client.client_id.to_string()])?;
        }
        rows += batch.len() as u64;
        debug!("Written {} clients", rows);
    }
    let clients = finish(writer, &path, rows, start)?;

    let start = Instant::now();
    let path = output_dir.join(CERTIFICATES_FILE);
    info!("Streaming certificates to '{}'", path.display());

    let mut writer = create_writer(&path)?;
    writer.write_record(["certificate_id"])?;
    let mut rows = 0u64;
    for batch in generator.generate_certificates_parallel()? {
        let batch = batch?;
        for certificate in &batch {
            writer.write_record([certificate.certificate_id.as_str()])?;
        }
        rows += batch.len() as u64;
        debug!("Written {} certificates", rows);
    }
    let certificates = finish(writer, &path, rows, start)?;

    info!(
        "Dumped {} clients and {} certificates to '{}'",
        clients.rows_written,
        certificates.rows_written,
        output_dir.display()
    );
    Ok(DumpReport {
        clients,
        certificates,
    })
}
