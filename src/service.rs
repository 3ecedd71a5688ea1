//! In-process certificate service.
//!
//! Owns the status handle and the store/report locations. Generation runs
//! on a blocking tokio task; read queries open their own connection per
//! call and report a missing store as not found.

use crate::error::ServiceError;
use crate::export::ACTIVE_REPORT_FILE;
use crate::pipeline::{run_pipeline_with_host, PipelineConfig};
use crate::status::{GenerationStatus, StatusHandle};
use certgen_advisor::{advise, HostResources};
use certgen_core::{ActiveCertificatesPage, AssignmentsPage, ClientId};
use certgen_store::ReportQueries;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

const CLIENTS_RANGE: RangeInclusive<u64> = 1..=10_000_000;
const CERTIFICATES_RANGE: RangeInclusive<u64> = 1..=20_000_000;
const WORKERS_RANGE: RangeInclusive<usize> = 1..=32;
const MIN_BATCH_SIZE: usize = 100;
const MIN_WRITE_BUFFER_SIZE: usize = 100;

/// Parameters of a generation request. Missing sizes are advised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub num_clients: u64,
    pub num_certificates: u64,
    pub batch_size: Option<usize>,
    pub num_workers: Option<usize>,
    pub write_buffer_size: Option<usize>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            num_clients: 1000,
            num_certificates: 2000,
            batch_size: None,
            num_workers: None,
            write_buffer_size: None,
        }
    }
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !CLIENTS_RANGE.contains(&self.num_clients) {
            return Err(out_of_range("num_clients", self.num_clients, &CLIENTS_RANGE));
        }
        if !CERTIFICATES_RANGE.contains(&self.num_certificates) {
            return Err(out_of_range(
                "num_certificates",
                self.num_certificates,
                &CERTIFICATES_RANGE,
            ));
        }
        if let Some(batch_size) = self.batch_size.filter(|&b| b < MIN_BATCH_SIZE) {
            return Err(ServiceError::Configuration(format!(
                "batch_size must be at least {MIN_BATCH_SIZE}, got {batch_size}"
            )));
        }
        if let Some(workers) = self.num_workers.filter(|w| !WORKERS_RANGE.contains(w)) {
            return Err(out_of_range("num_workers", workers, &WORKERS_RANGE));
        }
        if let Some(size) = self.write_buffer_size.filter(|&s| s < MIN_WRITE_BUFFER_SIZE) {
            return Err(ServiceError::Configuration(format!(
                "write_buffer_size must be at least {MIN_WRITE_BUFFER_SIZE}, got {size}"
            )));
        }
        Ok(())
    }
}

fn out_of_range<T: std::fmt::Display>(
    name: &str,
    value: T,
    range: &RangeInclusive<T>,
) -> ServiceError {
    ServiceError::Configuration(format!(
        "{name} must be between {} and {}, got {value}",
        range.start(),
        range.end()
    ))
}

/// Response to an accepted generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAccepted {
    pub message: String,
    pub estimated_data_size_gb: f64,
}

/// Generation and report queries over one store file.
pub struct CertificateService {
    db_path: PathBuf,
    output_dir: PathBuf,
    host: Option<HostResources>,
    status: StatusHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CertificateService {
    pub fn new(db_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            output_dir: output_dir.into(),
            host: None,
            status: StatusHandle::new(),
            task: Mutex::new(None),
        }
    }

    /// Advise against `host` instead of detecting the running machine.
    pub fn with_host(mut self, host: HostResources) -> Self {
        self.host = Some(host);
        self
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Validate `request` and start a generation in the background.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`ServiceError::Conflict`] while another generation is running.
    pub fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationAccepted, ServiceError> {
        request.validate()?;

        let config = PipelineConfig {
            batch_size: request.batch_size,
            num_workers: request.num_workers,
            write_buffer_size: request.write_buffer_size,
            db_path: self.db_path.clone(),
            output_dir: self.output_dir.clone(),
            ..PipelineConfig::new(request.num_clients, request.num_certificates)
        };

        if !self.status.try_start(config.total_items()) {
            return Err(ServiceError::Conflict);
        }

        let host = self.host.unwrap_or_else(HostResources::detect);
        let estimated_data_size_gb =
            advise(request.num_clients, request.num_certificates, &host).estimated_data_size_gb;

        let status = self.status.clone();
        let handle = tokio::task::spawn_blocking(move || {
            match run_pipeline_with_host(&config, &host, &status) {
                Ok(report) => {
                    info!(
                        "Generation finished: {} clients, {} certificates, {} assignments",
                        report.clients, report.certificates, report.assignments
                    );
                    status.complete();
                }
                Err(err) => {
                    error!("Generation failed: {}", err);
                    status.fail(err.to_string());
                }
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        *task = Some(handle);

        info!(
            "Accepted generation of {} clients and {} certificates",
            request.num_clients, request.num_certificates
        );
        Ok(GenerationAccepted {
            message: "Generation started".to_string(),
            estimated_data_size_gb,
        })
    }

    pub fn generation_status(&self) -> GenerationStatus {
        self.status.snapshot()
    }

    /// Wait for the running generation, if any, and return the final status.
    pub async fn wait_for_generation(&self) -> Result<GenerationStatus, ServiceError> {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!("Generation task aborted: {}", err);
                self.status.fail(format!("generation task aborted: {err}"));
            }
        }

        let status = self.status.snapshot();
        match status.error {
            Some(message) => Err(ServiceError::Pipeline(message)),
            None => Ok(status),
        }
    }

    pub fn list_active_certificates(
        &self,
        page: u64,
        page_size: u64,
        client_id: Option<ClientId>,
    ) -> Result<ActiveCertificatesPage, ServiceError> {
        let queries = ReportQueries::open(&self.db_path)?;
        Ok(queries.active_certificates(page, page_size, client_id)?)
    }

    pub fn list_assignments(
        &self,
        skip: u64,
        limit: u64,
        client_id: Option<ClientId>,
        active_only: bool,
    ) -> Result<AssignmentsPage, ServiceError> {
        let queries = ReportQueries::open(&self.db_path)?;
        Ok(queries.assignments(skip, limit, client_id, active_only)?)
    }

    /// Path of the active-certificate CSV from the last completed run.
    pub fn download_active_certificates_report(&self) -> Result<PathBuf, ServiceError> {
        let path = self.output_dir.join(ACTIVE_REPORT_FILE);
        if !path.is_file() {
            return Err(ServiceError::NotFound(format!(
                "no report at {}; run a generation first",
                path.display()
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Stage;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> CertificateService {
        CertificateService::new(
            dir.path().join("data").join("certificates.db"),
            dir.path().join("output"),
        )
        .with_host(HostResources::new(4, 8.0, 4.0))
    }

    fn small_request() -> GenerationRequest {
        GenerationRequest {
            num_clients: 200,
            num_certificates: 300,
            batch_size: Some(100),
            num_workers: Some(2),
            write_buffer_size: Some(100),
        }
    }

    #[test]
    fn test_request_defaults() {
        let request: GenerationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, GenerationRequest::default());
        assert_eq!(request.num_clients, 1000);
        assert_eq!(request.num_certificates, 2000);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let invalid = [
            GenerationRequest {
                num_clients: 0,
                ..small_request()
            },
            GenerationRequest {
                num_certificates: 20_000_001,
                ..small_request()
            },
            GenerationRequest {
                batch_size: Some(99),
                ..small_request()
            },
            GenerationRequest {
                num_workers: Some(33),
                ..small_request()
            },
            GenerationRequest {
                num_workers: Some(0),
                ..small_request()
            },
            GenerationRequest {
                write_buffer_size: Some(10),
                ..small_request()
            },
        ];
        for request in invalid {
            assert!(
                matches!(request.validate(), Err(ServiceError::Configuration(_))),
                "{request:?}"
            );
        }
        assert!(small_request().validate().is_ok());
    }

    #[tokio::test]
    async fn test_queries_before_generation_not_found() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        assert!(matches!(
            service.list_active_certificates(1, 10, None),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.list_assignments(0, 10, None, false),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.download_active_certificates_report(),
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(service.generation_status().current_stage, Stage::Idle);
    }

    #[tokio::test]
    async fn test_generation_lifecycle() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        let accepted = service.start_generation(small_request()).unwrap();
        assert!(accepted.estimated_data_size_gb > 0.0);
        assert!(matches!(
            service.start_generation(small_request()),
            Err(ServiceError::Conflict)
        ));

        let status = service.wait_for_generation().await.unwrap();
        assert!(!status.is_running);
        assert_eq!(status.current_stage, Stage::Completed);
        assert_eq!(status.progress, 500);
        assert_eq!(status.total, 500);

        let page = service.list_active_certificates(1, 50, None).unwrap();
        assert!(page.certificates.len() <= 50);
        assert_eq!(page.has_next, 50 < page.total_count);

        let report = service.download_active_certificates_report().unwrap();
        let lines = std::fs::read_to_string(report).unwrap().lines().count() as u64;
        assert_eq!(lines, page.total_count + 1);

        let assignments = service.list_assignments(0, 10_000, None, false).unwrap();
        assert!(assignments.total_count >= page.total_count);

        // A finished run releases the slot
        service.start_generation(small_request()).unwrap();
        service.wait_for_generation().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_query_parameters() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.start_generation(small_request()).unwrap();
        service.wait_for_generation().await.unwrap();

        assert!(matches!(
            service.list_active_certificates(0, 10, None),
            Err(ServiceError::Configuration(_))
        ));
        assert!(matches!(
            service.list_assignments(0, 10_001, None, true),
            Err(ServiceError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_generation_recorded() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(&blocked).unwrap();
        let service = CertificateService::new(&blocked, dir.path().join("output"))
            .with_host(HostResources::new(2, 4.0, 2.0));

        service.start_generation(small_request()).unwrap();
        assert!(service.wait_for_generation().await.is_err());

        let status = service.generation_status();
        assert!(!status.is_running);
        assert_eq!(status.current_stage, Stage::Failed);
        assert!(status.error.is_some());

        // The slot is free again after a failure
        assert!(service.start_generation(small_request()).is_ok());
        let _ = service.wait_for_generation().await;
    }
}
