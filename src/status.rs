//! Shared generation status.
//!
//! A [`StatusHandle`] lives as long as the service that owns it and is reset
//! at the start of every generation. The pipeline writes progress through
//! the [`ProgressSink`] trait; callers poll [`StatusHandle::snapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Pipeline phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    InitializingGenerator,
    InitializingDatabase,
    GeneratingClients,
    GeneratingCertificates,
    GeneratingAssignments,
    FinalizingDatabase,
    WritingReport,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Idle => "Idle",
            Stage::InitializingGenerator => "Initializing generator",
            Stage::InitializingDatabase => "Initializing database",
            Stage::GeneratingClients => "Generating clients",
            Stage::GeneratingCertificates => "Generating certificates",
            Stage::GeneratingAssignments => "Generating assignments",
            Stage::FinalizingDatabase => "Finalizing database",
            Stage::WritingReport => "Writing report",
            Stage::Completed => "Completed",
            Stage::Failed => "Error",
        };
        f.write_str(label)
    }
}

/// Receives coarse progress from the pipeline.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: Stage, done: u64, total: u64);
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _stage: Stage, _done: u64, _total: u64) {}
}

/// Point-in-time view of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStatus {
    pub is_running: bool,
    pub progress: u64,
    pub total: u64,
    pub current_stage: Stage,
    pub start_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Seconds, extrapolated linearly from progress so far.
    pub estimated_time_remaining: Option<f64>,
}

#[derive(Debug, Default)]
struct StatusState {
    is_running: bool,
    progress: u64,
    total: u64,
    stage: Stage,
    start_time: Option<DateTime<Utc>>,
    started: Option<Instant>,
    error: Option<String>,
}

/// Cloneable handle to one shared status record.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<StatusState>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    // Plain data; a panicked writer cannot leave it inconsistent
    fn state(&self) -> MutexGuard<'_, StatusState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset the record and mark a run as started.
    ///
    /// Returns false, leaving the record untouched, if a run is already in
    /// progress.
    pub fn try_start(&self, total: u64) -> bool {
        let mut state = self.state();
        if state.is_running {
            return false;
        }
        *state = StatusState {
            is_running: true,
            total,
            stage: Stage::InitializingGenerator,
            start_time: Some(Utc::now()),
            started: Some(Instant::now()),
            ..StatusState::default()
        };
        true
    }

    pub fn complete(&self) {
        let mut state = self.state();
        state.is_running = false;
        state.progress = state.total;
        state.stage = Stage::Completed;
    }

    pub fn fail(&self, error: impl Into<String>) {
        let mut state = self.state();
        state.is_running = false;
        state.stage = Stage::Failed;
        state.error = Some(error.into());
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running
    }

    pub fn snapshot(&self) -> GenerationStatus {
        let state = self.state();

        let estimated_time_remaining = match state.started {
            Some(started) if state.is_running && state.progress > 0 && state.total > 0 => {
                let elapsed = started.elapsed().as_secs_f64();
                let fraction = state.progress as f64 / state.total as f64;
                Some((elapsed / fraction - elapsed).max(0.0))
            }
            _ => None,
        };

        GenerationStatus {
            is_running: state.is_running,
            progress: state.progress,
            total: state.total,
            current_stage: state.stage,
            start_time: state.start_time,
            error: state.error.clone(),
            estimated_time_remaining,
        }
    }
}

impl ProgressSink for StatusHandle {
    fn report(&self, stage: Stage, done: u64, total: u64) {
        let mut state = self.state();
        state.stage = stage;
        state.progress = done;
        state.total = total;
    }
}
