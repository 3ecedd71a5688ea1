//! Host resource detection.

use serde::{Deserialize, Serialize};
use std::fs;
use sysinfo::System;
use tracing::{debug, info};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU and memory figures the sizing heuristic consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    pub cpu_cores: usize,
    pub total_memory_gb: f64,
    pub available_memory_gb: f64,
}

impl HostResources {
    pub fn new(cpu_cores: usize, total_memory_gb: f64, available_memory_gb: f64) -> Self {
        Self {
            cpu_cores: cpu_cores.max(1),
            total_memory_gb,
            available_memory_gb,
        }
    }

    /// Read CPU and memory figures from the running host.
    ///
    /// Memory is capped by the cgroup limit when running inside a container,
    /// so the advisor does not size batches for memory the process cannot use.
    pub fn detect() -> Self {
        let cpu_cores = num_cpus::get();

        let mut sys = System::new();
        sys.refresh_memory();
        let mut total_bytes = sys.total_memory();
        let mut available_bytes = sys.available_memory();

        if let Some(limit) = read_cgroup_memory_limit() {
            debug!("cgroup memory limit: {} bytes", limit);
            total_bytes = total_bytes.min(limit);
            available_bytes = available_bytes.min(limit);
        }

        let host = Self::new(
            cpu_cores,
            total_bytes as f64 / BYTES_PER_GB,
            available_bytes as f64 / BYTES_PER_GB,
        );
        info!(
            "Host resources: {} CPU cores, {:.2} GB total memory, {:.2} GB available",
            host.cpu_cores, host.total_memory_gb, host.available_memory_gb
        );
        host
    }
}

/// Resident memory of the current process in MB, if it can be read.
pub fn process_memory_mb() -> Option<f64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let sys = System::new_all();
    let process = sys.process(pid)?;
    Some(process.memory() as f64 / 1024.0 / 1024.0)
}

/// Log resident memory after a pipeline stage.
pub fn log_memory_usage(stage: &str) {
    match process_memory_mb() {
        Some(mb) => info!("Memory after {}: {:.2} MB", stage, mb),
        None => debug!("Memory usage unavailable after {}", stage),
    }
}

/// Read the cgroup memory limit, v2 first and then v1.
fn read_cgroup_memory_limit() -> Option<u64> {
    if let Ok(content) = fs::read_to_string("/sys/fs/cgroup/memory.max") {
        let trimmed = content.trim();
        if trimmed == "max" {
            return None;
        }
        return trimmed.parse().ok();
    }

    if let Ok(content) = fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes") {
        // Very large values mean no limit
        if let Ok(value) = content.trim().parse::<u64>() {
            if value < 9_000_000_000_000_000_000 {
                return Some(value);
            }
        }
    }

    None
}
