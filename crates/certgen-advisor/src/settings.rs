//! Sizing heuristic.

use crate::host::HostResources;
use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Approximate in-memory size of one generated record.
const RECORD_SIZE_BYTES: f64 = 200.0;

/// Average certificates per client assumed when no clients are requested.
const FALLBACK_CERTS_PER_CLIENT: f64 = 10.0;

/// Advised pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub num_workers: usize,
    pub batch_size: usize,
    pub write_buffer_size: usize,
    pub chunk_size: usize,
    pub estimated_data_size_gb: f64,
    pub target_memory_per_batch_mb: f64,
    pub total_possible_assignments: u64,
}

/// Footprint estimate for a generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataEstimate {
    pub data_size_gb: f64,
    pub avg_certs_per_client: f64,
    pub total_possible_assignments: f64,
    pub target_memory_per_batch_mb: f64,
}

impl DataEstimate {
    pub fn new(num_clients: u64, num_certificates: u64, available_memory_gb: f64) -> Self {
        let avg_certs_per_client = if num_clients > 0 {
            (num_certificates as f64 / num_clients as f64).min(10.0)
        } else {
            FALLBACK_CERTS_PER_CLIENT
        };

        let clients = num_clients as f64;
        let bytes = clients * 50.0
            + num_certificates as f64 * 100.0
            + clients * avg_certs_per_client * 150.0;

        Self {
            data_size_gb: bytes / BYTES_PER_GB,
            avg_certs_per_client,
            total_possible_assignments: clients * avg_certs_per_client,
            target_memory_per_batch_mb: (available_memory_gb * 1024.0 * 0.15).clamp(10.0, 250.0),
        }
    }
}

/// Compute settings for `num_clients` clients and `num_certificates`
/// certificates on `host`.
pub fn advise(num_clients: u64, num_certificates: u64, host: &HostResources) -> Settings {
    let estimate = DataEstimate::new(num_clients, num_certificates, host.available_memory_gb);

    let num_workers = optimal_workers(estimate.data_size_gb, host.cpu_cores);
    let batch_size = optimal_batch_size(
        host.total_memory_gb,
        estimate.target_memory_per_batch_mb,
        num_clients,
    );

    Settings {
        num_workers,
        batch_size,
        write_buffer_size: write_buffer_size(batch_size),
        chunk_size: chunk_size(estimate.total_possible_assignments),
        estimated_data_size_gb: estimate.data_size_gb,
        target_memory_per_batch_mb: estimate.target_memory_per_batch_mb,
        total_possible_assignments: estimate.total_possible_assignments as u64,
    }
}

/// Worker threads by estimated footprint.
pub fn optimal_workers(estimated_data_size_gb: f64, cpu_cores: usize) -> usize {
    let cpu_cores = cpu_cores.max(1);
    if estimated_data_size_gb < 1.0 {
        cpu_cores.min(4)
    } else if estimated_data_size_gb < 10.0 {
        cpu_cores.min(8)
    } else if estimated_data_size_gb < 100.0 {
        cpu_cores.min(12)
    } else {
        cpu_cores
    }
}

/// Records per generation batch, bounded by the per-batch memory target and
/// a ceiling and floor that depend on total system memory.
pub fn optimal_batch_size(
    total_memory_gb: f64,
    target_memory_per_batch_mb: f64,
    num_clients: u64,
) -> usize {
    let from_memory = (target_memory_per_batch_mb * BYTES_PER_MB / RECORD_SIZE_BYTES) as usize;
    let n = num_clients as usize;

    let (ceiling, floor) = if total_memory_gb < 2.0 {
        (5_000, (n / 200).max(1_000))
    } else if total_memory_gb < 8.0 {
        (50_000, (n / 100).max(5_000))
    } else if total_memory_gb < 32.0 {
        (200_000, (n / 50).max(10_000))
    } else {
        (1_000_000, (n / 20).max(50_000))
    };

    from_memory.min(ceiling).min(floor)
}

/// Write buffer threshold derived from the batch size.
pub fn write_buffer_size(batch_size: usize) -> usize {
    (batch_size / 2).min(100_000).min((batch_size / 4).max(1_000))
}

/// Read chunk size for streaming queries, banded by the number of
/// assignments the request can produce.
pub fn chunk_size(total_possible_assignments: f64) -> usize {
    let t = total_possible_assignments;
    let (divisor, floor, ceiling) = if t < 50_000.0 {
        (5.0, 1_000, 10_000)
    } else if t < 500_000.0 {
        (10.0, 5_000, 25_000)
    } else if t < 5_000_000.0 {
        (20.0, 10_000, 50_000)
    } else if t < 50_000_000.0 {
        (50.0, 25_000, 100_000)
    } else {
        (100.0, 50_000, 200_000)
    };

    ((t / divisor) as usize).max(floor).min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workstation() -> HostResources {
        HostResources::new(8, 16.0, 8.0)
    }

    #[test]
    fn test_default_request_on_workstation() {
        let settings = advise(1_000, 2_000, &workstation());

        assert_eq!(settings.num_workers, 4);
        assert_eq!(settings.batch_size, 10_000);
        assert_eq!(settings.write_buffer_size, 2_500);
        assert_eq!(settings.chunk_size, 1_000);
        assert_eq!(settings.total_possible_assignments, 2_000);
        assert_eq!(settings.target_memory_per_batch_mb, 250.0);
    }

    #[test]
    fn test_estimate_without_clients_uses_fallback_average() {
        let estimate = DataEstimate::new(0, 1_000, 4.0);
        assert_eq!(estimate.avg_certs_per_client, 10.0);
        assert_eq!(estimate.total_possible_assignments, 0.0);
        assert!((estimate.data_size_gb - 100_000.0 / BYTES_PER_GB).abs() < 1e-12);
    }

    #[test]
    fn test_target_memory_is_clamped() {
        assert_eq!(DataEstimate::new(1, 1, 0.01).target_memory_per_batch_mb, 10.0);
        assert_eq!(DataEstimate::new(1, 1, 64.0).target_memory_per_batch_mb, 250.0);
        let mid = DataEstimate::new(1, 1, 0.5).target_memory_per_batch_mb;
        assert!((mid - 76.8).abs() < 1e-9);
    }

    #[test]
    fn test_worker_tiers() {
        let cases = [
            (0.5, 16, 4),
            (0.5, 2, 2),
            (5.0, 16, 8),
            (50.0, 16, 12),
            (50.0, 6, 6),
            (500.0, 64, 64),
            (0.1, 0, 1),
        ];
        for (size_gb, cores, expected) in cases {
            assert_eq!(
                optimal_workers(size_gb, cores),
                expected,
                "size={size_gb} cores={cores}"
            );
        }
    }

    #[test]
    fn test_batch_size_tiers() {
        let cases = [
            // (total_gb, target_mb, clients, expected)
            (1.5, 76.8, 1_000, 1_000),
            (1.5, 76.8, 10_000_000, 5_000),
            (4.0, 250.0, 1_000, 5_000),
            (4.0, 250.0, 2_000_000, 20_000),
            (16.0, 250.0, 1_000, 10_000),
            (16.0, 250.0, 50_000_000, 200_000),
            (64.0, 250.0, 10_000_000, 500_000),
            (64.0, 250.0, 100_000_000, 1_000_000),
            (64.0, 10.0, 100_000_000, 52_428),
        ];
        for (total_gb, target_mb, clients, expected) in cases {
            assert_eq!(
                optimal_batch_size(total_gb, target_mb, clients),
                expected,
                "total={total_gb} target={target_mb} clients={clients}"
            );
        }
    }

    #[test]
    fn test_write_buffer_size() {
        assert_eq!(write_buffer_size(1_000), 500);
        assert_eq!(write_buffer_size(10_000), 2_500);
        assert_eq!(write_buffer_size(500_000), 100_000);
        assert_eq!(write_buffer_size(1_000_000), 100_000);
    }

    #[test]
    fn test_chunk_size_bands() {
        let cases = [
            (2_000.0, 1_000),
            (40_000.0, 8_000),
            (49_999.0, 9_999),
            (100_000.0, 10_000),
            (400_000.0, 25_000),
            (1_000_000.0, 50_000),
            (20_000_000.0, 100_000),
            (1_000_000_000.0, 200_000),
            (60_000_000.0, 200_000),
        ];
        for (total, expected) in cases {
            assert_eq!(chunk_size(total), expected, "total={total}");
        }
    }

    #[test]
    fn test_large_request_on_server() {
        let host = HostResources::new(32, 64.0, 32.0);
        let settings = advise(10_000_000, 20_000_000, &host);

        assert_eq!(settings.num_workers, 8);
        assert_eq!(settings.batch_size, 500_000);
        assert_eq!(settings.write_buffer_size, 100_000);
        assert_eq!(settings.chunk_size, 100_000);
    }

    #[test]
    fn test_huge_footprint_uses_every_core() {
        let host = HostResources::new(48, 256.0, 128.0);
        let settings = advise(100_000_000, 1_000_000_000, &host);
        assert!(settings.estimated_data_size_gb >= 100.0);
        assert_eq!(settings.num_workers, 48);
    }

    #[test]
    fn test_monotonic_in_requested_counts() {
        let hosts = [
            HostResources::new(2, 1.5, 0.5),
            HostResources::new(4, 6.0, 3.0),
            HostResources::new(8, 16.0, 8.0),
            HostResources::new(32, 64.0, 32.0),
        ];
        let counts = [0u64, 1, 10, 1_000, 50_000, 1_000_000, 10_000_000, 200_000_000];

        for host in &hosts {
            let mut previous: Option<Settings> = None;
            for &n in &counts {
                let settings = advise(n, n * 2, host);
                if let Some(prev) = &previous {
                    assert!(settings.estimated_data_size_gb >= prev.estimated_data_size_gb);
                    assert!(settings.batch_size >= prev.batch_size);
                }
                previous = Some(settings);
            }
        }
    }

    #[test]
    fn test_settings_are_deterministic() {
        let host = workstation();
        assert_eq!(advise(12_345, 678, &host), advise(12_345, 678, &host));
    }
}
