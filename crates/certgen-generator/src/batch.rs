//! Single-threaded batch builders.
//!
//! These are the units of work the worker pool executes. They hold no
//! state of their own; any randomness comes from the RNG passed in.

use crate::certificate::certificate_id;
use certgen_core::{Assignment, Certificate, Client, ClientId};
use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;

/// Upper bound on certificates drawn for one client.
pub const MAX_CERTS_PER_CLIENT: usize = 20;

/// Shortest validity period in days (about three months).
pub const MIN_VALIDITY_DAYS: i64 = 90;

/// Longest validity period in days (about twenty years).
pub const MAX_VALIDITY_DAYS: i64 = 7300;

/// How far in the past an expiry date may lie.
pub const MAX_EXPIRED_DAYS: i64 = 365;

/// Clients with IDs `[start_id, start_id + count)`.
pub fn clients_batch(start_id: ClientId, count: usize) -> Vec<Client> {
    (start_id..start_id + count as ClientId)
        .map(|client_id| Client { client_id })
        .collect()
}

/// Certificates for 1-based positions `[start_id, start_id + count)`.
pub fn certificates_batch(start_id: u64, count: usize) -> Vec<Certificate> {
    let first_index = start_id.saturating_sub(1);
    (0..count as u64)
        .map(|i| Certificate {
            certificate_id: certificate_id(first_index + i),
        })
        .collect()
}

/// Assignments for `client_ids` drawn from `pool`.
///
/// Every client gets between 0 and [`MAX_CERTS_PER_CLIENT`] distinct
/// certificates (fewer if the pool is smaller). Expiry dates fall in
/// `[today - 365, today + 7300]`, skewed towards the future.
pub fn assignments_batch<R: Rng + ?Sized>(
    rng: &mut R,
    client_ids: &[ClientId],
    pool: &[String],
    today: NaiveDate,
) -> Vec<Assignment> {
    let mut assignments = Vec::with_capacity(client_ids.len() * MAX_CERTS_PER_CLIENT / 2);

    for &client_id in client_ids {
        let num_certs = rng.gen_range(0..=MAX_CERTS_PER_CLIENT).min(pool.len());

        for certificate_id in pool.choose_multiple(rng, num_certs) {
            let validity_days = rng.gen_range(MIN_VALIDITY_DAYS..=MAX_VALIDITY_DAYS);
            let offset = rng.gen_range(-MAX_EXPIRED_DAYS..=validity_days);

            assignments.push(Assignment {
                client_id,
                certificate_id: certificate_id.clone(),
                expiry_date: today + Duration::days(offset),
            });
        }
    }

    assignments
}

/// Split `1..=total` into `(start, count)` chunks of at most `batch_size`.
pub fn partition(total: u64, batch_size: usize) -> Vec<(u64, usize)> {
    let batch_size = batch_size.max(1) as u64;
    let mut tasks = Vec::with_capacity(total.div_ceil(batch_size) as usize);
    let mut start = 1;
    while start <= total {
        let count = batch_size.min(total - start + 1);
        tasks.push((start, count as usize));
        start += count;
    }
    tasks
}
