//! Deterministic certificate tokens.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Base seed for certificate tokens; index `i` seeds with `42 + i`.
pub const CERTIFICATE_SEED_BASE: u64 = 42;

/// Token for the certificate at zero-based `index`.
///
/// Each call seeds its own RNG, so the mapping is a pure function of the
/// index and safe to evaluate from any number of threads at once.
pub fn certificate_id(index: u64) -> String {
    let mut rng = StdRng::seed_from_u64(CERTIFICATE_SEED_BASE.wrapping_add(index));
    uuid_v4(&mut rng).to_string()
}

/// Generate a random UUID v4 using the provided RNG.
pub fn uuid_v4<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);

    // Set version (4) and variant (RFC 4122) bits
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}
