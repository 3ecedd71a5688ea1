//! Connection tuning and DDL.

use rusqlite::Connection;
use std::time::Duration;

/// How long a writer waits on SQLite's internal lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pragmas trading some crash durability for write throughput.
const WRITE_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -64000;
    PRAGMA temp_store = MEMORY;
    PRAGMA mmap_size = 268435456;
    PRAGMA foreign_keys = ON;
";

/// Tables and indexes, all idempotent.
pub const CREATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS clients (
        client_id INTEGER PRIMARY KEY
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS certificates (
        certificate_id TEXT PRIMARY KEY
    ) WITHOUT ROWID;

    CREATE TABLE IF NOT EXISTS client_certificates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        client_id INTEGER NOT NULL,
        certificate_id TEXT NOT NULL,
        expiry_date DATE NOT NULL,
        FOREIGN KEY (client_id) REFERENCES clients (client_id),
        FOREIGN KEY (certificate_id) REFERENCES certificates (certificate_id)
    );

    CREATE INDEX IF NOT EXISTS idx_client_cert_expiry_composite
        ON client_certificates (client_id, expiry_date, certificate_id);

    CREATE INDEX IF NOT EXISTS idx_expiry_date
        ON client_certificates (expiry_date);
";

/// Idempotent upsert by primary key. The row holds only the key, so keeping
/// the existing row leaves the table exactly as a replace would.
pub const UPSERT_CLIENT: &str =
    "INSERT INTO clients (client_id) VALUES (?1) ON CONFLICT (client_id) DO NOTHING";

pub const UPSERT_CERTIFICATE: &str =
    "INSERT INTO certificates (certificate_id) VALUES (?1) ON CONFLICT (certificate_id) DO NOTHING";

pub const INSERT_ASSIGNMENT: &str =
    "INSERT INTO client_certificates (client_id, certificate_id, expiry_date) VALUES (?1, ?2, ?3)";

/// Apply the write-throughput pragmas and busy timeout.
pub fn apply_pragmas(connection: &Connection) -> rusqlite::Result<()> {
    connection.busy_timeout(BUSY_TIMEOUT)?;
    connection.execute_batch(WRITE_PRAGMAS)
}
