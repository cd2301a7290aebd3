//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
            )?;
        }

        tx.commit()?;
        tracing::info!(from = current, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Customers: reference data, seeded externally
        CREATE TABLE customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_name TEXT NOT NULL,
            customer_address TEXT NOT NULL DEFAULT '',
            contact_person TEXT NOT NULL DEFAULT '',
            contact_phone TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,           -- Unix ms
            updated_at INTEGER NOT NULL
        );

        -- Certificates: the system of record
        CREATE TABLE certificates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cert_number TEXT NOT NULL UNIQUE,      -- business key, immutable
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            instrument_name TEXT NOT NULL,
            instrument_number TEXT NOT NULL DEFAULT '',
            manufacturer TEXT NOT NULL DEFAULT '',
            model_spec TEXT NOT NULL DEFAULT '',
            instrument_accuracy TEXT NOT NULL DEFAULT '',
            test_date TEXT NOT NULL,               -- YYYY-MM-DD
            expire_date TEXT NOT NULL,             -- YYYY-MM-DD
            test_result TEXT NOT NULL,             -- qualified | unqualified
            status TEXT NOT NULL,                  -- draft | created | revoked
            anchor_state TEXT NOT NULL,            -- pending | anchored
            integrity_digest TEXT,                 -- hex, null until first anchor
            ledger_tx_id TEXT,                     -- null until first anchor
            created_by INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Measurements: sensitive readings only inside encrypted_data
        CREATE TABLE test_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cert_id INTEGER NOT NULL REFERENCES certificates(id) ON DELETE CASCADE,
            device_addr TEXT NOT NULL,
            data_type TEXT NOT NULL DEFAULT '',
            test_point TEXT NOT NULL,
            workstation_number TEXT NOT NULL DEFAULT '',
            test_timestamp INTEGER NOT NULL,       -- Unix ms
            encrypted_data TEXT NOT NULL,          -- hex(nonce || ciphertext || tag)
            anchor_state TEXT NOT NULL,
            ledger_tx_id TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX idx_certificates_customer ON certificates(customer_id);
        CREATE INDEX idx_certificates_created ON certificates(created_at, id);
        CREATE INDEX idx_certificates_anchor ON certificates(anchor_state);
        CREATE INDEX idx_test_data_cert ON test_data(cert_id, test_timestamp);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in ["customers", "certificates", "test_data", "schema_migrations"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_no_plaintext_reading_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('test_data')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for plaintext in ["actual_percentage", "ratio_error", "angle_error", "current_value", "voltage_value"] {
            assert!(!columns.contains(&plaintext.to_string()));
        }
        assert!(columns.contains(&"encrypted_data".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_rejects_newer_schema() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (99, 0)",
            [],
        )
        .unwrap();
        assert!(matches!(migrate(&mut conn), Err(StoreError::Migration(_))));
    }
}
