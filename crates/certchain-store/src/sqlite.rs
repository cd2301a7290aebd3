//! SQLite implementation of the CertificateStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};

use certchain_core::{
    now_millis, AnchorState, CertNumber, CertStatus, Certificate, CertificateDetails, Customer,
    Measurement, NewCustomer, NewMeasurement, Page, TestResult, ValidationError,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::CertificateStore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CERT_COLUMNS: &str = "id, cert_number, customer_id, instrument_name, instrument_number,
    manufacturer, model_spec, instrument_accuracy, test_date, expire_date, test_result,
    status, anchor_state, integrity_digest, ledger_tx_id, created_by, created_at, updated_at";

const MEASUREMENT_COLUMNS: &str = "id, cert_id, device_addr, data_type, test_point,
    workstation_number, test_timestamp, encrypted_data, anchor_state, ledger_tx_id, created_at";

const CUSTOMER_COLUMNS: &str =
    "id, customer_name, customer_address, contact_person, contact_phone, created_at, updated_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened certificate store");
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    ffi::Error::new(ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                ffi::Error::new(ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

/// A certificate row with columns still in their stored form.
struct CertRow {
    id: i64,
    cert_number: String,
    customer_id: i64,
    instrument_name: String,
    instrument_number: String,
    manufacturer: String,
    model_spec: String,
    instrument_accuracy: String,
    test_date: String,
    expire_date: String,
    test_result: String,
    status: String,
    anchor_state: String,
    integrity_digest: Option<String>,
    ledger_tx_id: Option<String>,
    created_by: i64,
    created_at: i64,
    updated_at: i64,
}

fn cert_row(row: &Row<'_>) -> rusqlite::Result<CertRow> {
    Ok(CertRow {
        id: row.get("id")?,
        cert_number: row.get("cert_number")?,
        customer_id: row.get("customer_id")?,
        instrument_name: row.get("instrument_name")?,
        instrument_number: row.get("instrument_number")?,
        manufacturer: row.get("manufacturer")?,
        model_spec: row.get("model_spec")?,
        instrument_accuracy: row.get("instrument_accuracy")?,
        test_date: row.get("test_date")?,
        expire_date: row.get("expire_date")?,
        test_result: row.get("test_result")?,
        status: row.get("status")?,
        anchor_state: row.get("anchor_state")?,
        integrity_digest: row.get("integrity_digest")?,
        ledger_tx_id: row.get("ledger_tx_id")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl CertRow {
    fn into_certificate(self) -> Result<Certificate> {
        let cert_number = CertNumber::parse(&self.cert_number)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        let test_result: TestResult = self
            .test_result
            .parse()
            .map_err(|e: ValidationError| StoreError::InvalidData(e.to_string()))?;

        Ok(Certificate {
            id: self.id,
            cert_number,
            details: CertificateDetails {
                customer_id: self.customer_id,
                instrument_name: self.instrument_name,
                instrument_number: self.instrument_number,
                manufacturer: self.manufacturer,
                model_spec: self.model_spec,
                instrument_accuracy: self.instrument_accuracy,
                test_date: parse_date(&self.test_date)?,
                expire_date: parse_date(&self.expire_date)?,
                test_result,
            },
            status: CertStatus::from_str_opt(&self.status)
                .ok_or_else(|| StoreError::InvalidData(format!("status {:?}", self.status)))?,
            anchor_state: parse_anchor_state(&self.anchor_state)?,
            integrity_digest: self.integrity_digest,
            ledger_tx_id: self.ledger_tx_id,
            created_by: self.created_by,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

struct MeasurementRow {
    id: i64,
    cert_id: i64,
    device_addr: String,
    data_type: String,
    test_point: String,
    workstation_number: String,
    test_timestamp: i64,
    encrypted_data: String,
    anchor_state: String,
    ledger_tx_id: Option<String>,
    created_at: i64,
}

fn measurement_row(row: &Row<'_>) -> rusqlite::Result<MeasurementRow> {
    Ok(MeasurementRow {
        id: row.get("id")?,
        cert_id: row.get("cert_id")?,
        device_addr: row.get("device_addr")?,
        data_type: row.get("data_type")?,
        test_point: row.get("test_point")?,
        workstation_number: row.get("workstation_number")?,
        test_timestamp: row.get("test_timestamp")?,
        encrypted_data: row.get("encrypted_data")?,
        anchor_state: row.get("anchor_state")?,
        ledger_tx_id: row.get("ledger_tx_id")?,
        created_at: row.get("created_at")?,
    })
}

impl MeasurementRow {
    fn into_measurement(self) -> Result<Measurement> {
        Ok(Measurement {
            id: self.id,
            cert_id: self.cert_id,
            device_addr: self.device_addr,
            data_type: self.data_type,
            test_point: self.test_point,
            workstation_number: self.workstation_number,
            test_timestamp: from_millis(self.test_timestamp)?,
            encrypted_payload: self.encrypted_data,
            anchor_state: parse_anchor_state(&self.anchor_state)?,
            ledger_tx_id: self.ledger_tx_id,
            created_at: from_millis(self.created_at)?,
            decrypted_payload: None,
        })
    }
}

struct CustomerRow {
    id: i64,
    customer_name: String,
    customer_address: String,
    contact_person: String,
    contact_phone: String,
    created_at: i64,
    updated_at: i64,
}

fn customer_row(row: &Row<'_>) -> rusqlite::Result<CustomerRow> {
    Ok(CustomerRow {
        id: row.get("id")?,
        customer_name: row.get("customer_name")?,
        customer_address: row.get("customer_address")?,
        contact_person: row.get("contact_person")?,
        contact_phone: row.get("contact_phone")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl CustomerRow {
    fn into_customer(self) -> Result<Customer> {
        Ok(Customer {
            id: self.id,
            customer_name: self.customer_name,
            customer_address: self.customer_address,
            contact_person: self.contact_person,
            contact_phone: self.contact_phone,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| StoreError::InvalidData(format!("date {:?}: {}", s, e)))
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn parse_anchor_state(s: &str) -> Result<AnchorState> {
    AnchorState::from_str_opt(s)
        .ok_or_else(|| StoreError::InvalidData(format!("anchor state {:?}", s)))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {}", ms)))
}

/// Map constraint violations to store-level errors.
fn constraint_error(
    err: rusqlite::Error,
    duplicate: impl FnOnce() -> String,
    missing: impl FnOnce() -> String,
) -> StoreError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
        _ => None,
    };
    match code {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
            StoreError::Duplicate(duplicate())
        }
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::NotFound(missing()),
        _ => StoreError::Database(err),
    }
}

fn select_certificate(conn: &Connection, cert_number: &str) -> Result<Option<Certificate>> {
    conn.query_row(
        &format!("SELECT {} FROM certificates WHERE cert_number = ?1", CERT_COLUMNS),
        params![cert_number],
        cert_row,
    )
    .optional()?
    .map(CertRow::into_certificate)
    .transpose()
}

fn select_certificates(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Certificate>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, cert_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(CertRow::into_certificate).collect()
}

fn select_measurements(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Measurement>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, measurement_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(MeasurementRow::into_measurement).collect()
}

#[async_trait]
impl CertificateStore for SqliteStore {
    async fn create(&self, cert: &Certificate) -> Result<Certificate> {
        let cert = cert.clone();

        let created = self
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO certificates (
                        cert_number, customer_id, instrument_name, instrument_number,
                        manufacturer, model_spec, instrument_accuracy, test_date, expire_date,
                        test_result, status, anchor_state, integrity_digest, ledger_tx_id,
                        created_by, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    params![
                        cert.cert_number.as_str(),
                        cert.details.customer_id,
                        cert.details.instrument_name,
                        cert.details.instrument_number,
                        cert.details.manufacturer,
                        cert.details.model_spec,
                        cert.details.instrument_accuracy,
                        format_date(cert.details.test_date),
                        format_date(cert.details.expire_date),
                        cert.details.test_result.as_str(),
                        cert.status.as_str(),
                        cert.anchor_state.as_str(),
                        cert.integrity_digest,
                        cert.ledger_tx_id,
                        cert.created_by,
                        cert.created_at.timestamp_millis(),
                        cert.updated_at.timestamp_millis(),
                    ],
                )
                .map_err(|e| {
                    constraint_error(
                        e,
                        || format!("certificate {}", cert.cert_number),
                        || format!("customer {}", cert.details.customer_id),
                    )
                })?;

                Ok(Certificate {
                    id: conn.last_insert_rowid(),
                    ..cert
                })
            })
            .await?;

        tracing::info!(cert_number = %created.cert_number, id = created.id, "certificate row created");
        Ok(created)
    }

    async fn get_by_number(&self, cert_number: &CertNumber) -> Result<Certificate> {
        let cert_number = cert_number.clone();
        tracing::debug!(cert_number = %cert_number, "loading certificate");

        self.run(move |conn| {
            select_certificate(conn, cert_number.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("certificate {}", cert_number)))
        })
        .await
    }

    async fn list(&self, page: Page) -> Result<(Vec<Certificate>, u64)> {
        self.run(move |conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM certificates", [], |row| row.get(0))?;
            let certs = select_certificates(
                conn,
                &format!(
                    "SELECT {} FROM certificates ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                    CERT_COLUMNS
                ),
                params![page.size() as i64, page.offset() as i64],
            )?;
            Ok((certs, total as u64))
        })
        .await
    }

    async fn update(&self, cert: &Certificate) -> Result<Certificate> {
        let cert = cert.clone();

        let updated = self
            .run(move |conn| {
                let changed = conn
                    .execute(
                        "UPDATE certificates SET
                            customer_id = ?2, instrument_name = ?3, instrument_number = ?4,
                            manufacturer = ?5, model_spec = ?6, instrument_accuracy = ?7,
                            test_date = ?8, expire_date = ?9, test_result = ?10, status = ?11,
                            anchor_state = ?12, integrity_digest = ?13, ledger_tx_id = ?14,
                            updated_at = ?15
                         WHERE cert_number = ?1",
                        params![
                            cert.cert_number.as_str(),
                            cert.details.customer_id,
                            cert.details.instrument_name,
                            cert.details.instrument_number,
                            cert.details.manufacturer,
                            cert.details.model_spec,
                            cert.details.instrument_accuracy,
                            format_date(cert.details.test_date),
                            format_date(cert.details.expire_date),
                            cert.details.test_result.as_str(),
                            cert.status.as_str(),
                            cert.anchor_state.as_str(),
                            cert.integrity_digest,
                            cert.ledger_tx_id,
                            cert.updated_at.timestamp_millis(),
                        ],
                    )
                    .map_err(|e| {
                        constraint_error(
                            e,
                            || format!("certificate {}", cert.cert_number),
                            || format!("customer {}", cert.details.customer_id),
                        )
                    })?;

                if changed == 0 {
                    return Err(StoreError::NotFound(format!("certificate {}", cert.cert_number)));
                }
                select_certificate(conn, cert.cert_number.as_str())?
                    .ok_or_else(|| StoreError::NotFound(format!("certificate {}", cert.cert_number)))
            })
            .await?;

        tracing::info!(
            cert_number = %updated.cert_number,
            status = %updated.status,
            anchor_state = updated.anchor_state.as_str(),
            "certificate row updated"
        );
        Ok(updated)
    }

    async fn delete(&self, cert_number: &CertNumber) -> Result<()> {
        let cert_number = cert_number.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM certificates WHERE cert_number = ?1",
                    params![cert_number.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let id = id.ok_or_else(|| StoreError::NotFound(format!("certificate {}", cert_number)))?;

            tx.execute("DELETE FROM test_data WHERE cert_id = ?1", params![id])?;
            tx.execute("DELETE FROM certificates WHERE id = ?1", params![id])?;
            tx.commit()?;

            tracing::info!(cert_number = %cert_number, "certificate row deleted");
            Ok(())
        })
        .await
    }

    async fn list_pending_anchor(&self) -> Result<Vec<Certificate>> {
        self.run(|conn| {
            select_certificates(
                conn,
                &format!(
                    "SELECT {} FROM certificates WHERE anchor_state = ?1 ORDER BY id",
                    CERT_COLUMNS
                ),
                params![AnchorState::Pending.as_str()],
            )
        })
        .await
    }

    async fn insert_customer(&self, customer: &NewCustomer) -> Result<Customer> {
        let customer = customer.clone();

        self.run(move |conn| {
            let now = now_millis();
            conn.execute(
                "INSERT INTO customers (
                    customer_name, customer_address, contact_person, contact_phone,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![
                    customer.customer_name,
                    customer.customer_address,
                    customer.contact_person,
                    customer.contact_phone,
                    now.timestamp_millis(),
                ],
            )?;

            Ok(Customer {
                id: conn.last_insert_rowid(),
                customer_name: customer.customer_name,
                customer_address: customer.customer_address,
                contact_person: customer.contact_person,
                contact_phone: customer.contact_phone,
                created_at: now,
                updated_at: now,
            })
        })
        .await
    }

    async fn get_customer(&self, id: i64) -> Result<Customer> {
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS),
                params![id],
                customer_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("customer {}", id)))?
            .into_customer()
        })
        .await
    }

    async fn insert_measurements(
        &self,
        cert_id: i64,
        items: &[NewMeasurement],
    ) -> Result<Vec<Measurement>> {
        let items = items.to_vec();

        let inserted = self
            .run(move |conn| {
                let tx = conn.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM certificates WHERE id = ?1)",
                    params![cert_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(StoreError::NotFound(format!("certificate id {}", cert_id)));
                }

                let now = now_millis();
                let mut inserted = Vec::with_capacity(items.len());
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO test_data (
                            cert_id, device_addr, data_type, test_point, workstation_number,
                            test_timestamp, encrypted_data, anchor_state, ledger_tx_id, created_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)",
                    )?;
                    for item in items {
                        stmt.execute(params![
                            cert_id,
                            item.device_addr,
                            item.data_type,
                            item.test_point,
                            item.workstation_number,
                            item.test_timestamp.timestamp_millis(),
                            item.encrypted_payload,
                            AnchorState::Pending.as_str(),
                            now.timestamp_millis(),
                        ])?;
                        inserted.push(Measurement {
                            id: tx.last_insert_rowid(),
                            cert_id,
                            device_addr: item.device_addr,
                            data_type: item.data_type,
                            test_point: item.test_point,
                            workstation_number: item.workstation_number,
                            test_timestamp: from_millis(item.test_timestamp.timestamp_millis())?,
                            encrypted_payload: item.encrypted_payload,
                            anchor_state: AnchorState::Pending,
                            ledger_tx_id: None,
                            created_at: now,
                            decrypted_payload: None,
                        });
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;

        tracing::info!(cert_id, count = inserted.len(), "measurements stored");
        Ok(inserted)
    }

    async fn list_measurements(&self, cert_id: i64) -> Result<Vec<Measurement>> {
        self.run(move |conn| {
            select_measurements(
                conn,
                &format!(
                    "SELECT {} FROM test_data WHERE cert_id = ?1 ORDER BY test_timestamp DESC, id DESC",
                    MEASUREMENT_COLUMNS
                ),
                params![cert_id],
            )
        })
        .await
    }

    async fn list_unanchored_measurements(&self, cert_id: i64) -> Result<Vec<Measurement>> {
        self.run(move |conn| {
            select_measurements(
                conn,
                &format!(
                    "SELECT {} FROM test_data WHERE cert_id = ?1 AND anchor_state = ?2 ORDER BY id",
                    MEASUREMENT_COLUMNS
                ),
                params![cert_id, AnchorState::Pending.as_str()],
            )
        })
        .await
    }

    async fn mark_measurement_anchored(&self, id: i64, tx_id: Option<&str>) -> Result<()> {
        let tx_id = tx_id.map(str::to_string);

        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE test_data SET anchor_state = ?2, ledger_tx_id = ?3 WHERE id = ?1",
                params![id, AnchorState::Anchored.as_str(), tx_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("measurement {}", id)));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn draft(number: &str, customer_id: i64, created: i64) -> Certificate {
        Certificate::draft(
            CertNumber::parse(number).unwrap(),
            CertificateDetails {
                customer_id,
                instrument_name: "Voltage transformer".into(),
                instrument_number: "SN-1".into(),
                manufacturer: "Acme".into(),
                model_spec: "JDZ10-10".into(),
                instrument_accuracy: "0.2".into(),
                test_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                expire_date: NaiveDate::from_ymd_opt(2027, 1, 10).unwrap(),
                test_result: TestResult::Qualified,
            },
            1,
            at(created),
        )
    }

    async fn seeded() -> (SqliteStore, Customer) {
        let store = SqliteStore::open_memory().unwrap();
        let customer = store
            .insert_customer(&NewCustomer {
                customer_name: "Grid Co".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, customer)
    }

    fn new_measurement(ts: i64) -> NewMeasurement {
        NewMeasurement {
            device_addr: "DEV001".into(),
            data_type: String::new(),
            test_point: "100%".into(),
            workstation_number: "WS1".into(),
            test_timestamp: at(ts),
            encrypted_payload: format!("cipher-{ts}"),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, customer) = seeded().await;
        let created = store.create(&draft("CERT-0001", customer.id, 100)).await.unwrap();
        assert!(created.id > 0);

        let loaded = store.get_by_number(&created.cert_number).await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.status, CertStatus::Draft);
        assert_eq!(loaded.anchor_state, AnchorState::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_cert_number() {
        let (store, customer) = seeded().await;
        store.create(&draft("CERT-0001", customer.id, 100)).await.unwrap();
        let err = store.create(&draft("CERT-0001", customer.id, 200)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_unknown_customer_rejected() {
        let (store, _) = seeded().await;
        let err = store.create(&draft("CERT-0001", 999, 100)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (store, _) = seeded().await;
        let err = store
            .get_by_number(&CertNumber::parse("NOPE").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_overwrites_mutable_columns() {
        let (store, customer) = seeded().await;
        let mut cert = store.create(&draft("CERT-0001", customer.id, 100)).await.unwrap();

        cert.details.instrument_name = "Current transformer".into();
        cert.status = CertStatus::Created;
        cert.anchor_state = AnchorState::Anchored;
        cert.integrity_digest = Some("ab".repeat(32));
        cert.ledger_tx_id = Some("tx-1".into());
        cert.updated_at = at(500);

        let updated = store.update(&cert).await.unwrap();
        assert_eq!(updated, cert);

        let mut missing = cert.clone();
        missing.cert_number = CertNumber::parse("CERT-9999").unwrap();
        assert!(store.update(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_total() {
        let (store, customer) = seeded().await;
        store.create(&draft("CERT-A", customer.id, 100)).await.unwrap();
        store.create(&draft("CERT-B", customer.id, 300)).await.unwrap();
        store.create(&draft("CERT-C", customer.id, 300)).await.unwrap();

        let (page, total) = store.list(Page::new(1, 2)).await.unwrap();
        assert_eq!(total, 3);
        let numbers: Vec<_> = page.iter().map(|c| c.cert_number.as_str()).collect();
        assert_eq!(numbers, ["CERT-C", "CERT-B"]);

        let (page, _) = store.list(Page::new(2, 2)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].cert_number.as_str(), "CERT-A");
    }

    #[tokio::test]
    async fn test_pending_anchor_list() {
        let (store, customer) = seeded().await;
        let mut a = store.create(&draft("CERT-A", customer.id, 100)).await.unwrap();
        store.create(&draft("CERT-B", customer.id, 200)).await.unwrap();

        a.anchor_state = AnchorState::Anchored;
        store.update(&a).await.unwrap();

        let pending = store.list_pending_anchor().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].cert_number.as_str(), "CERT-B");
    }

    #[tokio::test]
    async fn test_measurements_lifecycle() {
        let (store, customer) = seeded().await;
        let cert = store.create(&draft("CERT-0001", customer.id, 100)).await.unwrap();

        let inserted = store
            .insert_measurements(cert.id, &[new_measurement(10), new_measurement(30), new_measurement(20)])
            .await
            .unwrap();
        assert_eq!(inserted.len(), 3);
        assert!(inserted.iter().all(|m| m.anchor_state == AnchorState::Pending));

        let listed = store.list_measurements(cert.id).await.unwrap();
        let stamps: Vec<_> = listed.iter().map(|m| m.test_timestamp.timestamp()).collect();
        assert_eq!(stamps, [30, 20, 10]);

        store.mark_measurement_anchored(inserted[0].id, Some("tx-m1")).await.unwrap();
        let unanchored = store.list_unanchored_measurements(cert.id).await.unwrap();
        assert_eq!(unanchored.len(), 2);
        assert_eq!(unanchored[0].id, inserted[1].id);

        assert!(store.mark_measurement_anchored(9999, None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_measurements_for_missing_certificate() {
        let (store, _) = seeded().await;
        let err = store
            .insert_measurements(42, &[new_measurement(1)])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_measurements() {
        let (store, customer) = seeded().await;
        let cert = store.create(&draft("CERT-0001", customer.id, 100)).await.unwrap();
        store.insert_measurements(cert.id, &[new_measurement(1)]).await.unwrap();

        store.delete(&cert.cert_number).await.unwrap();
        assert!(store.get_by_number(&cert.cert_number).await.unwrap_err().is_not_found());
        assert!(store.list_measurements(cert.id).await.unwrap().is_empty());
        assert!(store.delete(&cert.cert_number).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_customer_roundtrip() {
        let (store, customer) = seeded().await;
        let loaded = store.get_customer(customer.id).await.unwrap();
        assert_eq!(loaded, customer);
        assert!(store.get_customer(customer.id + 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("certchain.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let customer = store
                .insert_customer(&NewCustomer {
                    customer_name: "Grid Co".into(),
                    ..Default::default()
                })
                .await
                .unwrap();
            store.create(&draft("CERT-0001", customer.id, 100)).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let cert = store
            .get_by_number(&CertNumber::parse("CERT-0001").unwrap())
            .await
            .unwrap();
        assert_eq!(cert.details.expire_date, NaiveDate::from_ymd_opt(2027, 1, 10).unwrap());
    }
}
