//! CertificateStore trait: the abstract interface for certificate persistence.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use certchain_core::{
    Certificate, CertNumber, Customer, Measurement, NewCustomer, NewMeasurement, Page,
};

use crate::error::{Result, StoreError};

/// The CertificateStore trait: async interface for the system of record.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, work runs on `spawn_blocking` to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Unique business key**: `create` with an existing cert number fails
///   with [`StoreError::Duplicate`]. The store is the only duplicate guard.
/// - **Not found is an error**: lookups by key return
///   [`StoreError::NotFound`] rather than `Option`; see [`StoreExt`] for
///   the optional form.
/// - **Measurements are ciphertext**: the store never sees plaintext
///   readings.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Certificate Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new certificate and return it with its assigned row id.
    ///
    /// The referenced customer must exist.
    async fn create(&self, cert: &Certificate) -> Result<Certificate>;

    /// Get a certificate by its business key.
    async fn get_by_number(&self, cert_number: &CertNumber) -> Result<Certificate>;

    /// List certificates, newest created first (ties broken by id).
    ///
    /// Returns the page and the total number of certificates.
    async fn list(&self, page: Page) -> Result<(Vec<Certificate>, u64)>;

    /// Overwrite the mutable columns of the certificate with `cert.cert_number`.
    ///
    /// Details, status, anchor state, digest, ledger tx id and `updated_at`
    /// are written. The cert number, creator and `created_at` never change.
    async fn update(&self, cert: &Certificate) -> Result<Certificate>;

    /// Delete a certificate and its measurements.
    async fn delete(&self, cert_number: &CertNumber) -> Result<()>;

    /// All certificates whose latest state is not yet on the ledger.
    async fn list_pending_anchor(&self) -> Result<Vec<Certificate>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Customer Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a customer (seeding only).
    async fn insert_customer(&self, customer: &NewCustomer) -> Result<Customer>;

    /// Get a customer by id.
    async fn get_customer(&self, id: i64) -> Result<Customer>;

    // ─────────────────────────────────────────────────────────────────────────
    // Measurement Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a batch of measurements for one certificate.
    ///
    /// All rows are written in a single transaction, or none are.
    async fn insert_measurements(
        &self,
        cert_id: i64,
        items: &[NewMeasurement],
    ) -> Result<Vec<Measurement>>;

    /// Measurements of a certificate, newest test timestamp first.
    async fn list_measurements(&self, cert_id: i64) -> Result<Vec<Measurement>>;

    /// Measurements not yet recorded on the ledger, in insertion order.
    async fn list_unanchored_measurements(&self, cert_id: i64) -> Result<Vec<Measurement>>;

    /// Record the ledger transaction of a measurement.
    ///
    /// `tx_id` is `None` when the ledger already held the measurement and
    /// the writing transaction is unknown.
    async fn mark_measurement_anchored(&self, id: i64, tx_id: Option<&str>) -> Result<()>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: CertificateStore {
    /// Look up a certificate, mapping `NotFound` to `None`.
    fn find_by_number(
        &self,
        cert_number: &CertNumber,
    ) -> impl std::future::Future<Output = Result<Option<Certificate>>> + Send;

    /// Page through every certificate.
    fn list_all(
        &self,
        page_size: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Certificate>>> + Send;
}

impl<S: CertificateStore + ?Sized> StoreExt for S {
    async fn find_by_number(&self, cert_number: &CertNumber) -> Result<Option<Certificate>> {
        match self.get_by_number(cert_number).await {
            Ok(cert) => Ok(Some(cert)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_all(&self, page_size: u32) -> Result<Vec<Certificate>> {
        let mut all = Vec::new();
        let mut number = 1i64;
        loop {
            let page = Page::new(number, page_size as i64);
            let (rows, total) = self.list(page).await?;
            let fetched = rows.len();
            all.extend(rows);
            if fetched == 0 || all.len() as u64 >= total {
                break;
            }
            number += 1;
        }
        Ok(all)
    }
}
