//! The engine: one handle over the certificate components.
//!
//! Brings together the store, the ledger client, the measurement cipher and
//! the verification policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use certchain_core::{
    CertNumber, Certificate, CertificateRequest, Measurement, MeasurementCipher,
    MeasurementRequest, Page, Principal,
};
use certchain_ledger::{LedgerClient, LedgerMeasurement, TimeoutLedger};
use certchain_store::{CertificateStore, SqliteStore};

use crate::config::EngineConfig;
use crate::coordinator::{LifecycleCoordinator, RetryReport};
use crate::error::Result;
use crate::history::{HistoryReader, LedgerEntry};
use crate::measurement::{BatchOutcome, MeasurementRecorder};
use crate::reconcile::{ReconciliationReport, Reconciler};
use crate::verification::{PublicVerification, VerificationEngine, VerificationResult};

/// The main engine struct.
///
/// Provides a unified API for:
/// - Issuing, updating, revoking and deleting certificates
/// - Recording and reading encrypted measurements
/// - Verifying certificates against the store and the ledger
/// - Reading ledger history and auditing the whole ledger
pub struct CertificateEngine<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    coordinator: LifecycleCoordinator<S, L>,
    recorder: MeasurementRecorder<S, L>,
    verifier: VerificationEngine<S, L>,
    history: HistoryReader<L>,
    reconciler: Reconciler<S, L>,
}

impl<L: LedgerClient> CertificateEngine<SqliteStore, TimeoutLedger<L>> {
    /// Open the SQLite store named by the config and bound every ledger
    /// call by the configured timeout.
    pub fn open(config: &EngineConfig, ledger: L) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.database.path)?;
        let ledger = TimeoutLedger::new(ledger, config.ledger_timeout());
        Self::new(config, store, ledger)
    }
}

impl<S: CertificateStore, L: LedgerClient> CertificateEngine<S, L> {
    /// Create a new engine instance.
    ///
    /// Fails when the config carries no usable cipher key.
    pub fn new(config: &EngineConfig, store: S, ledger: L) -> Result<Self> {
        Self::with_shared(config, Arc::new(store), Arc::new(ledger))
    }

    /// Create an engine over handles shared with other code.
    pub fn with_shared(config: &EngineConfig, store: Arc<S>, ledger: Arc<L>) -> Result<Self> {
        config.validate()?;
        let cipher = MeasurementCipher::new(&config.cipher_key()?);

        tracing::info!(
            channel = %config.ledger.channel_name,
            contract = %config.ledger.contract_name,
            "certificate engine ready"
        );

        Ok(Self {
            coordinator: LifecycleCoordinator::new(store.clone(), ledger.clone()),
            recorder: MeasurementRecorder::new(store.clone(), ledger.clone(), cipher),
            verifier: VerificationEngine::new(store.clone(), ledger.clone(), config.verification),
            history: HistoryReader::new(ledger.clone()),
            reconciler: Reconciler::new(store.clone(), ledger.clone()),
            store,
            ledger,
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the ledger client reference.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Certificate Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_certificate(
        &self,
        principal: &Principal,
        request: &CertificateRequest,
    ) -> Result<Certificate> {
        self.coordinator.create(principal, request).await
    }

    pub async fn update_certificate(
        &self,
        principal: &Principal,
        cert_number: &str,
        request: &CertificateRequest,
    ) -> Result<Certificate> {
        self.coordinator.update(principal, cert_number, request).await
    }

    pub async fn revoke_certificate(&self, principal: &Principal, cert_number: &str) -> Result<Certificate> {
        self.coordinator.revoke(principal, cert_number).await
    }

    pub async fn delete_certificate(&self, principal: &Principal, cert_number: &str) -> Result<()> {
        self.coordinator.delete(principal, cert_number).await
    }

    /// Get a certificate by number.
    pub async fn certificate(&self, cert_number: &str) -> Result<Certificate> {
        let cert_number = CertNumber::parse(cert_number)?;
        Ok(self.store.get_by_number(&cert_number).await?)
    }

    /// List certificates, newest first, with the total count.
    pub async fn certificates(&self, page: Page) -> Result<(Vec<Certificate>, u64)> {
        Ok(self.store.list(page).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Anchoring
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn pending_anchors(&self) -> Result<Vec<Certificate>> {
        self.coordinator.pending_anchors().await
    }

    pub async fn retry_anchor(&self, cert_number: &str) -> Result<Certificate> {
        self.coordinator.retry_anchor(cert_number).await
    }

    pub async fn retry_pending(&self) -> Result<RetryReport> {
        self.coordinator.retry_pending().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Measurements
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn record_measurements(
        &self,
        principal: &Principal,
        cert_number: &str,
        requests: &[MeasurementRequest],
    ) -> Result<BatchOutcome> {
        self.recorder.record_batch(principal, cert_number, requests).await
    }

    pub async fn retry_measurement_anchors(&self, cert_number: &str) -> Result<BatchOutcome> {
        self.recorder.retry_anchors(cert_number).await
    }

    pub async fn measurements(
        &self,
        principal: &Principal,
        cert_number: &str,
        decrypt: bool,
    ) -> Result<Vec<Measurement>> {
        self.recorder.measurements(principal, cert_number, decrypt).await
    }

    pub async fn ledger_measurements(&self, cert_number: &str) -> Result<Vec<LedgerMeasurement>> {
        self.recorder.ledger_measurements(cert_number).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn verify(&self, cert_number: &str) -> Result<VerificationResult> {
        self.verifier.verify(cert_number).await
    }

    pub async fn verify_at(&self, cert_number: &str, now: DateTime<Utc>) -> Result<VerificationResult> {
        self.verifier.verify_at(cert_number, now).await
    }

    pub async fn verify_public(&self, cert_number: &str) -> Result<PublicVerification> {
        self.verifier.verify_public(cert_number).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History & Audit
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn history(&self, cert_number: &str) -> Result<Vec<LedgerEntry>> {
        let cert_number = CertNumber::parse(cert_number)?;
        self.history.history(&cert_number).await
    }

    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        self.reconciler.reconcile().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use certchain_core::{NewCustomer, Role};
    use certchain_ledger::MemoryLedger;
    use certchain_store::MemoryStore;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.security.cipher_key = Some("1234567890123456".into());
        config
    }

    #[test]
    fn test_engine_requires_cipher_key() {
        let result = CertificateEngine::new(&EngineConfig::default(), MemoryStore::new(), MemoryLedger::new());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_sqlite_with_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.database.path = dir.path().join("certs.db");

        let engine = CertificateEngine::open(&config, MemoryLedger::new()).unwrap();
        assert_eq!(engine.ledger().timeout(), config.ledger_timeout());

        let customer = engine
            .store()
            .insert_customer(&NewCustomer {
                customer_name: "Grid Co".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let request = CertificateRequest {
            cert_number: "CERT-0001".into(),
            customer_id: customer.id,
            instrument_name: "CT".into(),
            test_date: "2024-01-10".into(),
            test_result: "qualified".into(),
            ..Default::default()
        };
        let admin = Principal::new(1, Role::Admin);
        engine.create_certificate(&admin, &request).await.unwrap();

        let public = engine.verify_public("CERT-0001").await.unwrap();
        assert!(public.is_valid);
        assert_eq!(engine.history("CERT-0001").await.unwrap().len(), 1);
        assert!(matches!(engine.history("bad number").await, Err(EngineError::Validation(_))));

        let (page, total) = engine.certificates(Page::default()).await.unwrap();
        assert_eq!((page.len(), total), (1, 1));
        assert!(engine.certificate("CERT-0002").await.unwrap_err().is_not_found());
    }
}
