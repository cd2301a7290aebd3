//! Store-versus-ledger audit.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use certchain_core::{CertNumber, CertStatus};
use certchain_ledger::{test_data_hash_of, LedgerCertificate, LedgerClient, LedgerClientExt};
use certchain_store::{CertificateStore, StoreExt};

use crate::error::Result;

const PAGE_SIZE: u32 = 100;

/// A certificate whose row and ledger snapshot disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    pub cert_number: CertNumber,
    pub local_digest: String,
    pub ledger_digest: String,
    pub local_status: CertStatus,
    pub ledger_status: String,
    /// Wire names of the fields that differ.
    pub fields: Vec<String>,
}

/// A certificate whose test-data hash does not match its anchored measurements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDataDivergence {
    pub cert_number: CertNumber,
    pub ledger_hash: String,
    /// Hash recomputed from the measurement records.
    pub recomputed_hash: String,
    pub measurements: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub matched: Vec<CertNumber>,
    /// Rows whose latest state is not anchored yet.
    pub pending: Vec<CertNumber>,
    pub diverged: Vec<Divergence>,
    pub test_data_diverged: Vec<TestDataDivergence>,
    pub missing_on_ledger: Vec<CertNumber>,
    /// Ledger keys with no local row.
    pub missing_locally: Vec<String>,
}

impl ReconciliationReport {
    /// No divergence and nothing missing on either side.
    pub fn is_clean(&self) -> bool {
        self.diverged.is_empty()
            && self.test_data_diverged.is_empty()
            && self.missing_on_ledger.is_empty()
            && self.missing_locally.is_empty()
    }
}

/// Compares every local certificate with the ledger world state.
pub struct Reconciler<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<S: CertificateStore, L: LedgerClient> Reconciler<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let mut world: BTreeMap<String, LedgerCertificate> = self
            .ledger
            .get_all_certificates()
            .await?
            .into_iter()
            .map(|entry| (entry.key, entry.record))
            .collect();

        let mut report = ReconciliationReport::default();
        for cert in self.store.list_all(PAGE_SIZE).await? {
            let on_ledger = world.remove(cert.cert_number.as_str());
            if cert.is_pending_anchor() {
                report.pending.push(cert.cert_number);
                continue;
            }
            let Some(snapshot) = on_ledger else {
                report.missing_on_ledger.push(cert.cert_number);
                continue;
            };

            self.check_test_data(&cert.cert_number, &snapshot, &mut report).await?;

            let digest = cert.compute_digest();
            let expected = LedgerCertificate::from_certificate(&cert, &digest);
            let fields = expected.differing_fields(&snapshot);
            if cert.digest_matches() && fields.is_empty() {
                report.matched.push(cert.cert_number);
            } else {
                report.diverged.push(Divergence {
                    cert_number: cert.cert_number,
                    local_digest: expected.integrity_digest,
                    ledger_digest: snapshot.integrity_digest,
                    local_status: cert.status,
                    ledger_status: snapshot.status,
                    fields: fields.into_iter().map(String::from).collect(),
                });
            }
        }
        report.missing_locally = world.into_keys().collect();

        if report.is_clean() {
            tracing::info!(
                matched = report.matched.len(),
                pending = report.pending.len(),
                "reconciliation clean"
            );
        } else {
            tracing::warn!(
                diverged = report.diverged.len(),
                test_data_diverged = report.test_data_diverged.len(),
                missing_on_ledger = report.missing_on_ledger.len(),
                missing_locally = report.missing_locally.len(),
                "reconciliation found differences"
            );
        }
        Ok(report)
    }

    /// Recompute the certificate's test-data chain from its measurement records.
    async fn check_test_data(
        &self,
        cert_number: &CertNumber,
        snapshot: &LedgerCertificate,
        report: &mut ReconciliationReport,
    ) -> Result<()> {
        let measurements = self.ledger.get_test_data_by_cert(cert_number.as_str()).await?;
        let recomputed = test_data_hash_of(&measurements);
        if recomputed != snapshot.test_data_hash {
            report.test_data_diverged.push(TestDataDivergence {
                cert_number: cert_number.clone(),
                ledger_hash: snapshot.test_data_hash.clone(),
                recomputed_hash: recomputed,
                measurements: measurements.len(),
            });
        }
        Ok(())
    }
}
