//! Certificate lifecycle: local commit, then anchor.
//!
//! Every mutation is written to the store first with `anchor_state =
//! pending`, then pushed to the ledger. When the ledger call fails the row
//! stays pending and the caller receives [`EngineError::PartiallyApplied`];
//! [`LifecycleCoordinator::retry_anchor`] finishes the job later.

use std::sync::Arc;

use certchain_core::{
    now_millis, validate_certificate_details, validate_certificate_request, AnchorState,
    CertNumber, CertStatus, Certificate, CertificateRequest, IntegrityDigest, Principal,
};
use certchain_ledger::{LedgerClient, LedgerClientExt, LedgerCertificate, LedgerError};
use certchain_store::CertificateStore;

use crate::error::{EngineError, Result};

/// Reject principals that may not mutate certificates.
pub(crate) fn authorize(principal: &Principal, action: &str) -> Result<()> {
    if principal.role.can_write() {
        Ok(())
    } else {
        Err(EngineError::NotAuthorized(format!(
            "user {} may not {}",
            principal.user_id, action
        )))
    }
}

/// Status the ledger should record once the current row is anchored.
fn anchored_status(status: CertStatus) -> CertStatus {
    match status {
        CertStatus::Draft => CertStatus::Created,
        other => other,
    }
}

fn snapshot_of(cert: &Certificate, digest: &IntegrityDigest, status: CertStatus) -> LedgerCertificate {
    let mut snapshot = LedgerCertificate::from_certificate(cert, digest);
    snapshot.status = status.as_str().to_string();
    snapshot
}

/// Outcome of [`LifecycleCoordinator::retry_pending`].
#[derive(Debug, Default)]
pub struct RetryReport {
    pub anchored: Vec<CertNumber>,
    pub failed: Vec<(CertNumber, EngineError)>,
}

/// Orchestrates create, update, revoke and delete.
pub struct LifecycleCoordinator<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
}

impl<S: CertificateStore, L: LedgerClient> LifecycleCoordinator<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>) -> Self {
        Self { store, ledger }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a new certificate.
    ///
    /// Returns the anchored certificate (`created`, `anchored`).
    pub async fn create(
        &self,
        principal: &Principal,
        request: &CertificateRequest,
    ) -> Result<Certificate> {
        authorize(principal, "create certificates")?;
        let (cert_number, details) = validate_certificate_request(request)?;

        self.store.get_customer(details.customer_id).await?;
        let draft = Certificate::draft(cert_number, details, principal.user_id, now_millis());
        let stored = self.store.create(&draft).await?;
        tracing::info!(cert_number = %stored.cert_number, id = stored.id, "certificate stored");

        self.push(stored).await
    }

    /// Replace the descriptive details of a certificate and re-anchor it.
    ///
    /// The certificate number comes from `cert_number`; a request carrying a
    /// different number is refused.
    pub async fn update(
        &self,
        principal: &Principal,
        cert_number: &str,
        request: &CertificateRequest,
    ) -> Result<Certificate> {
        authorize(principal, "update certificates")?;
        let cert_number = CertNumber::parse(cert_number)?;
        if !request.cert_number.is_empty() && request.cert_number != cert_number.as_str() {
            return Err(EngineError::InvalidTransition(format!(
                "certificate number {} cannot be changed to {}",
                cert_number, request.cert_number
            )));
        }
        let details = validate_certificate_details(request)?;

        let mut cert = self.store.get_by_number(&cert_number).await?;
        if cert.status == CertStatus::Revoked {
            return Err(EngineError::InvalidTransition(format!(
                "certificate {} is revoked",
                cert_number
            )));
        }
        self.store.get_customer(details.customer_id).await?;

        // The stored digest stays that of the last anchored version.
        cert.details = details;
        cert.anchor_state = AnchorState::Pending;
        cert.updated_at = now_millis();
        let stored = self.store.update(&cert).await?;
        tracing::info!(cert_number = %stored.cert_number, "certificate details updated");

        self.push(stored).await
    }

    /// Revoke an issued certificate. Revocation is terminal.
    pub async fn revoke(&self, principal: &Principal, cert_number: &str) -> Result<Certificate> {
        authorize(principal, "revoke certificates")?;
        let cert_number = CertNumber::parse(cert_number)?;

        let mut cert = self.store.get_by_number(&cert_number).await?;
        match cert.status {
            CertStatus::Revoked => {
                return Err(EngineError::InvalidTransition(format!(
                    "certificate {} is already revoked",
                    cert_number
                )))
            }
            CertStatus::Draft => {
                return Err(EngineError::InvalidTransition(format!(
                    "certificate {} was never issued; retry its anchor or delete the draft",
                    cert_number
                )))
            }
            CertStatus::Created => {}
        }

        cert.status = CertStatus::Revoked;
        cert.anchor_state = AnchorState::Pending;
        cert.updated_at = now_millis();
        let stored = self.store.update(&cert).await?;
        tracing::info!(cert_number = %stored.cert_number, "certificate revoked locally");

        self.push(stored).await
    }

    /// Delete a draft that never reached the ledger.
    pub async fn delete(&self, principal: &Principal, cert_number: &str) -> Result<()> {
        authorize(principal, "delete certificates")?;
        let cert_number = CertNumber::parse(cert_number)?;

        let cert = self.store.get_by_number(&cert_number).await?;
        if cert.has_been_anchored() {
            return Err(EngineError::InvalidTransition(format!(
                "certificate {} is anchored; revoke it instead",
                cert_number
            )));
        }
        // A create that timed out may still have committed.
        match self.ledger.get_certificate(cert_number.as_str()).await {
            Err(e) if e.is_not_found() => {}
            Ok(_) => {
                return Err(EngineError::InvalidTransition(format!(
                    "certificate {} exists on the ledger; retry its anchor instead",
                    cert_number
                )))
            }
            Err(e) => return Err(e.into()),
        }

        self.store.delete(&cert_number).await?;
        tracing::info!(cert_number = %cert_number, "draft certificate deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pending anchors
    // ─────────────────────────────────────────────────────────────────────────

    /// Certificates whose latest local state is not on the ledger.
    pub async fn pending_anchors(&self) -> Result<Vec<Certificate>> {
        Ok(self.store.list_pending_anchor().await?)
    }

    /// Bring the ledger up to date with a pending certificate.
    ///
    /// Idempotent: the ledger snapshot is read first, and a version the
    /// ledger already holds is adopted instead of being written again. A
    /// certificate that is not pending is returned unchanged.
    pub async fn retry_anchor(&self, cert_number: &str) -> Result<Certificate> {
        let cert_number = CertNumber::parse(cert_number)?;
        let cert = self.store.get_by_number(&cert_number).await?;
        if !cert.is_pending_anchor() {
            return Ok(cert);
        }
        self.resync(cert).await
    }

    /// Run [`retry_anchor`](Self::retry_anchor) over every pending certificate.
    pub async fn retry_pending(&self) -> Result<RetryReport> {
        let mut report = RetryReport::default();
        for cert in self.store.list_pending_anchor().await? {
            let cert_number = cert.cert_number.clone();
            match self.resync(cert).await {
                Ok(_) => report.anchored.push(cert_number),
                Err(e) => report.failed.push((cert_number, e)),
            }
        }
        tracing::info!(
            anchored = report.anchored.len(),
            failed = report.failed.len(),
            "pending anchor retry finished"
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Anchoring
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the current row to the ledger right after a local commit.
    async fn push(&self, cert: Certificate) -> Result<Certificate> {
        let digest = cert.compute_digest();
        let target = anchored_status(cert.status);
        let snapshot = snapshot_of(&cert, &digest, target);

        let result = if cert.has_been_anchored() {
            self.ledger
                .update_certificate(cert.cert_number.as_str(), &snapshot)
                .await
        } else {
            self.ledger.create_certificate(&snapshot).await
        };

        match result {
            Ok(tx_id) => self.record_anchor(cert, &digest, tx_id, target).await,
            Err(e) if e.is_already_exists() => {
                tracing::info!(cert_number = %cert.cert_number, "certificate already on ledger, reconciling");
                self.resync(cert).await
            }
            Err(source) => Err(self.partially_applied(&cert, source)),
        }
    }

    /// Compare the row with the ledger snapshot and write only what is missing.
    async fn resync(&self, cert: Certificate) -> Result<Certificate> {
        let digest = cert.compute_digest();
        let target = anchored_status(cert.status);
        let snapshot = snapshot_of(&cert, &digest, target);
        let key = cert.cert_number.as_str();

        let tx_id = match self.ledger.get_certificate(key).await {
            Err(e) if e.is_not_found() => {
                let mut tx_id = self
                    .ledger
                    .create_certificate(&snapshot)
                    .await
                    .map_err(|source| self.partially_applied(&cert, source))?;
                // The contract records every new certificate as created.
                if target != CertStatus::Created {
                    tx_id = self
                        .ledger
                        .update_certificate(key, &snapshot)
                        .await
                        .map_err(|source| self.partially_applied(&cert, source))?;
                }
                tx_id
            }
            Ok(on_ledger)
                if on_ledger.same_content(&snapshot) && !on_ledger.blockchain_tx_id.is_empty() =>
            {
                tracing::info!(
                    cert_number = %cert.cert_number,
                    tx_id = %on_ledger.blockchain_tx_id,
                    "ledger already holds this version"
                );
                on_ledger.blockchain_tx_id
            }
            Ok(on_ledger) if on_ledger.is_revoked() && target != CertStatus::Revoked => {
                return Err(EngineError::InvalidTransition(format!(
                    "certificate {} is revoked on the ledger",
                    cert.cert_number
                )))
            }
            Ok(_) => self
                .ledger
                .update_certificate(key, &snapshot)
                .await
                .map_err(|source| self.partially_applied(&cert, source))?,
            Err(source) => return Err(self.partially_applied(&cert, source)),
        };

        self.record_anchor(cert, &digest, tx_id, target).await
    }

    async fn record_anchor(
        &self,
        mut cert: Certificate,
        digest: &IntegrityDigest,
        tx_id: String,
        status: CertStatus,
    ) -> Result<Certificate> {
        cert.status = status;
        cert.anchor_state = AnchorState::Anchored;
        cert.integrity_digest = Some(digest.to_hex());
        cert.ledger_tx_id = Some(tx_id);
        cert.updated_at = now_millis();

        let stored = self.store.update(&cert).await.map_err(|e| {
            tracing::warn!(
                cert_number = %cert.cert_number,
                error = %e,
                "anchored on ledger but local record failed; certificate left pending"
            );
            EngineError::from(e)
        })?;
        tracing::info!(
            cert_number = %stored.cert_number,
            status = %stored.status,
            tx_id = stored.ledger_tx_id.as_deref().unwrap_or_default(),
            "certificate anchored"
        );
        Ok(stored)
    }

    fn partially_applied(&self, cert: &Certificate, source: LedgerError) -> EngineError {
        tracing::warn!(
            cert_number = %cert.cert_number,
            error = %source,
            "ledger anchor failed; certificate left pending"
        );
        EngineError::PartiallyApplied {
            cert_number: cert.cert_number.clone(),
            source,
        }
    }
}
