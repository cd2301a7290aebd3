//! Measurement intake and authorized reads.
//!
//! A batch is validated in full, sealed with the measurement cipher and
//! stored in one transaction. Each stored item is then anchored on its
//! own; items the ledger did not take stay pending and are reported with
//! the error that stopped them.

use std::sync::Arc;

use certchain_core::{
    validate_measurement_batch, AnchorState, CertNumber, CertStatus, Certificate, Measurement,
    MeasurementCipher, MeasurementRequest, NewMeasurement, Principal,
};
use certchain_ledger::{LedgerClient, LedgerClientExt, LedgerError, LedgerMeasurement};
use certchain_store::CertificateStore;

use crate::coordinator::authorize;
use crate::error::{EngineError, Result};

/// A stored measurement the ledger has not confirmed.
#[derive(Debug, Clone)]
pub struct PendingMeasurement {
    pub measurement: Measurement,
    pub error: LedgerError,
}

/// Anchoring outcome of a stored batch.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// Every item is on the ledger.
    Anchored(Vec<Measurement>),
    /// Some items are on the ledger.
    PartiallyAnchored {
        anchored: Vec<Measurement>,
        pending: Vec<PendingMeasurement>,
    },
    /// No item reached the ledger.
    Unanchored { pending: Vec<PendingMeasurement> },
}

impl BatchOutcome {
    fn from_parts(anchored: Vec<Measurement>, pending: Vec<PendingMeasurement>) -> Self {
        match (anchored.is_empty(), pending.is_empty()) {
            (_, true) => Self::Anchored(anchored),
            (true, false) => Self::Unanchored { pending },
            (false, false) => Self::PartiallyAnchored { anchored, pending },
        }
    }

    pub fn is_fully_anchored(&self) -> bool {
        matches!(self, Self::Anchored(_))
    }

    pub fn anchored(&self) -> &[Measurement] {
        match self {
            Self::Anchored(anchored) | Self::PartiallyAnchored { anchored, .. } => anchored,
            Self::Unanchored { .. } => &[],
        }
    }

    pub fn pending(&self) -> &[PendingMeasurement] {
        match self {
            Self::Anchored(_) => &[],
            Self::PartiallyAnchored { pending, .. } | Self::Unanchored { pending } => pending,
        }
    }
}

/// Records encrypted measurements against certificates.
pub struct MeasurementRecorder<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    cipher: MeasurementCipher,
}

impl<S: CertificateStore, L: LedgerClient> MeasurementRecorder<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>, cipher: MeasurementCipher) -> Self {
        Self {
            store,
            ledger,
            cipher,
        }
    }

    /// Store and anchor a batch of measurements.
    ///
    /// Nothing is written unless every request validates and seals. A store
    /// failure is returned as an error with nothing anchored.
    pub async fn record_batch(
        &self,
        principal: &Principal,
        cert_number: &str,
        requests: &[MeasurementRequest],
    ) -> Result<BatchOutcome> {
        authorize(principal, "record measurements")?;
        let cert_number = CertNumber::parse(cert_number)?;
        let inputs = validate_measurement_batch(requests)?;

        let cert = self.writable_certificate(&cert_number).await?;
        let sealed = inputs
            .iter()
            .map(|input| NewMeasurement::seal(input, &self.cipher))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let stored = self.store.insert_measurements(cert.id, &sealed).await?;
        tracing::info!(cert_number = %cert_number, count = stored.len(), "measurements stored");

        self.anchor_all(&cert_number, stored).await
    }

    /// Re-send every unanchored measurement of a certificate.
    pub async fn retry_anchors(&self, cert_number: &str) -> Result<BatchOutcome> {
        let cert_number = CertNumber::parse(cert_number)?;
        let cert = self.store.get_by_number(&cert_number).await?;
        let unanchored = self.store.list_unanchored_measurements(cert.id).await?;
        self.anchor_all(&cert_number, unanchored).await
    }

    /// Measurements of a certificate, newest test timestamp first.
    ///
    /// With `decrypt`, every payload is opened; one failure fails the whole
    /// read and no decrypted payload is returned.
    pub async fn measurements(
        &self,
        principal: &Principal,
        cert_number: &str,
        decrypt: bool,
    ) -> Result<Vec<Measurement>> {
        if decrypt {
            authorize(principal, "read decrypted measurements")?;
        }
        let cert_number = CertNumber::parse(cert_number)?;
        let cert = self.store.get_by_number(&cert_number).await?;
        let rows = self.store.list_measurements(cert.id).await?;
        if !decrypt {
            return Ok(rows);
        }

        let opened = rows
            .into_iter()
            .map(|m| m.open(&self.cipher))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                tracing::warn!(cert_number = %cert_number, error = %e, "measurement decryption failed");
                EngineError::from(e)
            })?;
        tracing::debug!(cert_number = %cert_number, count = opened.len(), "measurements decrypted");
        Ok(opened)
    }

    /// Measurements as anchored on the ledger.
    pub async fn ledger_measurements(&self, cert_number: &str) -> Result<Vec<LedgerMeasurement>> {
        let cert_number = CertNumber::parse(cert_number)?;
        Ok(self.ledger.get_test_data_by_cert(cert_number.as_str()).await?)
    }

    async fn writable_certificate(&self, cert_number: &CertNumber) -> Result<Certificate> {
        let cert = self.store.get_by_number(cert_number).await?;
        if cert.status == CertStatus::Revoked {
            return Err(EngineError::InvalidTransition(format!(
                "certificate {} is revoked",
                cert_number
            )));
        }
        Ok(cert)
    }

    /// Transaction that already anchored `document`, when the ledger can tell.
    async fn committed_tx_id(&self, document: &LedgerMeasurement) -> Option<String> {
        match self.ledger.get_test_data_by_cert(&document.cert_number).await {
            Ok(found) => found
                .into_iter()
                .find(|m| m.measurement_id == document.measurement_id)
                .map(|m| m.tx_id)
                .filter(|tx_id| !tx_id.is_empty()),
            Err(e) => {
                tracing::debug!(
                    measurement_id = document.measurement_id,
                    error = %e,
                    "anchoring transaction of existing measurement unknown"
                );
                None
            }
        }
    }

    async fn anchor_all(
        &self,
        cert_number: &CertNumber,
        items: Vec<Measurement>,
    ) -> Result<BatchOutcome> {
        let mut anchored = Vec::with_capacity(items.len());
        let mut pending = Vec::new();

        for mut measurement in items {
            let document = LedgerMeasurement::from_measurement(cert_number.as_str(), &measurement);
            let tx_id = match self.ledger.add_test_data(&document).await {
                Ok(tx_id) => Some(tx_id),
                Err(e) if e.is_already_exists() => self.committed_tx_id(&document).await,
                Err(error) => {
                    tracing::warn!(
                        cert_number = %cert_number,
                        measurement_id = measurement.id,
                        error = %error,
                        "measurement anchor failed"
                    );
                    pending.push(PendingMeasurement { measurement, error });
                    continue;
                }
            };

            self.store
                .mark_measurement_anchored(measurement.id, tx_id.as_deref())
                .await?;
            measurement.anchor_state = AnchorState::Anchored;
            measurement.ledger_tx_id = tx_id;
            anchored.push(measurement);
        }

        tracing::info!(
            cert_number = %cert_number,
            anchored = anchored.len(),
            pending = pending.len(),
            "measurement anchoring finished"
        );
        Ok(BatchOutcome::from_parts(anchored, pending))
    }
}
