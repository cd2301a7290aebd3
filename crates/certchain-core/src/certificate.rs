//! The certificate and customer data model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::IntegrityDigest;
use crate::types::{AnchorState, CertNumber, CertStatus, TestResult};

/// Inbound create/update payload, as bound by the request layer.
///
/// Dates arrive as strings and are parsed during validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    pub cert_number: String,
    pub customer_id: i64,
    pub instrument_name: String,
    #[serde(default)]
    pub instrument_number: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model_spec: String,
    #[serde(default)]
    pub instrument_accuracy: String,
    pub test_date: String,
    #[serde(default)]
    pub expire_date: Option<String>,
    pub test_result: String,
}

/// The mutable, descriptive part of a certificate.
///
/// An update replaces these details wholesale; the certificate number is
/// never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetails {
    pub customer_id: i64,
    pub instrument_name: String,
    pub instrument_number: String,
    pub manufacturer: String,
    pub model_spec: String,
    pub instrument_accuracy: String,
    pub test_date: NaiveDate,
    pub expire_date: NaiveDate,
    pub test_result: TestResult,
}

/// A calibration certificate as held by the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Store-assigned row id (0 until persisted).
    pub id: i64,
    pub cert_number: CertNumber,
    #[serde(flatten)]
    pub details: CertificateDetails,
    pub status: CertStatus,
    pub anchor_state: AnchorState,
    /// Digest of the last anchored version.
    pub integrity_digest: Option<String>,
    /// Ledger transaction of the last anchored version.
    pub ledger_tx_id: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// Build a new, not yet persisted certificate.
    pub fn draft(
        cert_number: CertNumber,
        details: CertificateDetails,
        created_by: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            cert_number,
            details,
            status: CertStatus::Draft,
            anchor_state: AnchorState::Pending,
            integrity_digest: None,
            ledger_tx_id: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute the integrity digest from the current core fields.
    pub fn compute_digest(&self) -> IntegrityDigest {
        IntegrityDigest::compute(self)
    }

    /// Whether the stored digest matches the current core fields.
    ///
    /// A certificate that was never anchored has no stored digest and never
    /// matches.
    pub fn digest_matches(&self) -> bool {
        self.integrity_digest
            .as_deref()
            .is_some_and(|stored| self.compute_digest().to_hex() == stored)
    }

    /// Expired once the expiry date is reached.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.details.expire_date <= today
    }

    /// Whether any version of this certificate has reached the ledger.
    pub fn has_been_anchored(&self) -> bool {
        self.ledger_tx_id.is_some()
    }

    pub fn is_pending_anchor(&self) -> bool {
        self.anchor_state == AnchorState::Pending
    }
}

/// Customer reference data. Read-only from the engine's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: i64,
    pub customer_name: String,
    pub customer_address: String,
    pub contact_person: String,
    pub contact_phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A customer to seed into the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub customer_name: String,
    #[serde(default)]
    pub customer_address: String,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub contact_phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Certificate {
        let details = CertificateDetails {
            customer_id: 7,
            instrument_name: "Current transformer".into(),
            instrument_number: "SN-42".into(),
            manufacturer: "Acme".into(),
            model_spec: "LZZBJ9-10".into(),
            instrument_accuracy: "0.2S".into(),
            test_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            expire_date: NaiveDate::from_ymd_opt(2027, 1, 10).unwrap(),
            test_result: TestResult::Qualified,
        };
        Certificate::draft(CertNumber::parse("CERT-0001").unwrap(), details, 1, Utc::now())
    }

    #[test]
    fn test_draft_is_pending_and_unanchored() {
        let cert = sample();
        assert_eq!(cert.status, CertStatus::Draft);
        assert!(cert.is_pending_anchor());
        assert!(!cert.has_been_anchored());
        assert!(!cert.digest_matches());
    }

    #[test]
    fn test_digest_matches_after_recording() {
        let mut cert = sample();
        cert.integrity_digest = Some(cert.compute_digest().to_hex());
        assert!(cert.digest_matches());

        cert.details.instrument_name.push('X');
        assert!(!cert.digest_matches());
    }

    #[test]
    fn test_expiry_boundary() {
        let cert = sample();
        let day_before = NaiveDate::from_ymd_opt(2027, 1, 9).unwrap();
        let expiry_day = NaiveDate::from_ymd_opt(2027, 1, 10).unwrap();
        assert!(!cert.is_expired_on(day_before));
        assert!(cert.is_expired_on(expiry_day));
    }

    #[test]
    fn test_serializes_flat_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["certNumber"], "CERT-0001");
        assert_eq!(json["testDate"], "2024-01-10");
        assert_eq!(json["testResult"], "qualified");
        assert_eq!(json["anchorState"], "pending");
    }
}
