//! Contract wire messages.
//!
//! Documents are JSON. Certificate and measurement documents use camelCase
//! field names; history and range-query envelopes use the contract's
//! PascalCase names (`TxId`, `Value`, `Key`, `Record`, ...).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use certchain_core::{CertStatus, Certificate, IntegrityDigest, Measurement};

/// World-state key prefix reserved for measurement records.
pub const TEST_DATA_PREFIX: &str = "TESTDATA_";

/// World-state key of a measurement.
pub fn test_data_key(cert_number: &str, measurement_id: i64) -> String {
    format!("{}{}_{}", TEST_DATA_PREFIX, cert_number, measurement_id)
}

/// Render a timestamp the way the ledger does (RFC 3339, UTC, nanoseconds).
pub fn ledger_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Extend a certificate's test-data hash by one anchored measurement.
///
/// `hex(SHA-256(previous "|" key "|" anchored_at))`, starting from the
/// empty string.
pub fn chain_test_data_hash(previous: &str, key: &str, anchored_at: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());
    hasher.update(b"|");
    hasher.update(anchored_at.as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute the test-data hash from a certificate's anchored measurements.
pub fn test_data_hash_of(measurements: &[LedgerMeasurement]) -> String {
    let mut ordered: Vec<&LedgerMeasurement> = measurements.iter().collect();
    ordered.sort_by_key(|m| m.sequence);
    ordered.iter().fold(String::new(), |acc, m| {
        chain_test_data_hash(&acc, &m.key(), &m.anchored_at)
    })
}

/// A certificate snapshot as anchored on the ledger.
///
/// Carries the customer id only; customer name, address and contacts
/// stay in the system of record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerCertificate {
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
    /// YYYY-MM-DD.
    pub test_date: String,
    /// YYYY-MM-DD.
    pub expire_date: String,
    pub test_result: String,
    pub status: String,
    pub integrity_digest: String,
    /// Set by the contract.
    #[serde(default)]
    pub created_at: String,
    /// Set by the contract.
    #[serde(default)]
    pub updated_at: String,
    /// Set by the contract to the transaction that last wrote the content.
    /// Measurement anchors leave it unchanged.
    #[serde(default)]
    pub blockchain_tx_id: String,
    /// Running hash over the measurements anchored under this certificate.
    /// Set by the contract; empty until the first measurement.
    #[serde(default)]
    pub test_data_hash: String,
}

impl LedgerCertificate {
    /// Build the snapshot of a local certificate.
    pub fn from_certificate(cert: &Certificate, digest: &IntegrityDigest) -> Self {
        Self {
            cert_number: cert.cert_number.to_string(),
            customer_id: cert.details.customer_id,
            instrument_name: cert.details.instrument_name.clone(),
            instrument_number: cert.details.instrument_number.clone(),
            manufacturer: cert.details.manufacturer.clone(),
            model_spec: cert.details.model_spec.clone(),
            instrument_accuracy: cert.details.instrument_accuracy.clone(),
            test_date: cert.details.test_date.format("%Y-%m-%d").to_string(),
            expire_date: cert.details.expire_date.format("%Y-%m-%d").to_string(),
            test_result: cert.details.test_result.as_str().to_string(),
            status: cert.status.as_str().to_string(),
            integrity_digest: digest.to_hex(),
            created_at: String::new(),
            updated_at: String::new(),
            blockchain_tx_id: String::new(),
            test_data_hash: String::new(),
        }
    }

    pub fn parsed_status(&self) -> Option<CertStatus> {
        CertStatus::from_str_opt(&self.status)
    }

    pub fn is_revoked(&self) -> bool {
        self.parsed_status() == Some(CertStatus::Revoked)
    }

    /// Whether both snapshots carry the same certificate content.
    ///
    /// Ignores the fields the contract stamps on write.
    pub fn same_content(&self, other: &LedgerCertificate) -> bool {
        self.differing_fields(other).is_empty()
    }

    /// Wire names of the content fields that differ between two snapshots.
    pub fn differing_fields(&self, other: &LedgerCertificate) -> Vec<&'static str> {
        let pairs: [(&'static str, bool); 12] = [
            ("certNumber", self.cert_number == other.cert_number),
            ("customerId", self.customer_id == other.customer_id),
            ("instrumentName", self.instrument_name == other.instrument_name),
            ("instrumentNumber", self.instrument_number == other.instrument_number),
            ("manufacturer", self.manufacturer == other.manufacturer),
            ("modelSpec", self.model_spec == other.model_spec),
            ("instrumentAccuracy", self.instrument_accuracy == other.instrument_accuracy),
            ("testDate", self.test_date == other.test_date),
            ("expireDate", self.expire_date == other.expire_date),
            ("testResult", self.test_result == other.test_result),
            ("status", self.status == other.status),
            ("integrityDigest", self.integrity_digest == other.integrity_digest),
        ];
        pairs
            .into_iter()
            .filter(|(_, same)| !same)
            .map(|(name, _)| name)
            .collect()
    }
}

/// A measurement as anchored on the ledger: labels plus ciphertext.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMeasurement {
    pub cert_number: String,
    /// Local row id; part of the world-state key.
    pub measurement_id: i64,
    pub device_addr: String,
    #[serde(default)]
    pub data_type: String,
    pub test_point: String,
    #[serde(default)]
    pub workstation_number: String,
    /// RFC 3339.
    pub test_timestamp: String,
    /// hex(nonce || ciphertext || tag).
    pub encrypted_data: String,
    /// Position in the certificate's test-data chain, from 1. Set by the contract.
    #[serde(default)]
    pub sequence: u64,
    /// Ledger timestamp of the anchoring transaction. Set by the contract.
    #[serde(default)]
    pub anchored_at: String,
    /// Anchoring transaction. Set by the contract.
    #[serde(default)]
    pub tx_id: String,
}

impl LedgerMeasurement {
    pub fn from_measurement(cert_number: &str, m: &Measurement) -> Self {
        Self {
            cert_number: cert_number.to_string(),
            measurement_id: m.id,
            device_addr: m.device_addr.clone(),
            data_type: m.data_type.clone(),
            test_point: m.test_point.clone(),
            workstation_number: m.workstation_number.clone(),
            test_timestamp: ledger_timestamp(m.test_timestamp),
            encrypted_data: m.encrypted_payload.clone(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> String {
        test_data_key(&self.cert_number, self.measurement_id)
    }
}

/// One version of a certificate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(rename = "TxId")]
    pub tx_id: String,
    /// The snapshot written, or `None` for a tombstone.
    #[serde(rename = "Value", default)]
    pub value: Option<LedgerCertificate>,
    /// RFC 3339, as produced by the ledger.
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "IsDelete", default)]
    pub is_delete: bool,
}

/// One entry of a range query over the certificate world state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Record")]
    pub record: LedgerCertificate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_wire_names() {
        let cert = LedgerCertificate {
            cert_number: "CERT-0001".into(),
            customer_id: 3,
            instrument_name: "CT".into(),
            test_date: "2024-01-10".into(),
            expire_date: "2027-01-10".into(),
            test_result: "qualified".into(),
            status: "created".into(),
            integrity_digest: "00".repeat(32),
            ..Default::default()
        };
        let json = serde_json::to_value(&cert).unwrap();
        assert_eq!(json["certNumber"], "CERT-0001");
        assert_eq!(json["customerId"], 3);
        assert_eq!(json["integrityDigest"], "00".repeat(32));
        assert!(json.get("customerName").is_none());
        assert!(json.get("blockchainTxId").is_some());
    }

    #[test]
    fn test_history_record_wire_names() {
        let raw = r#"[
            {"TxId":"a1","Value":{"certNumber":"C","customerId":1,"instrumentName":"CT",
              "testDate":"2024-01-10","expireDate":"2027-01-10","testResult":"qualified",
              "status":"created","integrityDigest":"ff"},
             "Timestamp":"2024-01-10T00:00:00Z","IsDelete":false},
            {"TxId":"a2","Value":null,"Timestamp":"2024-01-11T00:00:00Z","IsDelete":true}
        ]"#;
        let records: Vec<HistoryRecord> = serde_json::from_str(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value.as_ref().unwrap().cert_number, "C");
        assert!(records[1].is_delete);
        assert!(records[1].value.is_none());
        assert_eq!(records[1].timestamp, "2024-01-11T00:00:00Z");
    }

    #[test]
    fn test_same_content_ignores_contract_stamps() {
        let local = LedgerCertificate {
            status: "revoked".into(),
            integrity_digest: "ab".into(),
            expire_date: "2027-01-10".into(),
            ..Default::default()
        };
        assert!(local.is_revoked());

        let stamped = LedgerCertificate {
            created_at: "2024-01-10T00:00:00Z".into(),
            updated_at: "2024-01-11T00:00:00Z".into(),
            blockchain_tx_id: "a1".into(),
            test_data_hash: "ff".into(),
            ..local.clone()
        };
        assert!(local.same_content(&stamped));

        // Fields outside the digest still count.
        let extended = LedgerCertificate {
            expire_date: "2030-01-10".into(),
            ..stamped.clone()
        };
        assert!(!local.same_content(&extended));
        assert_eq!(local.differing_fields(&extended), ["expireDate"]);
        let renamed = LedgerCertificate {
            manufacturer: "NewCo".into(),
            ..stamped
        };
        assert!(!local.same_content(&renamed));
    }

    #[test]
    fn test_test_data_hash_follows_sequence() {
        let m = |id: i64, sequence: u64, at: &str| LedgerMeasurement {
            cert_number: "C".into(),
            measurement_id: id,
            sequence,
            anchored_at: at.into(),
            ..Default::default()
        };
        let first = chain_test_data_hash("", "TESTDATA_C_1", "2024-01-10T00:00:01Z");
        let second = chain_test_data_hash(&first, "TESTDATA_C_2", "2024-01-10T00:00:02Z");
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);

        let out_of_order = [
            m(2, 2, "2024-01-10T00:00:02Z"),
            m(1, 1, "2024-01-10T00:00:01Z"),
        ];
        assert_eq!(test_data_hash_of(&out_of_order), second);
        assert_eq!(test_data_hash_of(&[]), "");
    }

    #[test]
    fn test_test_data_key() {
        assert_eq!(test_data_key("CERT-0001", 7), "TESTDATA_CERT-0001_7");
    }
}
