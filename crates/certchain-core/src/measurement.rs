//! Measurement (test data point) records.
//!
//! The sensitive readings of a measurement never travel or rest in
//! plaintext: they are rendered into a fixed payload string, sealed with the
//! [`MeasurementCipher`], and only the ciphertext is persisted or anchored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cipher::MeasurementCipher;
use crate::error::{CipherError, ValidationError};
use crate::types::AnchorState;

/// Number of `|`-separated fields in a readings payload.
const PAYLOAD_FIELDS: usize = 5;

/// The sensitive numeric readings of one test point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementReadings {
    pub actual_percentage: f64,
    pub ratio_error: f64,
    pub angle_error: f64,
    pub current_value: f64,
    pub voltage_value: f64,
}

impl MeasurementReadings {
    /// Render the plaintext payload.
    ///
    /// Format: `pct|ratio|angle|current|voltage` with six decimals for the
    /// first three fields and three for the electrical values.
    pub fn to_payload(&self) -> String {
        format!(
            "{:.6}|{:.6}|{:.6}|{:.3}|{:.3}",
            self.actual_percentage,
            self.ratio_error,
            self.angle_error,
            self.current_value,
            self.voltage_value
        )
    }

    /// Parse a payload produced by [`to_payload`](Self::to_payload).
    pub fn from_payload(payload: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = payload.split('|').collect();
        if parts.len() != PAYLOAD_FIELDS {
            return Err(ValidationError::MalformedPayload(format!(
                "expected {} fields, got {}",
                PAYLOAD_FIELDS,
                parts.len()
            )));
        }
        let mut values = [0f64; PAYLOAD_FIELDS];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .map_err(|e| ValidationError::MalformedPayload(format!("{part:?}: {e}")))?;
        }
        Ok(Self {
            actual_percentage: values[0],
            ratio_error: values[1],
            angle_error: values[2],
            current_value: values[3],
            voltage_value: values[4],
        })
    }
}

/// Inbound measurement payload, as bound by the request layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRequest {
    pub device_addr: String,
    pub test_point: String,
    pub actual_percentage: f64,
    #[serde(default)]
    pub ratio_error: f64,
    #[serde(default)]
    pub angle_error: f64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default)]
    pub voltage_value: f64,
    #[serde(default)]
    pub workstation_number: String,
    #[serde(default)]
    pub data_type: String,
    /// RFC 3339.
    pub test_timestamp: String,
}

/// A validated measurement, still holding plaintext readings.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementInput {
    pub device_addr: String,
    pub data_type: String,
    pub test_point: String,
    pub workstation_number: String,
    pub test_timestamp: DateTime<Utc>,
    pub readings: MeasurementReadings,
}

/// A measurement ready for the store: readings replaced by ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMeasurement {
    pub device_addr: String,
    pub data_type: String,
    pub test_point: String,
    pub workstation_number: String,
    pub test_timestamp: DateTime<Utc>,
    pub encrypted_payload: String,
}

impl NewMeasurement {
    /// Encrypt the readings of a validated measurement.
    pub fn seal(input: &MeasurementInput, cipher: &MeasurementCipher) -> Result<Self, CipherError> {
        let encrypted_payload = cipher.encrypt(&input.readings.to_payload())?;
        Ok(Self {
            device_addr: input.device_addr.clone(),
            data_type: input.data_type.clone(),
            test_point: input.test_point.clone(),
            workstation_number: input.workstation_number.clone(),
            test_timestamp: input.test_timestamp,
            encrypted_payload,
        })
    }
}

/// A stored measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub id: i64,
    pub cert_id: i64,
    pub device_addr: String,
    pub data_type: String,
    pub test_point: String,
    pub workstation_number: String,
    pub test_timestamp: DateTime<Utc>,
    /// Ciphertext hex; stays inside the system of record.
    #[serde(skip)]
    pub encrypted_payload: String,
    pub anchor_state: AnchorState,
    /// Anchoring transaction. `None` on an anchored row means the ledger
    /// already held the record and its transaction could not be read back.
    pub ledger_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Present only in memory after an authorized read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypted_payload: Option<String>,
}

impl Measurement {
    /// Decrypt the payload into `decrypted_payload`.
    ///
    /// On error the measurement is dropped, so no partially opened record
    /// can escape.
    pub fn open(mut self, cipher: &MeasurementCipher) -> Result<Self, CipherError> {
        let plaintext = cipher.decrypt(&self.encrypted_payload)?;
        self.decrypted_payload = Some(plaintext);
        Ok(self)
    }

    /// Parsed readings, if the payload has been decrypted.
    pub fn readings(&self) -> Option<Result<MeasurementReadings, ValidationError>> {
        self.decrypted_payload
            .as_deref()
            .map(MeasurementReadings::from_payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherKey;

    fn readings() -> MeasurementReadings {
        MeasurementReadings {
            actual_percentage: 95.0,
            ratio_error: 0.01,
            angle_error: -0.5,
            current_value: 5.0,
            voltage_value: 230.0,
        }
    }

    #[test]
    fn test_payload_format() {
        assert_eq!(
            readings().to_payload(),
            "95.000000|0.010000|-0.500000|5.000|230.000"
        );
    }

    #[test]
    fn test_payload_parse() {
        let parsed = MeasurementReadings::from_payload("95.000000|0.010000|-0.500000|5.000|230.000")
            .unwrap();
        assert_eq!(parsed, readings());
    }

    #[test]
    fn test_payload_parse_rejects_wrong_shape() {
        assert!(MeasurementReadings::from_payload("1|2|3").is_err());
        assert!(MeasurementReadings::from_payload("1|2|3|4|x").is_err());
    }

    #[test]
    fn test_seal_and_open() {
        let cipher = MeasurementCipher::new(&CipherKey::from_str_key("1234567890123456").unwrap());
        let input = MeasurementInput {
            device_addr: "DEV001".into(),
            data_type: String::new(),
            test_point: "5% rated current".into(),
            workstation_number: "WS001".into(),
            test_timestamp: Utc::now(),
            readings: readings(),
        };
        let sealed = NewMeasurement::seal(&input, &cipher).unwrap();
        assert!(!sealed.encrypted_payload.contains("95.000000"));

        let stored = Measurement {
            id: 1,
            cert_id: 1,
            device_addr: sealed.device_addr,
            data_type: sealed.data_type,
            test_point: sealed.test_point,
            workstation_number: sealed.workstation_number,
            test_timestamp: sealed.test_timestamp,
            encrypted_payload: sealed.encrypted_payload,
            anchor_state: AnchorState::Pending,
            ledger_tx_id: None,
            created_at: Utc::now(),
            decrypted_payload: None,
        };
        assert!(stored.readings().is_none());

        let opened = stored.open(&cipher).unwrap();
        assert_eq!(opened.readings().unwrap().unwrap(), readings());
    }

    #[test]
    fn test_ciphertext_not_serialized() {
        let m = Measurement {
            id: 1,
            cert_id: 1,
            device_addr: "DEV001".into(),
            data_type: String::new(),
            test_point: "tp".into(),
            workstation_number: String::new(),
            test_timestamp: Utc::now(),
            encrypted_payload: "deadbeef".into(),
            anchor_state: AnchorState::Anchored,
            ledger_tx_id: Some("tx".into()),
            created_at: Utc::now(),
            decrypted_payload: None,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("encryptedPayload").is_none());
        assert!(json.get("decryptedPayload").is_none());
    }
}
