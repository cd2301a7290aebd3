//! The certificate integrity digest.
//!
//! SHA-256 over a domain tag and the core certificate fields, joined by the
//! ASCII unit separator. Validation guarantees fields never contain control
//! characters, so the separator cannot appear inside a field.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::certificate::Certificate;
use crate::types::TestResult;

/// Domain tag prefixed to every canonical input.
pub const DIGEST_DOMAIN: &str = "certchain.integrity.v1";

/// Field separator (ASCII unit separator).
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// A 32-byte SHA-256 integrity digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegrityDigest([u8; 32]);

impl IntegrityDigest {
    /// Digest the core fields of a certificate.
    pub fn compute(cert: &Certificate) -> Self {
        Self::hash(canonical_fields(cert).as_bytes())
    }

    /// Digest an explicit field tuple.
    pub fn from_fields(
        cert_number: &str,
        customer_id: i64,
        instrument_name: &str,
        test_date: NaiveDate,
        test_result: TestResult,
    ) -> Self {
        let input = join_fields(cert_number, customer_id, instrument_name, test_date, test_result);
        Self::hash(input.as_bytes())
    }

    fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for IntegrityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for IntegrityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The canonical digest input for a certificate.
pub fn canonical_fields(cert: &Certificate) -> String {
    join_fields(
        cert.cert_number.as_str(),
        cert.details.customer_id,
        &cert.details.instrument_name,
        cert.details.test_date,
        cert.details.test_result,
    )
}

fn join_fields(
    cert_number: &str,
    customer_id: i64,
    instrument_name: &str,
    test_date: NaiveDate,
    test_result: TestResult,
) -> String {
    let customer_id = customer_id.to_string();
    let test_date = test_date.format("%Y-%m-%d").to_string();
    let fields = [
        DIGEST_DOMAIN,
        cert_number,
        &customer_id,
        instrument_name,
        &test_date,
        test_result.as_str(),
    ];

    let mut out = String::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.push_str(field);
    }
    out
}
