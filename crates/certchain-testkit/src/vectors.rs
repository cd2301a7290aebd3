//! Golden integrity digest vectors.
//!
//! Any implementation of the digest must reproduce these values exactly,
//! otherwise certificates anchored by one build fail verification in another.

use chrono::NaiveDate;

use certchain_core::{IntegrityDigest, TestResult};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub cert_number: &'static str,
    pub customer_id: i64,
    pub instrument_name: &'static str,
    /// `YYYY-MM-DD`.
    pub test_date: &'static str,
    pub test_result: TestResult,
    /// Expected digest (lowercase hex).
    pub expected_digest: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "qualified current transformer",
            cert_number: "CERT-0001",
            customer_id: 7,
            instrument_name: "Current transformer",
            test_date: "2024-01-10",
            test_result: TestResult::Qualified,
            expected_digest: "8031bf347a617cbaab0ea2f33f5a2d42e0e8bef927aa8f1abdc7dc84f72fb239",
        },
        GoldenVector {
            name: "qualified voltage transformer",
            cert_number: "CERT-0001",
            customer_id: 1,
            instrument_name: "Voltage transformer",
            test_date: "2024-01-10",
            test_result: TestResult::Qualified,
            expected_digest: "95c63025b7c617b1f13bc1dcbfc7dae00ab6d7ed6389318e565ea3ba36bf7fe9",
        },
        GoldenVector {
            name: "unqualified voltage transformer",
            cert_number: "CERT-0001",
            customer_id: 1,
            instrument_name: "Voltage transformer",
            test_date: "2024-01-10",
            test_result: TestResult::Unqualified,
            expected_digest: "646b36fb3df2520178dc9c9c62c9fc12c5826f34c7fb99fb57c4793a220b2b2c",
        },
        GoldenVector {
            name: "non-ASCII instrument name",
            cert_number: "JL/2024.001_a",
            customer_id: 42,
            instrument_name: "电能表",
            test_date: "2023-02-28",
            test_result: TestResult::Qualified,
            expected_digest: "019645e4f97e758d70ea89d9594cedfe819926db5783e77d21ef5bb914dfcca3",
        },
    ]
}

/// Compute the digest described by a vector.
///
/// Returns `None` if the vector's date does not parse.
pub fn digest_from_vector(vector: &GoldenVector) -> Option<IntegrityDigest> {
    let test_date = NaiveDate::parse_from_str(vector.test_date, "%Y-%m-%d").ok()?;
    Some(IntegrityDigest::from_fields(
        vector.cert_number,
        vector.customer_id,
        vector.instrument_name,
        test_date,
        vector.test_result,
    ))
}

/// Check every golden vector against this build.
///
/// Returns `(name, matches, computed_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = digest_from_vector(v)
                .map(|d| d.to_hex())
                .unwrap_or_default();
            (v.name.to_string(), hex == v.expected_digest, hex)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::{validate_certificate_request, Certificate, CertificateRequest};

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, hex) in verify_all_vectors() {
            assert!(matches, "vector '{name}' computed {hex}");
        }
    }

    #[test]
    fn test_vectors_match_through_certificate() {
        // The request path trims and parses; it must land on the same digest.
        for v in all_vectors() {
            let request = CertificateRequest {
                cert_number: v.cert_number.into(),
                customer_id: v.customer_id,
                instrument_name: format!("  {}  ", v.instrument_name),
                test_date: v.test_date.into(),
                test_result: v.test_result.as_str().into(),
                ..Default::default()
            };
            let (number, details) = validate_certificate_request(&request).unwrap();
            let cert = Certificate::draft(number, details, 1, chrono::Utc::now());
            assert_eq!(cert.compute_digest().to_hex(), v.expected_digest, "{}", v.name);
        }
    }

    #[test]
    fn test_result_flip_changes_digest() {
        let vectors = all_vectors();
        assert_ne!(vectors[1].expected_digest, vectors[2].expected_digest);
    }
}
