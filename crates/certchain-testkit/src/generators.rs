//! Proptest generators for property-based testing.

use chrono::NaiveDate;
use proptest::prelude::*;

use certchain_core::{
    CertificateRequest, IntegrityDigest, MeasurementReadings, MeasurementRequest, TestResult,
};

/// Generate a valid certificate number.
pub fn cert_number() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9._/-]{0,31}".prop_map(String::from)
}

/// Generate an instrument name without surrounding whitespace.
pub fn instrument_name() -> impl Strategy<Value = String> {
    "[A-Za-z]([A-Za-z0-9 ]{0,38}[A-Za-z0-9])?".prop_map(String::from)
}

/// Generate a test date between 2000 and 2049.
pub fn test_date() -> impl Strategy<Value = NaiveDate> {
    (2000i32..2050, 1u32..=12, 1u32..=28)
        .prop_filter_map("valid date", |(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
}

pub fn test_result() -> impl Strategy<Value = TestResult> {
    prop_oneof![Just(TestResult::Qualified), Just(TestResult::Unqualified)]
}

/// Finite readings of realistic magnitude.
pub fn readings() -> impl Strategy<Value = MeasurementReadings> {
    (
        0.0f64..200.0,
        -5.0f64..5.0,
        -60.0f64..60.0,
        0.0f64..1000.0,
        0.0f64..100_000.0,
    )
        .prop_map(
            |(actual_percentage, ratio_error, angle_error, current_value, voltage_value)| {
                MeasurementReadings {
                    actual_percentage,
                    ratio_error,
                    angle_error,
                    current_value,
                    voltage_value,
                }
            },
        )
}

/// Generate a valid measurement request.
pub fn measurement_request() -> impl Strategy<Value = MeasurementRequest> {
    ("[A-Z]{3}[0-9]{3}", 1u32..=120, readings(), 0i64..1_800_000_000).prop_map(
        |(device_addr, point, r, secs)| MeasurementRequest {
            device_addr,
            test_point: format!("{point}% rated"),
            actual_percentage: r.actual_percentage,
            ratio_error: r.ratio_error,
            angle_error: r.angle_error,
            current_value: r.current_value,
            voltage_value: r.voltage_value,
            workstation_number: "WS-01".into(),
            data_type: "ratio".into(),
            test_timestamp: chrono::DateTime::from_timestamp(secs, 0)
                .unwrap_or_default()
                .to_rfc3339(),
        },
    )
}

/// The digested fields of a certificate.
#[derive(Debug, Clone)]
pub struct CertificateParams {
    pub cert_number: String,
    pub customer_id: i64,
    pub instrument_name: String,
    pub test_date: NaiveDate,
    pub test_result: TestResult,
}

impl CertificateParams {
    pub fn digest(&self) -> IntegrityDigest {
        IntegrityDigest::from_fields(
            &self.cert_number,
            self.customer_id,
            &self.instrument_name,
            self.test_date,
            self.test_result,
        )
    }

    /// A create request carrying these fields and a default expiry.
    pub fn to_request(&self) -> CertificateRequest {
        CertificateRequest {
            cert_number: self.cert_number.clone(),
            customer_id: self.customer_id,
            instrument_name: self.instrument_name.clone(),
            test_date: self.test_date.format("%Y-%m-%d").to_string(),
            test_result: self.test_result.as_str().into(),
            ..Default::default()
        }
    }
}

impl Arbitrary for CertificateParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            cert_number(),
            1i64..=1_000_000,
            instrument_name(),
            test_date(),
            test_result(),
        )
            .prop_map(
                |(cert_number, customer_id, instrument_name, test_date, test_result)| {
                    CertificateParams {
                        cert_number,
                        customer_id,
                        instrument_name,
                        test_date,
                        test_result,
                    }
                },
            )
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::{
        validate_certificate_request, validate_measurement_request, CipherKey, MeasurementCipher,
    };

    fn cipher() -> MeasurementCipher {
        MeasurementCipher::new(&CipherKey::from_str_key("1234567890123456").unwrap())
    }

    proptest! {
        #[test]
        fn test_generated_requests_validate(params: CertificateParams) {
            let (number, details) = validate_certificate_request(&params.to_request()).unwrap();
            prop_assert_eq!(number.as_str(), params.cert_number.as_str());
            prop_assert!(details.expire_date > details.test_date);
        }

        #[test]
        fn test_digest_deterministic(params: CertificateParams) {
            prop_assert_eq!(params.digest(), params.digest());
            prop_assert_eq!(params.digest().to_hex().len(), 64);
        }

        #[test]
        fn test_digest_sensitive_to_each_field(params: CertificateParams) {
            let base = params.digest();

            let mut other = params.clone();
            other.customer_id += 1;
            prop_assert_ne!(other.digest(), base);

            let mut other = params.clone();
            other.instrument_name.push('x');
            prop_assert_ne!(other.digest(), base);

            let mut other = params.clone();
            other.test_date = other.test_date.succ_opt().unwrap();
            prop_assert_ne!(other.digest(), base);

            let mut other = params.clone();
            other.test_result = match params.test_result {
                TestResult::Qualified => TestResult::Unqualified,
                TestResult::Unqualified => TestResult::Qualified,
            };
            prop_assert_ne!(other.digest(), base);
        }

        #[test]
        fn test_cipher_round_trip(plaintext in ".*") {
            let cipher = cipher();
            let sealed = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
        }

        #[test]
        fn test_readings_payload_round_trip(readings in readings()) {
            let payload = readings.to_payload();
            let parsed = MeasurementReadings::from_payload(&payload).unwrap();
            prop_assert_eq!(parsed.to_payload(), payload);
        }

        #[test]
        fn test_generated_measurements_validate(req in measurement_request()) {
            prop_assert!(validate_measurement_request(&req).is_ok());
        }
    }
}
