//! Request validation.
//!
//! Every inbound payload is checked here before any store or ledger call.
//! A request that passes is turned into its typed form; nothing downstream
//! re-parses strings.

use chrono::{DateTime, Months, NaiveDate, Utc};

use crate::certificate::{CertificateDetails, CertificateRequest};
use crate::error::ValidationError;
use crate::measurement::{MeasurementInput, MeasurementReadings, MeasurementRequest};
use crate::types::{CertNumber, TestResult};

/// Maximum length of a free-text field.
pub const MAX_TEXT_LEN: usize = 255;

/// Validity period applied when a request omits the expiry date.
pub const DEFAULT_VALIDITY_MONTHS: u32 = 36;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validate a create request.
pub fn validate_certificate_request(
    req: &CertificateRequest,
) -> Result<(CertNumber, CertificateDetails), ValidationError> {
    let cert_number = CertNumber::parse(&req.cert_number)?;
    let details = validate_certificate_details(req)?;
    Ok((cert_number, details))
}

/// Validate the descriptive part of a request, ignoring its cert number.
pub fn validate_certificate_details(
    req: &CertificateRequest,
) -> Result<CertificateDetails, ValidationError> {
    if req.customer_id <= 0 {
        return Err(ValidationError::InvalidCustomerId(req.customer_id));
    }

    let instrument_name = required_text("instrumentName", &req.instrument_name)?;
    let instrument_number = optional_text("instrumentNumber", &req.instrument_number)?;
    let manufacturer = optional_text("manufacturer", &req.manufacturer)?;
    let model_spec = optional_text("modelSpec", &req.model_spec)?;
    let instrument_accuracy = optional_text("instrumentAccuracy", &req.instrument_accuracy)?;

    let test_date = parse_date("testDate", &req.test_date)?;
    let expire_date = match req.expire_date.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => {
            let expire = parse_date("expireDate", s)?;
            if expire < test_date {
                return Err(ValidationError::ExpiryBeforeTestDate {
                    test: req.test_date.clone(),
                    expire: s.to_string(),
                });
            }
            expire
        }
        _ => default_expire_date(test_date).ok_or_else(|| ValidationError::MalformedDate {
            field: "testDate",
            value: req.test_date.clone(),
        })?,
    };

    let test_result: TestResult = req.test_result.parse()?;

    Ok(CertificateDetails {
        customer_id: req.customer_id,
        instrument_name,
        instrument_number,
        manufacturer,
        model_spec,
        instrument_accuracy,
        test_date,
        expire_date,
        test_result,
    })
}

/// `test_date` plus the default validity period.
///
/// Calendar-month arithmetic: Feb 29 lands on Feb 28 three years later.
pub fn default_expire_date(test_date: NaiveDate) -> Option<NaiveDate> {
    test_date.checked_add_months(Months::new(DEFAULT_VALIDITY_MONTHS))
}

/// Validate a single measurement.
pub fn validate_measurement_request(
    req: &MeasurementRequest,
) -> Result<MeasurementInput, ValidationError> {
    let device_addr = required_text("deviceAddr", &req.device_addr)?;
    let test_point = required_text("testPoint", &req.test_point)?;
    let workstation_number = optional_text("workstationNumber", &req.workstation_number)?;
    let data_type = optional_text("dataType", &req.data_type)?;

    let readings = MeasurementReadings {
        actual_percentage: finite("actualPercentage", req.actual_percentage)?,
        ratio_error: finite("ratioError", req.ratio_error)?,
        angle_error: finite("angleError", req.angle_error)?,
        current_value: finite("currentValue", req.current_value)?,
        voltage_value: finite("voltageValue", req.voltage_value)?,
    };

    let test_timestamp = DateTime::parse_from_rfc3339(req.test_timestamp.trim())
        .map_err(|_| ValidationError::MalformedTimestamp {
            field: "testTimestamp",
            value: req.test_timestamp.clone(),
        })?
        .with_timezone(&Utc);

    Ok(MeasurementInput {
        device_addr,
        data_type,
        test_point,
        workstation_number,
        test_timestamp,
        readings,
    })
}

/// Validate a whole batch. The first invalid item rejects the batch.
pub fn validate_measurement_batch(
    reqs: &[MeasurementRequest],
) -> Result<Vec<MeasurementInput>, ValidationError> {
    if reqs.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    reqs.iter().map(validate_measurement_request).collect()
}

fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::MalformedDate {
            field,
            value: value.to_string(),
        }
    })
}

fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let text = optional_text(field, value)?;
    if text.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(text)
}

fn optional_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let text = value.trim();
    if text.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters(field));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_TEXT_LEN,
        });
    }
    Ok(text.to_string())
}

fn finite(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ValidationError::NonFiniteReading(field))
    }
}
