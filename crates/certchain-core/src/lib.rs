//! # Certchain Core
//!
//! Pure primitives for certchain: calibration certificates, measurement
//! records, the integrity digest and the measurement cipher.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the certificate data model.
//!
//! ## Key Types
//!
//! - [`Certificate`] - A calibration certificate as held by the system of record
//! - [`CertNumber`] - The immutable business key of a certificate
//! - [`Measurement`] - A test data point with its sensitive readings encrypted
//! - [`IntegrityDigest`] - Deterministic SHA-256 over the canonical certificate fields
//! - [`MeasurementCipher`] - Authenticated encryption of measurement readings
//!
//! ## Canonicalization
//!
//! The digest input is a fixed, ordered tuple of fields. See [`digest`] module.

pub mod certificate;
pub mod cipher;
pub mod digest;
pub mod error;
pub mod measurement;
pub mod types;
pub mod validation;

pub use certificate::{
    Certificate, CertificateDetails, CertificateRequest, Customer, NewCustomer,
};
pub use cipher::{CipherKey, MeasurementCipher, CIPHER_KEY_LEN};
pub use digest::{canonical_fields, IntegrityDigest, DIGEST_DOMAIN};
pub use error::{CipherError, ValidationError};
pub use measurement::{
    Measurement, MeasurementInput, MeasurementReadings, MeasurementRequest, NewMeasurement,
};
pub use types::{
    now_millis, AnchorState, CertNumber, CertStatus, Page, Principal, Role, TestResult,
};
pub use validation::{
    default_expire_date, validate_certificate_details, validate_certificate_request,
    validate_measurement_batch, validate_measurement_request,
};
