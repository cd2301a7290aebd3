//! Error types for the certchain core.

use thiserror::Error;

/// Validation errors raised before any store or ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid certificate number: {0:?}")]
    InvalidCertNumber(String),

    #[error("malformed date for {field}: {value:?} (expected YYYY-MM-DD)")]
    MalformedDate { field: &'static str, value: String },

    #[error("malformed timestamp for {field}: {value:?} (expected RFC 3339)")]
    MalformedTimestamp { field: &'static str, value: String },

    #[error("invalid test result: {0:?} (expected \"qualified\" or \"unqualified\")")]
    InvalidTestResult(String),

    #[error("required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("field {0} contains control characters")]
    ControlCharacters(&'static str),

    #[error("field {field} exceeds maximum length of {max}")]
    TooLong { field: &'static str, max: usize },

    #[error("reading {0} is not a finite number")]
    NonFiniteReading(&'static str),

    #[error("expire date {expire} is before test date {test}")]
    ExpiryBeforeTestDate { test: String, expire: String },

    #[error("customer id must be positive, got {0}")]
    InvalidCustomerId(i64),

    #[error("measurement payload is malformed: {0}")]
    MalformedPayload(String),

    #[error("measurement batch is empty")]
    EmptyBatch,
}

/// Errors from the measurement cipher.
///
/// None of these are ever swallowed: a caller that receives one must not
/// expose a decrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The ciphertext is not valid hex, or too short to hold nonce and tag.
    #[error("ciphertext decode error: {0}")]
    Decode(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    /// Authentication failed or the plaintext is not UTF-8.
    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("cipher key must be exactly {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },
}
