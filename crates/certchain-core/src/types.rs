//! Strong type definitions for certchain.
//!
//! Identifiers and enumerations are newtypes so that a raw string can never
//! be mistaken for a validated business key or a status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum length of a certificate number.
pub const MAX_CERT_NUMBER_LEN: usize = 64;

/// The business key of a certificate.
///
/// Non-empty, at most [`MAX_CERT_NUMBER_LEN`] characters, drawn from ASCII
/// alphanumerics and `-`, `_`, `.`, `/`. Immutable once a certificate is
/// created.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CertNumber(String);

impl CertNumber {
    /// Parse and validate a certificate number.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let valid = !s.is_empty()
            && s.len() <= MAX_CERT_NUMBER_LEN
            && s
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/'));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidCertNumber(s.to_string()))
        }
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CertNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertNumber({})", self.0)
    }
}

impl fmt::Display for CertNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CertNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CertNumber {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<CertNumber> for String {
    fn from(n: CertNumber) -> Self {
        n.0
    }
}

/// Outcome of the instrument test recorded on a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Qualified,
    Unqualified,
}

impl TestResult {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Qualified => "qualified",
            Self::Unqualified => "unqualified",
        }
    }
}

impl FromStr for TestResult {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qualified" => Ok(Self::Qualified),
            "unqualified" => Ok(Self::Unqualified),
            other => Err(ValidationError::InvalidTestResult(other.to_string())),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business status of a certificate.
///
/// `Draft --(first anchor)--> Created --(revoke)--> Revoked`. Revoked is
/// terminal. Updates keep a created certificate `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    Draft,
    Created,
    Revoked,
}

impl CertStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Created => "created",
            Self::Revoked => "revoked",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "created" => Some(Self::Created),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the latest local state of a record has been recorded on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorState {
    /// Written locally; the ledger has not confirmed this version.
    Pending,
    /// The ledger holds this version.
    Anchored,
}

impl AnchorState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Anchored => "anchored",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "anchored" => Some(Self::Anchored),
            _ => None,
        }
    }
}

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

impl Role {
    /// Whether this role may create, update or revoke certificates and
    /// record measurements.
    pub const fn can_write(&self) -> bool {
        matches!(self, Self::Admin | Self::Operator)
    }
}

/// An authenticated caller, supplied by the surrounding session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    pub const fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Default number of certificates per page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A normalized page request (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: u32,
    size: u32,
}

impl Page {
    /// Normalize raw request parameters.
    ///
    /// Page numbers below 1 become 1. Page sizes below 1 fall back to
    /// [`DEFAULT_PAGE_SIZE`]; sizes above [`MAX_PAGE_SIZE`] are clamped.
    pub fn new(number: i64, size: i64) -> Self {
        let number = if number < 1 {
            1
        } else {
            number.min(u32::MAX as i64) as u32
        };
        let size = if size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            size.min(MAX_PAGE_SIZE as i64) as u32
        };
        Self { number, size }
    }

    pub const fn number(&self) -> u32 {
        self.number
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Number of rows to skip.
    pub const fn offset(&self) -> u64 {
        (self.number as u64 - 1) * self.size as u64
    }

    /// Total number of pages for `total` rows.
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.size as u64)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE as i64)
    }
}

/// Current time at millisecond precision, the resolution the store persists.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
