//! Error types for the certificate engine.

use certchain_core::{CertNumber, CipherError, ValidationError};
use certchain_ledger::LedgerError;
use certchain_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Measurement cipher error.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(StoreError),

    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Certificate, customer or measurement not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Certificate number already taken.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Not authorized.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The certificate's current state does not allow the operation.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The local write succeeded but the ledger anchor did not.
    ///
    /// The certificate stays pending until `retry_anchor` succeeds.
    #[error("certificate {cert_number} stored but not anchored: {source}")]
    PartiallyApplied {
        cert_number: CertNumber,
        #[source]
        source: LedgerError,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Duplicate(what) => Self::Duplicate(what),
            other => Self::Store(other),
        }
    }
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The ledger failed after a successful local write.
    pub fn is_partially_applied(&self) -> bool {
        matches!(self, Self::PartiallyApplied { .. })
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_and_duplicate_are_lifted() {
        let err: EngineError = StoreError::NotFound("certificate X".into()).into();
        assert!(matches!(err, EngineError::NotFound(ref m) if m == "certificate X"));

        let err: EngineError = StoreError::Duplicate("certificate X".into()).into();
        assert!(matches!(err, EngineError::Duplicate(_)));

        let err: EngineError = StoreError::InvalidData("bad".into()).into();
        assert!(matches!(err, EngineError::Store(StoreError::InvalidData(_))));
    }
}
