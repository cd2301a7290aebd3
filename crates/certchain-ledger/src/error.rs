//! Error types for the ledger module.

use thiserror::Error;

use crate::client::ContractFunction;

/// Why the contract refused a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The key is already present.
    AlreadyExists,
    /// The key is absent.
    NotFound,
    /// The arguments could not be parsed or are inconsistent.
    InvalidArgument(String),
    /// The contract has no such function.
    UnknownFunction,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("already exists"),
            Self::NotFound => f.write_str("not found"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::UnknownFunction => f.write_str("unknown function"),
        }
    }
}

/// Errors that can occur during ledger calls.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// Transport-level failure; the call may or may not have been applied.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// No response within the configured bound.
    #[error("ledger call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The contract refused the call.
    #[error("{function} rejected: {reason}")]
    Rejected {
        function: ContractFunction,
        reason: RejectReason,
    },

    /// The response payload could not be decoded.
    #[error("ledger payload decode error: {0}")]
    Decode(String),
}

impl LedgerError {
    pub fn rejected(function: ContractFunction, reason: RejectReason) -> Self {
        Self::Rejected { function, reason }
    }

    /// The contract reported the key as already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                reason: RejectReason::AlreadyExists,
                ..
            }
        )
    }

    /// The contract reported the key as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Rejected {
                reason: RejectReason::NotFound,
                ..
            }
        )
    }

    /// Transport failure or timeout: the outcome of the call is unknown.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
