//! # Certchain
//!
//! Certificate integrity and verification engine: calibration certificates
//! held in a relational system of record and anchored to an append-only
//! ledger.
//!
//! ## Overview
//!
//! - **Anchoring**: every issued or changed certificate is committed
//!   locally, then its integrity digest is recorded on the ledger
//! - **Measurements**: sensitive readings are sealed with the measurement
//!   cipher before they are stored or anchored
//! - **Verification**: "is this certificate genuine and still valid",
//!   answered from the store and cross-checked against the ledger
//! - **History**: the ordered ledger versions of a certificate
//!
//! ## Key Concepts
//!
//! - **Pending anchor**: a row whose latest state is not on the ledger yet.
//!   It is visible, reported as not valid, and finished by `retry_anchor`.
//! - **Revocation**: terminal. Anchored certificates are revoked, never
//!   deleted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certchain::{CertificateEngine, EngineConfig};
//! use certchain::core::{CertificateRequest, Principal, Role};
//! use certchain::ledger::MemoryLedger;
//!
//! async fn example() {
//!     let config = EngineConfig::load(None).unwrap();
//!     let engine = CertificateEngine::open(&config, MemoryLedger::new()).unwrap();
//!
//!     let operator = Principal::new(1, Role::Operator);
//!     let request = CertificateRequest {
//!         cert_number: "CERT-0001".into(),
//!         customer_id: 1,
//!         instrument_name: "Current transformer".into(),
//!         test_date: "2024-01-10".into(),
//!         test_result: "qualified".into(),
//!         ..Default::default()
//!     };
//!     engine.create_certificate(&operator, &request).await.unwrap();
//!
//!     let result = engine.verify_public("CERT-0001").await.unwrap();
//!     println!("{}: {}", result.cert_number, result.message);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `certchain::core` - Data model, digest, cipher and validation
//! - `certchain::store` - Storage abstraction and SQLite
//! - `certchain::ledger` - Ledger client boundary and in-memory ledger

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod history;
pub mod measurement;
pub mod reconcile;
pub mod verification;

// Re-export component crates
pub use certchain_core as core;
pub use certchain_ledger as ledger;
pub use certchain_store as store;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use coordinator::{LifecycleCoordinator, RetryReport};
pub use engine::CertificateEngine;
pub use error::{EngineError, Result};
pub use history::{HistoryReader, LedgerEntry};
pub use measurement::{BatchOutcome, MeasurementRecorder, PendingMeasurement};
pub use reconcile::{Divergence, ReconciliationReport, Reconciler, TestDataDivergence};
pub use verification::{
    LedgerCheck, PublicVerification, Verdict, VerificationChecks, VerificationEngine,
    VerificationPolicy, VerificationResult,
};
