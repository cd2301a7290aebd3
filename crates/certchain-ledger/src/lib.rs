//! # Certchain Ledger
//!
//! Client boundary for the external certificate ledger.
//!
//! ## Overview
//!
//! The ledger is an append-only, versioned key-value store reached through a
//! contract. Every write is a transaction with an opaque id and a timestamp,
//! and every version of a key stays readable through its history.
//!
//! ## Key Types
//!
//! - [`LedgerClient`] - Raw `invoke`/`query` access to the contract
//! - [`LedgerClientExt`] - One typed helper per [`ContractFunction`]
//! - [`LedgerCertificate`], [`LedgerMeasurement`] - Documents as anchored
//! - [`MemoryLedger`] - In-process ledger with fault injection
//! - [`TimeoutLedger`] - Per-call deadline around any client
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certchain_ledger::{LedgerClientExt, MemoryLedger};
//!
//! async fn example() {
//!     let ledger = MemoryLedger::new();
//!     let history = ledger.get_certificate_history("CERT-0001").await.unwrap();
//!     println!("{} versions", history.len());
//! }
//! ```
//!
//! ## Failure Model
//!
//! - `Rejected` errors carry the contract's reason and never committed
//! - `Unavailable` and `Timeout` leave the outcome unknown; an `invoke` may
//!   have committed anyway
//! - `invoke` is never retried by this crate

pub mod client;
pub mod contract;
pub mod error;
pub mod memory;
pub mod messages;
pub mod timeout;

pub use client::{decode_json, encode_json, ContractFunction, InvokeResponse, LedgerClient, LedgerClientExt};
pub use contract::{ContractState, TxContext};
pub use error::{LedgerError, RejectReason, Result};
pub use memory::{CallKind, MemoryLedger};
pub use messages::{
    chain_test_data_hash, ledger_timestamp, test_data_hash_of, test_data_key, HistoryRecord, LedgerCertificate, LedgerMeasurement,
    QueryResult, TEST_DATA_PREFIX,
};
pub use timeout::TimeoutLedger;
