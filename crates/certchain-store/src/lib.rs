//! # Certchain Store
//!
//! Storage abstraction for certchain. Provides a trait-based interface for
//! the certificate system of record, with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`CertificateStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`StoreExt`] - Optional lookups and full listing on top of the trait
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certchain_core::CertNumber;
//! use certchain_store::{CertificateStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("certchain.db").unwrap();
//!
//!     let number = CertNumber::parse("CERT-0001").unwrap();
//!     let _cert = store.get_by_number(&number).await;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Unique business key**: a second `create` with the same cert number
//!   returns `Duplicate`
//! - **Atomic batches**: measurement batches are written in one transaction
//! - **Ciphertext only**: measurement readings are stored encrypted

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CertificateStore, StoreExt};
