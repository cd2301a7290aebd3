//! # certchain Testkit
//!
//! Testing utilities for certchain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed field tuples with their expected integrity digests
//! - **Generators**: Proptest strategies for certificate fields and measurements
//! - **Fixtures**: An engine wired to an in-memory ledger with fault injection
//!
//! ## Golden Vectors
//!
//! ```rust
//! use certchain_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hex) in verify_all_vectors() {
//!     assert!(matches, "{name}: {hex}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use certchain_testkit::generators::CertificateParams;
//!
//! proptest! {
//!     #[test]
//!     fn digest_is_deterministic(params: CertificateParams) {
//!         prop_assert_eq!(params.digest(), params.digest());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use certchain_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new().await?;
//! fixture.ledger.set_available(false);
//! let err = fixture.issue("CERT-0001").await.unwrap_err();
//! assert!(err.is_partially_applied());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    init_tracing, sample_measurements, test_config, TestFixture, ADMIN, OPERATOR,
    TEST_CIPHER_KEY, VIEWER,
};
pub use generators::CertificateParams;
pub use vectors::{all_vectors, digest_from_vector, verify_all_vectors, GoldenVector};
