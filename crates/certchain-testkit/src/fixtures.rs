//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::path::Path;
use std::sync::Arc;

use certchain::{CertificateEngine, EngineConfig, Result};
use certchain_core::{
    Certificate, CertificateRequest, Customer, MeasurementRequest, NewCustomer, Principal, Role,
};
use certchain_ledger::MemoryLedger;
use certchain_store::{CertificateStore, MemoryStore, SqliteStore};

/// The 16-byte secret used by every fixture engine.
pub const TEST_CIPHER_KEY: &str = "1234567890123456";

pub const ADMIN: Principal = Principal::new(1, Role::Admin);
pub const OPERATOR: Principal = Principal::new(2, Role::Operator);
pub const VIEWER: Principal = Principal::new(3, Role::Viewer);

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Default config with the test cipher key.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.security.cipher_key = Some(TEST_CIPHER_KEY.into());
    config
}

/// An engine over an in-memory ledger with one seeded customer.
///
/// The store and ledger handles are shared with the engine, so tests can
/// inject ledger faults or tamper with rows behind its back.
pub struct TestFixture<S = MemoryStore> {
    pub engine: CertificateEngine<S, MemoryLedger>,
    pub store: Arc<S>,
    pub ledger: Arc<MemoryLedger>,
    pub customer: Customer,
}

impl TestFixture<MemoryStore> {
    /// Fixture over the in-memory store.
    pub async fn new() -> Result<Self> {
        Self::with_store(MemoryStore::new()).await
    }
}

impl TestFixture<SqliteStore> {
    /// Fixture over an SQLite database at `path`.
    pub async fn sqlite(path: &Path) -> Result<Self> {
        Self::with_store(SqliteStore::open(path)?).await
    }
}

impl<S: CertificateStore> TestFixture<S> {
    pub async fn with_store(store: S) -> Result<Self> {
        init_tracing();

        let store = Arc::new(store);
        let ledger = Arc::new(MemoryLedger::new());
        let engine = CertificateEngine::with_shared(&test_config(), store.clone(), ledger.clone())?;
        let customer = store
            .insert_customer(&NewCustomer {
                customer_name: "State Grid Metering Centre".into(),
                contact_person: "Li Wei".into(),
                contact_phone: "13800000000".into(),
                customer_address: "1 Grid Road".into(),
            })
            .await?;

        Ok(Self {
            engine,
            store,
            ledger,
            customer,
        })
    }

    /// A valid create request for the seeded customer.
    ///
    /// Tested 2024-01-10, qualified, default expiry.
    pub fn request(&self, cert_number: &str) -> CertificateRequest {
        CertificateRequest {
            cert_number: cert_number.into(),
            customer_id: self.customer.id,
            instrument_name: "Current transformer".into(),
            instrument_number: "CT-2024-17".into(),
            manufacturer: "Acme Instruments".into(),
            model_spec: "LZZBJ9-10".into(),
            instrument_accuracy: "0.2S".into(),
            test_date: "2024-01-10".into(),
            expire_date: None,
            test_result: "qualified".into(),
        }
    }

    /// Create and anchor a certificate as [`ADMIN`].
    pub async fn issue(&self, cert_number: &str) -> Result<Certificate> {
        self.engine
            .create_certificate(&ADMIN, &self.request(cert_number))
            .await
    }
}

/// `count` valid measurement requests at distinct test points.
pub fn sample_measurements(count: usize) -> Vec<MeasurementRequest> {
    (0..count)
        .map(|i| MeasurementRequest {
            device_addr: "DEV001".into(),
            test_point: format!("{}% rated", 5 + i * 15),
            actual_percentage: 95.0,
            ratio_error: 0.01,
            angle_error: -0.5,
            current_value: 5.0,
            voltage_value: 230.0,
            workstation_number: "WS-01".into(),
            data_type: "ratio".into(),
            test_timestamp: "2024-01-10T08:30:00+08:00".into(),
        })
        .collect()
}
