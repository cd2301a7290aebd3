//! In-memory implementation of the CertificateStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::DateTime;

use certchain_core::{
    now_millis, AnchorState, CertNumber, Certificate, Customer, Measurement, NewCustomer,
    NewMeasurement, Page,
};

use crate::error::{Result, StoreError};
use crate::traits::CertificateStore;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// write lock is what makes `create` reject duplicates.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    customers: BTreeMap<i64, Customer>,

    /// Certificates indexed by row id.
    certificates: BTreeMap<i64, Certificate>,

    /// Business key index: cert number -> row id.
    by_number: HashMap<CertNumber, i64>,

    /// Measurements indexed by row id.
    measurements: BTreeMap<i64, Measurement>,

    next_customer_id: i64,
    next_cert_id: i64,
    next_measurement_id: i64,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::InvalidData("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::InvalidData("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn cert_by_number(&self, cert_number: &CertNumber) -> Result<&Certificate> {
        self.by_number
            .get(cert_number)
            .and_then(|id| self.certificates.get(id))
            .ok_or_else(|| StoreError::NotFound(format!("certificate {}", cert_number)))
    }
}

fn newest_first(a: &Certificate, b: &Certificate) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn create(&self, cert: &Certificate) -> Result<Certificate> {
        let mut inner = self.write()?;

        if inner.by_number.contains_key(&cert.cert_number) {
            return Err(StoreError::Duplicate(format!("certificate {}", cert.cert_number)));
        }
        if !inner.customers.contains_key(&cert.details.customer_id) {
            return Err(StoreError::NotFound(format!("customer {}", cert.details.customer_id)));
        }

        inner.next_cert_id += 1;
        let created = Certificate {
            id: inner.next_cert_id,
            ..cert.clone()
        };
        inner.by_number.insert(created.cert_number.clone(), created.id);
        inner.certificates.insert(created.id, created.clone());

        tracing::info!(cert_number = %created.cert_number, id = created.id, "certificate row created");
        Ok(created)
    }

    async fn get_by_number(&self, cert_number: &CertNumber) -> Result<Certificate> {
        let inner = self.read()?;
        inner.cert_by_number(cert_number).cloned()
    }

    async fn list(&self, page: Page) -> Result<(Vec<Certificate>, u64)> {
        let inner = self.read()?;

        let mut all: Vec<&Certificate> = inner.certificates.values().collect();
        all.sort_by(|a, b| newest_first(a, b));

        let rows = all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size() as usize)
            .cloned()
            .collect();
        Ok((rows, inner.certificates.len() as u64))
    }

    async fn update(&self, cert: &Certificate) -> Result<Certificate> {
        let mut inner = self.write()?;

        if !inner.customers.contains_key(&cert.details.customer_id) {
            return Err(StoreError::NotFound(format!("customer {}", cert.details.customer_id)));
        }
        let id = inner.cert_by_number(&cert.cert_number)?.id;
        let existing = inner
            .certificates
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("certificate {}", cert.cert_number)))?;

        existing.details = cert.details.clone();
        existing.status = cert.status;
        existing.anchor_state = cert.anchor_state;
        existing.integrity_digest = cert.integrity_digest.clone();
        existing.ledger_tx_id = cert.ledger_tx_id.clone();
        existing.updated_at = cert.updated_at;

        let updated = existing.clone();
        tracing::info!(
            cert_number = %updated.cert_number,
            status = %updated.status,
            anchor_state = updated.anchor_state.as_str(),
            "certificate row updated"
        );
        Ok(updated)
    }

    async fn delete(&self, cert_number: &CertNumber) -> Result<()> {
        let mut inner = self.write()?;

        let id = inner
            .by_number
            .remove(cert_number)
            .ok_or_else(|| StoreError::NotFound(format!("certificate {}", cert_number)))?;
        inner.certificates.remove(&id);
        inner.measurements.retain(|_, m| m.cert_id != id);

        tracing::info!(cert_number = %cert_number, "certificate row deleted");
        Ok(())
    }

    async fn list_pending_anchor(&self) -> Result<Vec<Certificate>> {
        let inner = self.read()?;
        Ok(inner
            .certificates
            .values()
            .filter(|c| c.anchor_state == AnchorState::Pending)
            .cloned()
            .collect())
    }

    async fn insert_customer(&self, customer: &NewCustomer) -> Result<Customer> {
        let mut inner = self.write()?;

        inner.next_customer_id += 1;
        let now = now_millis();
        let created = Customer {
            id: inner.next_customer_id,
            customer_name: customer.customer_name.clone(),
            customer_address: customer.customer_address.clone(),
            contact_person: customer.contact_person.clone(),
            contact_phone: customer.contact_phone.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.customers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_customer(&self, id: i64) -> Result<Customer> {
        let inner = self.read()?;
        inner
            .customers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("customer {}", id)))
    }

    async fn insert_measurements(
        &self,
        cert_id: i64,
        items: &[NewMeasurement],
    ) -> Result<Vec<Measurement>> {
        let mut inner = self.write()?;

        if !inner.certificates.contains_key(&cert_id) {
            return Err(StoreError::NotFound(format!("certificate id {}", cert_id)));
        }

        let now = now_millis();
        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            let test_timestamp = DateTime::from_timestamp_millis(item.test_timestamp.timestamp_millis())
                .ok_or_else(|| StoreError::InvalidData("test timestamp out of range".into()))?;
            inserted.push(Measurement {
                id: inner.next_measurement_id + inserted.len() as i64 + 1,
                cert_id,
                device_addr: item.device_addr.clone(),
                data_type: item.data_type.clone(),
                test_point: item.test_point.clone(),
                workstation_number: item.workstation_number.clone(),
                test_timestamp,
                encrypted_payload: item.encrypted_payload.clone(),
                anchor_state: AnchorState::Pending,
                ledger_tx_id: None,
                created_at: now,
                decrypted_payload: None,
            });
        }

        // All rows validated; commit them together.
        inner.next_measurement_id += inserted.len() as i64;
        for m in &inserted {
            inner.measurements.insert(m.id, m.clone());
        }

        tracing::info!(cert_id, count = inserted.len(), "measurements stored");
        Ok(inserted)
    }

    async fn list_measurements(&self, cert_id: i64) -> Result<Vec<Measurement>> {
        let inner = self.read()?;
        let mut rows: Vec<Measurement> = inner
            .measurements
            .values()
            .filter(|m| m.cert_id == cert_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.test_timestamp.cmp(&a.test_timestamp).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn list_unanchored_measurements(&self, cert_id: i64) -> Result<Vec<Measurement>> {
        let inner = self.read()?;
        Ok(inner
            .measurements
            .values()
            .filter(|m| m.cert_id == cert_id && m.anchor_state == AnchorState::Pending)
            .cloned()
            .collect())
    }

    async fn mark_measurement_anchored(&self, id: i64, tx_id: Option<&str>) -> Result<()> {
        let mut inner = self.write()?;
        let m = inner
            .measurements
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("measurement {}", id)))?;
        m.anchor_state = AnchorState::Anchored;
        m.ledger_tx_id = tx_id.map(str::to_string);
        Ok(())
    }
}
