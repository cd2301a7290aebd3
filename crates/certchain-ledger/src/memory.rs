//! A simple in-memory ledger for testing.
//!
//! Runs the contract handlers against a local [`ContractState`], assigns
//! random transaction ids and non-decreasing timestamps, and supports fault
//! injection so partial-failure paths can be exercised.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::client::{ContractFunction, InvokeResponse, LedgerClient};
use crate::contract::{ContractState, TxContext};
use crate::error::{LedgerError, Result};
use crate::messages::LedgerCertificate;

/// How a recorded call reached the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Invoke,
    Query,
}

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    /// Calls to fail before reaching the contract.
    fail_next: u32,
    /// Transactions to commit but report as failed.
    drop_next_responses: u32,
    latency: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    contract: ContractState,
    last_timestamp: DateTime<Utc>,
    calls: Vec<(CallKind, ContractFunction)>,
    faults: Faults,
}

/// In-memory ledger implementation.
#[derive(Debug)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                contract: ContractState::new(),
                last_timestamp: DateTime::<Utc>::MIN_UTC,
                calls: Vec::new(),
                faults: Faults::default(),
            }),
        }
    }

    /// Lock for a client call. A poisoned lock fails the call.
    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger state lock poisoned".into()))
    }

    /// Lock for test controls and inspection, recovering a poisoned lock.
    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fault injection
    // ─────────────────────────────────────────────────────────────────────────

    /// Take the ledger offline (every call fails with `Unavailable`) or back online.
    pub fn set_available(&self, available: bool) {
        self.state().faults.offline = !available;
    }

    /// Fail the next `n` calls with `Unavailable` before they reach the contract.
    pub fn fail_next(&self, n: u32) {
        self.state().faults.fail_next = n;
    }

    /// Commit the next `n` transactions but report them as lost.
    pub fn drop_next_responses(&self, n: u32) {
        self.state().faults.drop_next_responses = n;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().faults.latency = latency;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<(CallKind, ContractFunction)> {
        self.state().calls.clone()
    }

    pub fn invoke_count(&self) -> usize {
        self.count(CallKind::Invoke)
    }

    pub fn query_count(&self) -> usize {
        self.count(CallKind::Query)
    }

    /// Total number of calls of any kind.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    fn count(&self, kind: CallKind) -> usize {
        self.state().calls.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Current snapshot of a certificate, read directly.
    pub fn snapshot(&self, cert_number: &str) -> Option<LedgerCertificate> {
        self.state().contract.certificate(cert_number)
    }

    /// Number of versions recorded for a key.
    pub fn version_count(&self, key: &str) -> usize {
        self.state().contract.version_count(key)
    }

    /// Overwrite a certificate snapshot outside the contract rules.
    ///
    /// Simulates a write that did not come from this engine. The write is
    /// still versioned.
    pub fn overwrite_certificate(&self, cert: &LedgerCertificate) -> Result<()> {
        let mut inner = self.state();
        let tx = next_tx(&mut inner);
        inner
            .contract
            .put_certificate(cert, &tx)
            .map_err(|reason| LedgerError::Decode(reason.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Call plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Record the call and apply latency.
    async fn admit(&self, kind: CallKind, function: ContractFunction) -> Result<()> {
        let latency = {
            let mut inner = self.lock()?;
            inner.calls.push((kind, function));
            inner.faults.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign a fresh transaction id and a timestamp no earlier than the last one.
fn next_tx(inner: &mut Inner) -> TxContext {
    let mut id = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut id);

    let timestamp = Utc::now().max(inner.last_timestamp);
    inner.last_timestamp = timestamp;

    TxContext {
        tx_id: hex::encode(id),
        timestamp,
    }
}

fn check_faults(faults: &mut Faults) -> Result<()> {
    if faults.offline {
        return Err(LedgerError::Unavailable("ledger offline".into()));
    }
    if faults.fail_next > 0 {
        faults.fail_next -= 1;
        return Err(LedgerError::Unavailable("connection reset".into()));
    }
    Ok(())
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn invoke(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<InvokeResponse> {
        self.admit(CallKind::Invoke, function).await?;

        let mut inner = self.lock()?;
        check_faults(&mut inner.faults)?;

        let tx = next_tx(&mut inner);
        let payload = inner
            .contract
            .execute(function, &args, &tx)
            .map_err(|reason| LedgerError::rejected(function, reason))?;

        if inner.faults.drop_next_responses > 0 {
            inner.faults.drop_next_responses -= 1;
            tracing::debug!(%function, tx_id = %tx.tx_id, "committed, dropping response");
            return Err(LedgerError::Unavailable("response lost after commit".into()));
        }

        tracing::debug!(%function, tx_id = %tx.tx_id, "transaction committed");
        Ok(InvokeResponse {
            tx_id: tx.tx_id,
            payload,
        })
    }

    async fn query(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<Bytes> {
        self.admit(CallKind::Query, function).await?;

        let mut inner = self.lock()?;
        check_faults(&mut inner.faults)?;

        inner
            .contract
            .evaluate(function, &args)
            .map_err(|reason| LedgerError::rejected(function, reason))
    }
}
