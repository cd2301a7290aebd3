//! Per-call deadline for ledger clients.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::client::{ContractFunction, InvokeResponse, LedgerClient};
use crate::error::{LedgerError, Result};

/// Wraps a client so every call fails with [`LedgerError::Timeout`] once
/// the deadline passes.
///
/// A timed-out `invoke` may still have committed.
#[derive(Debug, Clone)]
pub struct TimeoutLedger<L> {
    inner: L,
    timeout: Duration,
}

impl<L> TimeoutLedger<L> {
    pub fn new(inner: L, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: LedgerClient> LedgerClient for TimeoutLedger<L> {
    async fn invoke(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<InvokeResponse> {
        match tokio::time::timeout(self.timeout, self.inner.invoke(function, args)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%function, timeout_ms = self.timeout.as_millis() as u64, "ledger invoke timed out");
                Err(LedgerError::Timeout(self.timeout))
            }
        }
    }

    async fn query(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<Bytes> {
        match tokio::time::timeout(self.timeout, self.inner.query(function, args)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%function, timeout_ms = self.timeout.as_millis() as u64, "ledger query timed out");
                Err(LedgerError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LedgerClientExt;
    use crate::memory::MemoryLedger;
    use crate::messages::LedgerCertificate;

    fn cert() -> LedgerCertificate {
        LedgerCertificate {
            cert_number: "C-1".into(),
            customer_id: 1,
            instrument_name: "CT".into(),
            test_date: "2024-01-10".into(),
            expire_date: "2027-01-10".into(),
            test_result: "qualified".into(),
            integrity_digest: "ab".repeat(32),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let ledger = TimeoutLedger::new(MemoryLedger::new(), Duration::from_secs(5));
        let tx = ledger.create_certificate(&cert()).await.unwrap();
        assert_eq!(ledger.get_certificate("C-1").await.unwrap().blockchain_tx_id, tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let inner = MemoryLedger::new();
        inner.set_latency(Some(Duration::from_secs(10)));
        let ledger = TimeoutLedger::new(inner, Duration::from_millis(100));

        let err = ledger.get_certificate("C-1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout(d) if d == Duration::from_millis(100)));
        assert!(err.is_unavailable());
    }
}
