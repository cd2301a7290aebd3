//! Ledger history of a certificate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use certchain_core::CertNumber;
use certchain_ledger::{HistoryRecord, LedgerCertificate, LedgerClient, LedgerClientExt};

use crate::error::Result;

/// One version of a certificate as recorded by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub tx_id: String,
    /// `None` for a tombstone.
    pub snapshot: Option<LedgerCertificate>,
    /// As produced by the ledger.
    pub timestamp: String,
    pub is_delete: bool,
}

impl LedgerEntry {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

impl From<HistoryRecord> for LedgerEntry {
    fn from(record: HistoryRecord) -> Self {
        Self {
            tx_id: record.tx_id,
            snapshot: if record.is_delete { None } else { record.value },
            timestamp: record.timestamp,
            is_delete: record.is_delete,
        }
    }
}

/// Replays certificate history in ledger order, oldest first.
pub struct HistoryReader<L> {
    ledger: Arc<L>,
}

impl<L: LedgerClient> HistoryReader<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Every recorded version, unfiltered and in the order the ledger returns.
    pub async fn history(&self, cert_number: &CertNumber) -> Result<Vec<LedgerEntry>> {
        let records = self
            .ledger
            .get_certificate_history(cert_number.as_str())
            .await?;
        tracing::debug!(cert_number = %cert_number, versions = records.len(), "history read");
        Ok(records.into_iter().map(LedgerEntry::from).collect())
    }
}
