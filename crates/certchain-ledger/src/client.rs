//! The ledger client boundary.
//!
//! The ledger is an external append-only, versioned key-value store reached
//! through a contract with named functions. [`LedgerClient`] is the raw
//! `invoke`/`query` surface; [`LedgerClientExt`] layers one typed helper per
//! contract function on top of it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::messages::{HistoryRecord, LedgerCertificate, LedgerMeasurement, QueryResult};

/// A function exposed by the certificate contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractFunction {
    CreateCertificate,
    GetCertificate,
    UpdateCertificate,
    DeleteCertificate,
    AddTestData,
    GetTestDataByCert,
    VerifyCertificate,
    GetCertificateHistory,
    GetAllCertificates,
}

impl ContractFunction {
    pub const ALL: [Self; 9] = [
        Self::CreateCertificate,
        Self::GetCertificate,
        Self::UpdateCertificate,
        Self::DeleteCertificate,
        Self::AddTestData,
        Self::GetTestDataByCert,
        Self::VerifyCertificate,
        Self::GetCertificateHistory,
        Self::GetAllCertificates,
    ];

    /// The function name on the wire.
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::CreateCertificate => "CreateCertificate",
            Self::GetCertificate => "GetCertificate",
            Self::UpdateCertificate => "UpdateCertificate",
            Self::DeleteCertificate => "DeleteCertificate",
            Self::AddTestData => "AddTestData",
            Self::GetTestDataByCert => "GetTestDataByCert",
            Self::VerifyCertificate => "VerifyCertificate",
            Self::GetCertificateHistory => "GetCertificateHistory",
            Self::GetAllCertificates => "GetAllCertificates",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.wire_name() == name)
    }

    /// Whether the function writes to the world state.
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::CreateCertificate
                | Self::UpdateCertificate
                | Self::DeleteCertificate
                | Self::AddTestData
        )
    }
}

impl fmt::Display for ContractFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Result of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResponse {
    /// Opaque transaction id assigned by the ledger.
    pub tx_id: String,
    /// Function return value (may be empty).
    pub payload: Bytes,
}

/// Raw access to the ledger contract.
///
/// Implementations must be thread-safe (Send + Sync). `invoke` is not
/// assumed idempotent: callers must not retry it blindly.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a transaction.
    async fn invoke(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<InvokeResponse>;

    /// Evaluate a read-only function.
    async fn query(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<Bytes>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn invoke(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<InvokeResponse> {
        (**self).invoke(function, args).await
    }

    async fn query(&self, function: ContractFunction, args: Vec<Bytes>) -> Result<Bytes> {
        (**self).query(function, args).await
    }
}

/// Encode a document argument.
pub fn encode_json<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| LedgerError::Decode(format!("encode: {}", e)))
}

/// Decode a document payload.
pub fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| LedgerError::Decode(e.to_string()))
}

/// Decode a list payload; an empty body or `null` is an empty list.
fn decode_list<T: DeserializeOwned>(payload: &[u8]) -> Result<Vec<T>> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let list: Option<Vec<T>> = decode_json(payload)?;
    Ok(list.unwrap_or_default())
}

fn key_arg(key: &str) -> Bytes {
    Bytes::copy_from_slice(key.as_bytes())
}

/// Typed helpers, one per contract function.
pub trait LedgerClientExt: LedgerClient {
    /// Anchor a new certificate snapshot; returns the transaction id.
    fn create_certificate(
        &self,
        cert: &LedgerCertificate,
    ) -> impl Future<Output = Result<String>> + Send;

    fn get_certificate(
        &self,
        cert_number: &str,
    ) -> impl Future<Output = Result<LedgerCertificate>> + Send;

    /// Replace the snapshot of an existing certificate; returns the transaction id.
    fn update_certificate(
        &self,
        cert_number: &str,
        cert: &LedgerCertificate,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Write a tombstone for a certificate; returns the transaction id.
    fn delete_certificate(&self, cert_number: &str)
        -> impl Future<Output = Result<String>> + Send;

    /// Anchor one measurement; returns the transaction id.
    fn add_test_data(
        &self,
        measurement: &LedgerMeasurement,
    ) -> impl Future<Output = Result<String>> + Send;

    fn get_test_data_by_cert(
        &self,
        cert_number: &str,
    ) -> impl Future<Output = Result<Vec<LedgerMeasurement>>> + Send;

    /// Whether the certificate exists on the ledger and is not revoked.
    fn verify_certificate(&self, cert_number: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Every version of a certificate, oldest first.
    fn get_certificate_history(
        &self,
        cert_number: &str,
    ) -> impl Future<Output = Result<Vec<HistoryRecord>>> + Send;

    /// The whole certificate world state.
    fn get_all_certificates(&self) -> impl Future<Output = Result<Vec<QueryResult>>> + Send;
}

impl<L: LedgerClient + ?Sized> LedgerClientExt for L {
    async fn create_certificate(&self, cert: &LedgerCertificate) -> Result<String> {
        let args = vec![encode_json(cert)?];
        let resp = self.invoke(ContractFunction::CreateCertificate, args).await?;
        Ok(resp.tx_id)
    }

    async fn get_certificate(&self, cert_number: &str) -> Result<LedgerCertificate> {
        let payload = self
            .query(ContractFunction::GetCertificate, vec![key_arg(cert_number)])
            .await?;
        decode_json(&payload)
    }

    async fn update_certificate(&self, cert_number: &str, cert: &LedgerCertificate) -> Result<String> {
        let args = vec![key_arg(cert_number), encode_json(cert)?];
        let resp = self.invoke(ContractFunction::UpdateCertificate, args).await?;
        Ok(resp.tx_id)
    }

    async fn delete_certificate(&self, cert_number: &str) -> Result<String> {
        let resp = self
            .invoke(ContractFunction::DeleteCertificate, vec![key_arg(cert_number)])
            .await?;
        Ok(resp.tx_id)
    }

    async fn add_test_data(&self, measurement: &LedgerMeasurement) -> Result<String> {
        let args = vec![encode_json(measurement)?];
        let resp = self.invoke(ContractFunction::AddTestData, args).await?;
        Ok(resp.tx_id)
    }

    async fn get_test_data_by_cert(&self, cert_number: &str) -> Result<Vec<LedgerMeasurement>> {
        let payload = self
            .query(ContractFunction::GetTestDataByCert, vec![key_arg(cert_number)])
            .await?;
        decode_list(&payload)
    }

    async fn verify_certificate(&self, cert_number: &str) -> Result<bool> {
        match self
            .query(ContractFunction::VerifyCertificate, vec![key_arg(cert_number)])
            .await
        {
            Ok(payload) => decode_json(&payload),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_certificate_history(&self, cert_number: &str) -> Result<Vec<HistoryRecord>> {
        let payload = self
            .query(ContractFunction::GetCertificateHistory, vec![key_arg(cert_number)])
            .await?;
        decode_list(&payload)
    }

    async fn get_all_certificates(&self) -> Result<Vec<QueryResult>> {
        let payload = self.query(ContractFunction::GetAllCertificates, Vec::new()).await?;
        decode_list(&payload)
    }
}
