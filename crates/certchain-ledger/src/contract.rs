//! Contract-side handlers.
//!
//! [`ContractState`] is a versioned key-value world state with per-key
//! history, and the certificate contract functions executed against it.
//! It mirrors the deployed contract so the engine can be exercised without
//! a ledger network; [`MemoryLedger`](crate::memory::MemoryLedger) wraps it.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::ContractFunction;
use crate::error::RejectReason;
use crate::messages::{
    chain_test_data_hash, ledger_timestamp, HistoryRecord, LedgerCertificate, LedgerMeasurement, QueryResult,
    TEST_DATA_PREFIX,
};

/// Identity of the transaction being executed.
#[derive(Debug, Clone)]
pub struct TxContext {
    pub tx_id: String,
    pub timestamp: DateTime<Utc>,
}

/// One stored version of a key.
#[derive(Debug, Clone)]
struct Version {
    tx_id: String,
    value: Option<Bytes>,
    timestamp: DateTime<Utc>,
}

type HandlerResult = std::result::Result<Bytes, RejectReason>;

/// World state plus append-only history.
#[derive(Debug, Default)]
pub struct ContractState {
    world: BTreeMap<String, Bytes>,
    history: HashMap<String, Vec<Version>>,
}

impl ContractState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute a function as part of a transaction.
    pub fn execute(
        &mut self,
        function: ContractFunction,
        args: &[Bytes],
        tx: &TxContext,
    ) -> HandlerResult {
        match function {
            ContractFunction::CreateCertificate => self.create_certificate(args, tx),
            ContractFunction::UpdateCertificate => self.update_certificate(args, tx),
            ContractFunction::DeleteCertificate => self.delete_certificate(args, tx),
            ContractFunction::AddTestData => self.add_test_data(args, tx),
            _ => self.evaluate(function, args),
        }
    }

    /// Evaluate a read-only function.
    pub fn evaluate(&self, function: ContractFunction, args: &[Bytes]) -> HandlerResult {
        match function {
            ContractFunction::GetCertificate => self.get_certificate(args),
            ContractFunction::GetTestDataByCert => self.get_test_data_by_cert(args),
            ContractFunction::VerifyCertificate => self.verify_certificate(args),
            ContractFunction::GetCertificateHistory => self.get_certificate_history(args),
            ContractFunction::GetAllCertificates => self.get_all_certificates(),
            write => Err(RejectReason::InvalidArgument(format!(
                "{} must be submitted as a transaction",
                write
            ))),
        }
    }

    /// Number of versions recorded for a key.
    pub fn version_count(&self, key: &str) -> usize {
        self.history.get(key).map_or(0, Vec::len)
    }

    /// Current value of a certificate key.
    pub fn certificate(&self, cert_number: &str) -> Option<LedgerCertificate> {
        self.world
            .get(cert_number)
            .and_then(|raw| serde_json::from_slice(raw).ok())
    }

    /// Write a certificate snapshot verbatim, bypassing the contract rules.
    pub fn put_certificate(
        &mut self,
        cert: &LedgerCertificate,
        tx: &TxContext,
    ) -> std::result::Result<(), RejectReason> {
        let raw = to_bytes(cert)?;
        self.put_state(&cert.cert_number, raw, tx);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State primitives
    // ─────────────────────────────────────────────────────────────────────────

    fn get_state(&self, key: &str) -> Option<&Bytes> {
        self.world.get(key)
    }

    fn put_state(&mut self, key: &str, value: Bytes, tx: &TxContext) {
        self.world.insert(key.to_string(), value.clone());
        self.history.entry(key.to_string()).or_default().push(Version {
            tx_id: tx.tx_id.clone(),
            value: Some(value),
            timestamp: tx.timestamp,
        });
    }

    fn del_state(&mut self, key: &str, tx: &TxContext) {
        self.world.remove(key);
        self.history.entry(key.to_string()).or_default().push(Version {
            tx_id: tx.tx_id.clone(),
            value: None,
            timestamp: tx.timestamp,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    fn create_certificate(&mut self, args: &[Bytes], tx: &TxContext) -> HandlerResult {
        let mut cert: LedgerCertificate = arg_json(args, 0)?;
        if cert.cert_number.is_empty() || cert.cert_number.starts_with(TEST_DATA_PREFIX) {
            return Err(RejectReason::InvalidArgument(format!(
                "invalid certificate key {:?}",
                cert.cert_number
            )));
        }
        if self.get_state(&cert.cert_number).is_some() {
            return Err(RejectReason::AlreadyExists);
        }

        let now = ledger_timestamp(tx.timestamp);
        cert.created_at = now.clone();
        cert.updated_at = now;
        cert.status = "created".into();
        cert.blockchain_tx_id = tx.tx_id.clone();

        let raw = to_bytes(&cert)?;
        self.put_state(&cert.cert_number, raw, tx);
        Ok(Bytes::from(tx.tx_id.clone()))
    }

    fn update_certificate(&mut self, args: &[Bytes], tx: &TxContext) -> HandlerResult {
        let key = arg_str(args, 0)?.to_string();
        let previous: LedgerCertificate = match self.get_state(&key) {
            Some(raw) => from_bytes(raw)?,
            None => return Err(RejectReason::NotFound),
        };

        let mut cert: LedgerCertificate = arg_json(args, 1)?;
        cert.cert_number = key.clone();
        if cert.created_at.is_empty() {
            cert.created_at = previous.created_at;
        }
        cert.test_data_hash = previous.test_data_hash;
        cert.updated_at = ledger_timestamp(tx.timestamp);
        cert.blockchain_tx_id = tx.tx_id.clone();

        self.put_state(&key, to_bytes(&cert)?, tx);
        Ok(Bytes::new())
    }

    fn delete_certificate(&mut self, args: &[Bytes], tx: &TxContext) -> HandlerResult {
        let key = arg_str(args, 0)?.to_string();
        if self.get_state(&key).is_none() {
            return Err(RejectReason::NotFound);
        }
        self.del_state(&key, tx);
        Ok(Bytes::new())
    }

    fn add_test_data(&mut self, args: &[Bytes], tx: &TxContext) -> HandlerResult {
        let mut measurement: LedgerMeasurement = arg_json(args, 0)?;
        let mut cert: LedgerCertificate = match self.get_state(&measurement.cert_number) {
            Some(raw) => from_bytes(raw)?,
            None => return Err(RejectReason::NotFound),
        };
        let key = measurement.key();
        if self.get_state(&key).is_some() {
            return Err(RejectReason::AlreadyExists);
        }

        let now = ledger_timestamp(tx.timestamp);
        measurement.sequence = self.test_data_count(&measurement.cert_number) + 1;
        measurement.anchored_at = now.clone();
        measurement.tx_id = tx.tx_id.clone();
        self.put_state(&key, to_bytes(&measurement)?, tx);

        // The certificate keeps the transaction that last wrote its content.
        cert.test_data_hash = chain_test_data_hash(&cert.test_data_hash, &key, &now);
        cert.updated_at = now;
        let cert_key = cert.cert_number.clone();
        self.put_state(&cert_key, to_bytes(&cert)?, tx);
        Ok(Bytes::new())
    }

    fn test_data_count(&self, cert_number: &str) -> u64 {
        let prefix = format!("{}{}_", TEST_DATA_PREFIX, cert_number);
        self.world
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k[prefix.len()..].parse::<i64>().is_ok())
            .count() as u64
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    fn get_certificate(&self, args: &[Bytes]) -> HandlerResult {
        let key = arg_str(args, 0)?;
        self.get_state(key).cloned().ok_or(RejectReason::NotFound)
    }

    fn get_test_data_by_cert(&self, args: &[Bytes]) -> HandlerResult {
        let cert_number = arg_str(args, 0)?;
        let mut found = Vec::new();
        for (_, raw) in self
            .world
            .range(TEST_DATA_PREFIX.to_string()..)
            .take_while(|(k, _)| k.starts_with(TEST_DATA_PREFIX))
        {
            let m: LedgerMeasurement = from_bytes(raw)?;
            if m.cert_number == cert_number {
                found.push(m);
            }
        }
        found.sort_by_key(|m| m.measurement_id);
        to_bytes(&found)
    }

    fn verify_certificate(&self, args: &[Bytes]) -> HandlerResult {
        let key = arg_str(args, 0)?;
        let cert: LedgerCertificate = match self.get_state(key) {
            Some(raw) => from_bytes(raw)?,
            None => return Err(RejectReason::NotFound),
        };
        to_bytes(&!cert.is_revoked())
    }

    fn get_certificate_history(&self, args: &[Bytes]) -> HandlerResult {
        let key = arg_str(args, 0)?;
        let mut records = Vec::new();
        for version in self.history.get(key).into_iter().flatten() {
            let value = match &version.value {
                Some(raw) => Some(from_bytes::<LedgerCertificate>(raw)?),
                None => None,
            };
            records.push(HistoryRecord {
                tx_id: version.tx_id.clone(),
                is_delete: value.is_none(),
                value,
                timestamp: ledger_timestamp(version.timestamp),
            });
        }
        to_bytes(&records)
    }

    fn get_all_certificates(&self) -> HandlerResult {
        let mut results = Vec::new();
        for (key, raw) in &self.world {
            if key.starts_with(TEST_DATA_PREFIX) {
                continue;
            }
            results.push(QueryResult {
                key: key.clone(),
                record: from_bytes(raw)?,
            });
        }
        to_bytes(&results)
    }
}

fn arg_str(args: &[Bytes], index: usize) -> std::result::Result<&str, RejectReason> {
    let raw = args
        .get(index)
        .ok_or_else(|| RejectReason::InvalidArgument(format!("missing argument {}", index)))?;
    std::str::from_utf8(raw)
        .map_err(|_| RejectReason::InvalidArgument(format!("argument {} is not UTF-8", index)))
}

fn arg_json<T: DeserializeOwned>(
    args: &[Bytes],
    index: usize,
) -> std::result::Result<T, RejectReason> {
    let raw = args
        .get(index)
        .ok_or_else(|| RejectReason::InvalidArgument(format!("missing argument {}", index)))?;
    from_bytes(raw)
}

fn from_bytes<T: DeserializeOwned>(raw: &[u8]) -> std::result::Result<T, RejectReason> {
    serde_json::from_slice(raw).map_err(|e| RejectReason::InvalidArgument(e.to_string()))
}

fn to_bytes<T: Serialize>(value: &T) -> HandlerResult {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| RejectReason::InvalidArgument(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(n: u8) -> TxContext {
        TxContext {
            tx_id: format!("tx-{n}"),
            timestamp: DateTime::from_timestamp(1_700_000_000 + n as i64, 0).unwrap(),
        }
    }

    fn cert(number: &str) -> LedgerCertificate {
        LedgerCertificate {
            cert_number: number.into(),
            customer_id: 1,
            instrument_name: "CT".into(),
            test_date: "2024-01-10".into(),
            expire_date: "2027-01-10".into(),
            test_result: "qualified".into(),
            status: "draft".into(),
            integrity_digest: "ab".repeat(32),
            ..Default::default()
        }
    }

    fn json<T: Serialize>(v: &T) -> Bytes {
        to_bytes(v).unwrap()
    }

    fn key(k: &str) -> Bytes {
        Bytes::copy_from_slice(k.as_bytes())
    }

    #[test]
    fn test_create_sets_contract_fields() {
        let mut state = ContractState::new();
        let out = state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(1))
            .unwrap();
        assert_eq!(&out[..], b"tx-1");

        let stored = state.certificate("C-1").unwrap();
        assert_eq!(stored.status, "created");
        assert_eq!(stored.blockchain_tx_id, "tx-1");
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(!stored.created_at.is_empty());
    }

    #[test]
    fn test_create_rejects_existing_and_reserved_keys() {
        let mut state = ContractState::new();
        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(1))
            .unwrap();
        assert_eq!(
            state.execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(2)),
            Err(RejectReason::AlreadyExists)
        );
        assert!(matches!(
            state.execute(ContractFunction::CreateCertificate, &[json(&cert("TESTDATA_x"))], &tx(3)),
            Err(RejectReason::InvalidArgument(_))
        ));
        assert!(matches!(
            state.execute(ContractFunction::CreateCertificate, &[key("{not json")], &tx(4)),
            Err(RejectReason::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_update_requires_existing_key() {
        let mut state = ContractState::new();
        assert_eq!(
            state.execute(
                ContractFunction::UpdateCertificate,
                &[key("C-1"), json(&cert("C-1"))],
                &tx(1)
            ),
            Err(RejectReason::NotFound)
        );
    }

    #[test]
    fn test_update_keeps_key_and_created_at() {
        let mut state = ContractState::new();
        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(1))
            .unwrap();
        let created_at = state.certificate("C-1").unwrap().created_at;

        let mut next = cert("OTHER");
        next.status = "revoked".into();
        state
            .execute(ContractFunction::UpdateCertificate, &[key("C-1"), json(&next)], &tx(2))
            .unwrap();

        let stored = state.certificate("C-1").unwrap();
        assert_eq!(stored.cert_number, "C-1");
        assert_eq!(stored.created_at, created_at);
        assert_eq!(stored.blockchain_tx_id, "tx-2");
        assert!(stored.is_revoked());
        assert!(state.certificate("OTHER").is_none());
    }

    #[test]
    fn test_history_includes_tombstone() {
        let mut state = ContractState::new();
        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(1))
            .unwrap();
        state
            .execute(ContractFunction::UpdateCertificate, &[key("C-1"), json(&cert("C-1"))], &tx(2))
            .unwrap();
        state
            .execute(ContractFunction::DeleteCertificate, &[key("C-1")], &tx(3))
            .unwrap();

        let raw = state
            .evaluate(ContractFunction::GetCertificateHistory, &[key("C-1")])
            .unwrap();
        let history: Vec<HistoryRecord> = serde_json::from_slice(&raw).unwrap();
        let ids: Vec<_> = history.iter().map(|h| h.tx_id.as_str()).collect();
        assert_eq!(ids, ["tx-1", "tx-2", "tx-3"]);
        assert!(history[2].is_delete);
        assert!(history[2].value.is_none());
        assert_eq!(
            state.evaluate(ContractFunction::GetCertificate, &[key("C-1")]),
            Err(RejectReason::NotFound)
        );
    }

    #[test]
    fn test_test_data_rules() {
        let mut state = ContractState::new();
        let m = LedgerMeasurement {
            cert_number: "C-1".into(),
            measurement_id: 1,
            device_addr: "DEV".into(),
            test_point: "tp".into(),
            test_timestamp: "2024-01-10T00:00:00Z".into(),
            encrypted_data: "00".into(),
            ..Default::default()
        };
        assert_eq!(
            state.execute(ContractFunction::AddTestData, &[json(&m)], &tx(1)),
            Err(RejectReason::NotFound)
        );

        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(2))
            .unwrap();
        state.execute(ContractFunction::AddTestData, &[json(&m)], &tx(3)).unwrap();
        assert_eq!(
            state.execute(ContractFunction::AddTestData, &[json(&m)], &tx(4)),
            Err(RejectReason::AlreadyExists)
        );

        // A certificate whose number extends another's must not leak.
        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1_2"))], &tx(5))
            .unwrap();
        let other = LedgerMeasurement {
            cert_number: "C-1_2".into(),
            ..m.clone()
        };
        state.execute(ContractFunction::AddTestData, &[json(&other)], &tx(6)).unwrap();

        let raw = state
            .evaluate(ContractFunction::GetTestDataByCert, &[key("C-1")])
            .unwrap();
        let listed: Vec<LedgerMeasurement> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].encrypted_data, m.encrypted_data);
        assert_eq!(listed[0].tx_id, "tx-3");
        assert_eq!(listed[0].sequence, 1);

        let raw = state.evaluate(ContractFunction::GetAllCertificates, &[]).unwrap();
        let all: Vec<QueryResult> = serde_json::from_slice(&raw).unwrap();
        let keys: Vec<_> = all.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["C-1", "C-1_2"]);
    }

    #[test]
    fn test_add_test_data_chains_certificate_hash() {
        let mut state = ContractState::new();
        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(1))
            .unwrap();
        let m = |id: i64| LedgerMeasurement {
            cert_number: "C-1".into(),
            measurement_id: id,
            encrypted_data: "00".into(),
            ..Default::default()
        };
        state.execute(ContractFunction::AddTestData, &[json(&m(1))], &tx(2)).unwrap();
        state.execute(ContractFunction::AddTestData, &[json(&m(2))], &tx(3)).unwrap();

        let first = chain_test_data_hash("", "TESTDATA_C-1_1", &ledger_timestamp(tx(2).timestamp));
        let second = chain_test_data_hash(&first, "TESTDATA_C-1_2", &ledger_timestamp(tx(3).timestamp));
        let stored = state.certificate("C-1").unwrap();
        assert_eq!(stored.test_data_hash, second);
        assert_eq!(stored.blockchain_tx_id, "tx-1");
        assert_eq!(stored.updated_at, ledger_timestamp(tx(3).timestamp));
        assert_eq!(state.version_count("C-1"), 3);

        let raw = state
            .evaluate(ContractFunction::GetTestDataByCert, &[key("C-1")])
            .unwrap();
        let listed: Vec<LedgerMeasurement> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(crate::messages::test_data_hash_of(&listed), second);

        // Updates carry the chain forward.
        let mut next = cert("C-1");
        next.test_data_hash = String::new();
        state
            .execute(ContractFunction::UpdateCertificate, &[key("C-1"), json(&next)], &tx(4))
            .unwrap();
        assert_eq!(state.certificate("C-1").unwrap().test_data_hash, second);
    }

    #[test]
    fn test_put_certificate_writes_verbatim() {
        let mut state = ContractState::new();
        let mut forged = cert("C-1");
        forged.blockchain_tx_id = "forged".into();
        state.put_certificate(&forged, &tx(1)).unwrap();
        assert_eq!(state.certificate("C-1"), Some(forged));
        assert_eq!(state.version_count("C-1"), 1);
    }

    #[test]
    fn test_verify_and_query_rules() {
        let mut state = ContractState::new();
        assert_eq!(
            state.evaluate(ContractFunction::VerifyCertificate, &[key("C-1")]),
            Err(RejectReason::NotFound)
        );
        state
            .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(1))
            .unwrap();
        assert_eq!(
            &state
                .evaluate(ContractFunction::VerifyCertificate, &[key("C-1")])
                .unwrap()[..],
            b"true"
        );
        assert!(matches!(
            state.evaluate(ContractFunction::CreateCertificate, &[json(&cert("C-2"))]),
            Err(RejectReason::InvalidArgument(_))
        ));
        assert!(matches!(
            state.evaluate(ContractFunction::GetCertificate, &[]),
            Err(RejectReason::InvalidArgument(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_history_matches_writes(digests in proptest::collection::vec("[0-9a-f]{64}", 0..8)) {
            let mut state = ContractState::new();
            state
                .execute(ContractFunction::CreateCertificate, &[json(&cert("C-1"))], &tx(0))
                .unwrap();
            for (i, digest) in digests.iter().enumerate() {
                let mut next = cert("C-1");
                next.integrity_digest = digest.clone();
                state
                    .execute(
                        ContractFunction::UpdateCertificate,
                        &[key("C-1"), json(&next)],
                        &tx(i as u8 + 1),
                    )
                    .unwrap();
            }

            let raw = state
                .evaluate(ContractFunction::GetCertificateHistory, &[key("C-1")])
                .unwrap();
            let history: Vec<HistoryRecord> = serde_json::from_slice(&raw).unwrap();
            proptest::prop_assert_eq!(history.len(), digests.len() + 1);
            proptest::prop_assert_eq!(state.version_count("C-1"), digests.len() + 1);

            let last = history.last().unwrap().value.as_ref().unwrap();
            let expected = digests.last().cloned().unwrap_or_else(|| "ab".repeat(32));
            proptest::prop_assert_eq!(&last.integrity_digest, &expected);
        }
    }
}
