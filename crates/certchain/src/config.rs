//! Engine configuration.
//!
//! Loaded from a JSON file, then environment overrides are applied:
//!
//! - `CERTCHAIN_CONFIG` - path of the config file when none is given
//! - `CERTCHAIN_DB_PATH` - `database.path`
//! - `CERTCHAIN_CIPHER_KEY` - `security.cipherKey`
//! - `CERTCHAIN_LEDGER_TIMEOUT_MS` - `ledger.timeoutMs`
//!
//! There is no built-in cipher key. A config without one is rejected when
//! the engine is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use certchain_core::{CipherKey, CIPHER_KEY_LEN};

use crate::error::{EngineError, Result};
use crate::verification::VerificationPolicy;

pub const CONFIG_PATH_ENV: &str = "CERTCHAIN_CONFIG";
pub const DB_PATH_ENV: &str = "CERTCHAIN_DB_PATH";
pub const CIPHER_KEY_ENV: &str = "CERTCHAIN_CIPHER_KEY";
pub const LEDGER_TIMEOUT_ENV: &str = "CERTCHAIN_LEDGER_TIMEOUT_MS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub security: SecurityConfig,
    pub verification: VerificationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedgerConfig {
    pub channel_name: String,
    pub contract_name: String,
    /// Upper bound for a single ledger call.
    pub timeout_ms: u64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    /// The 16-byte measurement cipher secret.
    pub cipher_key: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("cipher_key", &self.cipher_key.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("certchain.db"),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            channel_name: "certchannel".to_string(),
            contract_name: "certchaincode".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    /// Parse a config document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::Config(format!("parse config: {}", e)))
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Load from `explicit`, else from `$CERTCHAIN_CONFIG`, else defaults,
    /// then apply environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match std::env::var_os(CONFIG_PATH_ENV) {
                Some(path) => Self::load_from(Path::new(&path))?,
                None => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_ENV) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(key) = lookup(CIPHER_KEY_ENV) {
            self.security.cipher_key = Some(key);
        }
        if let Some(ms) = lookup(LEDGER_TIMEOUT_ENV) {
            self.ledger.timeout_ms = ms.trim().parse().map_err(|_| {
                EngineError::Config(format!("{} must be a number of milliseconds", LEDGER_TIMEOUT_ENV))
            })?;
        }
        Ok(())
    }

    /// The measurement cipher key.
    pub fn cipher_key(&self) -> Result<CipherKey> {
        let raw = self
            .security
            .cipher_key
            .as_deref()
            .ok_or_else(|| EngineError::Config("security.cipherKey is not set".into()))?;
        CipherKey::from_str_key(raw).map_err(|_| {
            EngineError::Config(format!(
                "security.cipherKey must be exactly {} bytes",
                CIPHER_KEY_LEN
            ))
        })
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger.timeout_ms)
    }

    /// Check everything the engine needs up front.
    pub fn validate(&self) -> Result<()> {
        self.cipher_key()?;
        if self.ledger.timeout_ms == 0 {
            return Err(EngineError::Config("ledger.timeoutMs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_have_no_key() {
        let config = EngineConfig::default();
        assert_eq!(config.ledger.channel_name, "certchannel");
        assert_eq!(config.ledger_timeout(), Duration::from_secs(10));
        assert!(matches!(config.cipher_key(), Err(EngineError::Config(_))));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_partial_document() {
        let config = EngineConfig::from_json(
            r#"{
                "database": {"path": "/var/lib/certchain/certs.db"},
                "security": {"cipherKey": "1234567890123456"},
                "verification": {"unqualifiedInvalidates": false}
            }"#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/certchain/certs.db"));
        assert_eq!(config.ledger.contract_name, "certchaincode");
        assert!(!config.verification.unqualified_invalidates);
        assert!(config.verification.cross_check_ledger);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(env(&[
                (DB_PATH_ENV, "/tmp/x.db"),
                (CIPHER_KEY_ENV, "abcdefghijklmnop"),
                (LEDGER_TIMEOUT_ENV, "250"),
            ]))
            .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.ledger_timeout(), Duration::from_millis(250));
        assert!(config.cipher_key().is_ok());

        let err = config.apply_overrides(env(&[(LEDGER_TIMEOUT_ENV, "soon")]));
        assert!(matches!(err, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_wrong_length_key_rejected() {
        let mut config = EngineConfig::default();
        config.security.cipher_key = Some("short".into());
        assert!(matches!(config.cipher_key(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        let mut config = EngineConfig::default();
        config.security.cipher_key = Some("1234567890123456".into());
        assert!(!format!("{:?}", config).contains("1234567890123456"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.database.path, PathBuf::from("certchain.db"));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(EngineConfig::load_from(&path).is_err());
    }
}
