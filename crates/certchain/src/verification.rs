//! Certificate verification.
//!
//! A certificate is valid when it is not revoked, not expired, anchored,
//! its stored digest matches its current fields and (by default) its test
//! result is qualified. The ledger snapshot is cross-checked when the row is
//! anchored; an unreachable ledger is reported but does not change the
//! outcome.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use certchain_core::{CertNumber, CertStatus, Certificate, Customer, TestResult};
use certchain_ledger::{LedgerClient, LedgerClientExt};
use certchain_store::{CertificateStore, StoreExt};

use crate::error::Result;

/// Tunable parts of the validity rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerificationPolicy {
    /// An `unqualified` test result makes the certificate invalid.
    pub unqualified_invalidates: bool,
    /// Compare anchored rows against the ledger snapshot.
    pub cross_check_ledger: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            unqualified_invalidates: true,
            cross_check_ledger: true,
        }
    }
}

/// Outcome of comparing the row with the ledger snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerCheck {
    /// Disabled by policy, or skipped because the row is pending.
    NotChecked,
    Consistent,
    /// The ledger has no snapshot for an anchored row.
    Missing,
    /// The ledger snapshot records a different digest.
    Diverged { ledger_digest: String },
    /// Same digest, but the ledger records a different expiry date.
    ExpiryDiverged { ledger_expire_date: NaiveDate },
    /// The ledger snapshot is revoked.
    Revoked,
    Unavailable(String),
}

impl LedgerCheck {
    fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::Missing | Self::Diverged { .. } | Self::ExpiryDiverged { .. }
        )
    }
}

/// The earlier of the local and anchored expiry dates.
fn effective_expiry(cert: &Certificate, ledger: &LedgerCheck) -> NaiveDate {
    match ledger {
        LedgerCheck::ExpiryDiverged { ledger_expire_date } => {
            cert.details.expire_date.min(*ledger_expire_date)
        }
        _ => cert.details.expire_date,
    }
}

/// The single most relevant reason behind a verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Valid,
    NotFound,
    Revoked,
    Expired { on: NaiveDate },
    PendingAnchor,
    IntegrityMismatch,
    Unqualified,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn message(&self) -> String {
        match self {
            Self::Valid => "certificate is valid".to_string(),
            Self::NotFound => "certificate not found".to_string(),
            Self::Revoked => "certificate has been revoked".to_string(),
            Self::Expired { on } => format!("certificate expired on {}", on.format("%Y-%m-%d")),
            Self::PendingAnchor => "certificate is pending ledger anchoring".to_string(),
            Self::IntegrityMismatch => "certificate integrity check failed".to_string(),
            Self::Unqualified => "instrument test result is unqualified".to_string(),
        }
    }
}

/// What the individual checks found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationChecks {
    pub digest_matches: bool,
    pub expired: bool,
    pub pending_anchor: bool,
    pub ledger: LedgerCheck,
}

/// Full verification result, for authenticated callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub cert_number: String,
    pub is_valid: bool,
    pub message: String,
    pub verdict: Verdict,
    pub verified_at: DateTime<Utc>,
    pub certificate: Option<Certificate>,
    pub customer: Option<Customer>,
    pub checks: Option<VerificationChecks>,
}

impl VerificationResult {
    fn not_found(cert_number: &str, now: DateTime<Utc>) -> Self {
        Self {
            cert_number: cert_number.to_string(),
            is_valid: false,
            message: Verdict::NotFound.message(),
            verdict: Verdict::NotFound,
            verified_at: now,
            certificate: None,
            customer: None,
            checks: None,
        }
    }

    /// The public shape: number, validity, message and time only.
    pub fn redacted(&self) -> PublicVerification {
        PublicVerification {
            cert_number: self.cert_number.clone(),
            is_valid: self.is_valid,
            message: self.message.clone(),
            verified_at: self.verified_at,
        }
    }
}

/// Verification result safe to show to anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVerification {
    pub cert_number: String,
    pub is_valid: bool,
    pub message: String,
    pub verified_at: DateTime<Utc>,
}

/// Answers "is this certificate genuine and still valid".
pub struct VerificationEngine<S, L> {
    store: Arc<S>,
    ledger: Arc<L>,
    policy: VerificationPolicy,
}

impl<S: CertificateStore, L: LedgerClient> VerificationEngine<S, L> {
    pub fn new(store: Arc<S>, ledger: Arc<L>, policy: VerificationPolicy) -> Self {
        Self {
            store,
            ledger,
            policy,
        }
    }

    pub fn policy(&self) -> VerificationPolicy {
        self.policy
    }

    pub async fn verify(&self, cert_number: &str) -> Result<VerificationResult> {
        self.verify_at(cert_number, Utc::now()).await
    }

    pub async fn verify_public(&self, cert_number: &str) -> Result<PublicVerification> {
        Ok(self.verify(cert_number).await?.redacted())
    }

    /// Verify as of `now`.
    ///
    /// Unknown or malformed numbers produce a not-found result without a
    /// ledger call. Only store faults are errors.
    pub async fn verify_at(&self, cert_number: &str, now: DateTime<Utc>) -> Result<VerificationResult> {
        let Ok(number) = CertNumber::parse(cert_number) else {
            tracing::debug!(cert_number, "verification of malformed number");
            return Ok(VerificationResult::not_found(cert_number, now));
        };
        let Some(cert) = self.store.find_by_number(&number).await? else {
            tracing::debug!(cert_number = %number, "verification of unknown certificate");
            return Ok(VerificationResult::not_found(cert_number, now));
        };
        let customer = match self.store.get_customer(cert.details.customer_id).await {
            Ok(customer) => Some(customer),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let ledger = self.cross_check(&cert).await;
        let checks = VerificationChecks {
            digest_matches: cert.digest_matches(),
            expired: effective_expiry(&cert, &ledger) <= now.date_naive(),
            pending_anchor: cert.is_pending_anchor(),
            ledger,
        };
        let verdict = self.verdict(&cert, &checks);

        tracing::debug!(
            cert_number = %cert.cert_number,
            valid = verdict.is_valid(),
            verdict = ?verdict,
            "certificate verified"
        );

        Ok(VerificationResult {
            cert_number: cert.cert_number.to_string(),
            is_valid: verdict.is_valid(),
            message: verdict.message(),
            verdict,
            verified_at: now,
            certificate: Some(cert),
            customer,
            checks: Some(checks),
        })
    }

    async fn cross_check(&self, cert: &Certificate) -> LedgerCheck {
        if !self.policy.cross_check_ledger || cert.is_pending_anchor() {
            return LedgerCheck::NotChecked;
        }
        match self.ledger.get_certificate(cert.cert_number.as_str()).await {
            Ok(snapshot) if snapshot.is_revoked() => LedgerCheck::Revoked,
            Ok(snapshot) if snapshot.integrity_digest != cert.compute_digest().to_hex() => {
                LedgerCheck::Diverged {
                    ledger_digest: snapshot.integrity_digest,
                }
            }
            Ok(snapshot) => match NaiveDate::parse_from_str(&snapshot.expire_date, "%Y-%m-%d") {
                Ok(date) if date == cert.details.expire_date => LedgerCheck::Consistent,
                Ok(ledger_expire_date) => {
                    tracing::warn!(
                        cert_number = %cert.cert_number,
                        local = %cert.details.expire_date,
                        ledger = %ledger_expire_date,
                        "expiry date differs from the ledger"
                    );
                    LedgerCheck::ExpiryDiverged { ledger_expire_date }
                }
                Err(_) => LedgerCheck::Diverged {
                    ledger_digest: snapshot.integrity_digest,
                },
            },
            Err(e) if e.is_not_found() => LedgerCheck::Missing,
            Err(e) => {
                tracing::warn!(
                    cert_number = %cert.cert_number,
                    error = %e,
                    "ledger cross-check unavailable"
                );
                LedgerCheck::Unavailable(e.to_string())
            }
        }
    }

    fn verdict(&self, cert: &Certificate, checks: &VerificationChecks) -> Verdict {
        if cert.status == CertStatus::Revoked || checks.ledger == LedgerCheck::Revoked {
            Verdict::Revoked
        } else if checks.expired {
            Verdict::Expired {
                on: effective_expiry(cert, &checks.ledger),
            }
        } else if checks.pending_anchor {
            Verdict::PendingAnchor
        } else if !checks.digest_matches || checks.ledger.is_integrity_failure() {
            Verdict::IntegrityMismatch
        } else if cert.details.test_result == TestResult::Unqualified
            && self.policy.unqualified_invalidates
        {
            Verdict::Unqualified
        } else {
            Verdict::Valid
        }
    }
}
