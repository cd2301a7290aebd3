//! Tamper detection and store/ledger reconciliation.

use anyhow::Result;
use chrono::{DateTime, Utc};

use certchain::{LedgerCheck, Verdict};
use certchain_core::CertNumber;
use certchain_store::CertificateStore;
use certchain_testkit::{TestFixture, ADMIN};

fn mid_2024() -> DateTime<Utc> {
    "2024-06-01T00:00:00Z".parse().unwrap()
}

#[tokio::test]
async fn test_tampered_row_detected_locally_and_on_ledger() -> Result<()> {
    let fixture = TestFixture::new().await?;
    let original = fixture.issue("CERT-0001").await?;

    // Edit the row directly, leaving the anchored digest in place.
    let mut tampered = original.clone();
    tampered.details.instrument_name = "Voltage transformer".into();
    fixture.store.update(&tampered).await?;

    let result = fixture.engine.verify_at("CERT-0001", mid_2024()).await?;
    assert!(!result.is_valid);
    assert_eq!(result.verdict, Verdict::IntegrityMismatch);

    let checks = result.checks.unwrap();
    assert!(!checks.digest_matches);
    assert_eq!(
        checks.ledger,
        LedgerCheck::Diverged {
            ledger_digest: original.integrity_digest.unwrap(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_rewritten_digest_still_caught_by_ledger() -> Result<()> {
    let fixture = TestFixture::new().await?;
    let original = fixture.issue("CERT-0001").await?;

    // A tamperer who also recomputes the stored digest fools the local check.
    let mut tampered = original.clone();
    tampered.details.instrument_name = "Voltage transformer".into();
    tampered.integrity_digest = Some(tampered.compute_digest().to_hex());
    fixture.store.update(&tampered).await?;

    let result = fixture.engine.verify_at("CERT-0001", mid_2024()).await?;
    let checks = result.checks.clone().unwrap();
    assert!(checks.digest_matches);
    assert!(matches!(checks.ledger, LedgerCheck::Diverged { .. }));
    assert_eq!(result.verdict, Verdict::IntegrityMismatch);
    Ok(())
}

#[tokio::test]
async fn test_ledger_outage_does_not_change_validity() -> Result<()> {
    let fixture = TestFixture::new().await?;
    fixture.issue("CERT-0001").await?;
    fixture.ledger.set_available(false);

    let result = fixture.engine.verify_at("CERT-0001", mid_2024()).await?;
    assert!(result.is_valid);
    assert!(matches!(
        result.checks.unwrap().ledger,
        LedgerCheck::Unavailable(_)
    ));
    Ok(())
}

#[tokio::test]
async fn test_ledger_revocation_wins() -> Result<()> {
    let fixture = TestFixture::new().await?;
    fixture.issue("CERT-0001").await?;

    let mut snapshot = fixture.ledger.snapshot("CERT-0001").unwrap();
    snapshot.status = "revoked".into();
    fixture.ledger.overwrite_certificate(&snapshot)?;

    let result = fixture.engine.verify_at("CERT-0001", mid_2024()).await?;
    assert_eq!(result.verdict, Verdict::Revoked);
    Ok(())
}

#[tokio::test]
async fn test_reconcile_clean_after_lifecycle() -> Result<()> {
    let fixture = TestFixture::new().await?;
    fixture.issue("CERT-0001").await?;
    fixture.issue("CERT-0002").await?;
    fixture.engine.revoke_certificate(&ADMIN, "CERT-0002").await?;

    let report = fixture.engine.reconcile().await?;
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.matched.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_reconcile_reports_divergence() -> Result<()> {
    let fixture = TestFixture::new().await?;
    let cert = fixture.issue("CERT-0001").await?;
    fixture.issue("CERT-0002").await?;

    let mut tampered = cert.clone();
    tampered.details.instrument_name = "Edited".into();
    fixture.store.update(&tampered).await?;

    fixture.ledger.set_available(false);
    assert!(fixture.issue("CERT-0003").await.is_err());
    fixture.ledger.set_available(true);

    let report = fixture.engine.reconcile().await?;
    assert!(!report.is_clean());
    assert_eq!(report.matched, [CertNumber::parse("CERT-0002")?]);
    assert_eq!(report.pending, [CertNumber::parse("CERT-0003")?]);
    assert_eq!(report.diverged.len(), 1);
    assert_eq!(report.diverged[0].ledger_digest, cert.integrity_digest.unwrap());
    Ok(())
}
