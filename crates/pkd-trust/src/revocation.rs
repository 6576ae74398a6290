//! CRL-based revocation checking.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pkd_core::{Certificate, CertificateRevocationList, CrlRepository, Result, RevocationReason};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// State of the CRL a check was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrlStatus {
    /// No applicable CRL; the certificate was not checked
    NotAvailable,
    /// CRL within its update window
    Current,
    /// CRL past its `nextUpdate`; still consulted
    Stale,
}

/// Which lookup produced the CRL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrlSource {
    Issuer,
    Country,
}

/// Detail of the CRL consulted and, when revoked, of the matching entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationDetails {
    pub serial_number: String,
    pub crl_id: String,
    pub crl_issuer: String,
    pub crl_source: CrlSource,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    pub revocation_date: Option<DateTime<Utc>>,
    pub reason: Option<RevocationReason>,
}

/// Outcome of a revocation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationCheck {
    pub revoked: bool,
    /// A CRL was found and consulted
    pub checked: bool,
    pub crl_status: CrlStatus,
    pub details: Option<RevocationDetails>,
}

impl RevocationCheck {
    /// No CRL applies. Not a revocation.
    #[must_use]
    pub const fn not_checked() -> Self {
        Self {
            revoked: false,
            checked: false,
            crl_status: CrlStatus::NotAvailable,
            details: None,
        }
    }
}

/// Looks up the valid CRL for a certificate's issuer. Never writes.
pub struct RevocationChecker {
    crls: Arc<dyn CrlRepository>,
    country_fallback: bool,
}

impl RevocationChecker {
    pub fn new(crls: Arc<dyn CrlRepository>, country_fallback: bool) -> Self {
        Self {
            crls,
            country_fallback,
        }
    }

    pub fn is_revoked(&self, cert: &Certificate) -> Result<RevocationCheck> {
        self.is_revoked_at(cert, Utc::now())
    }

    /// Issuer-scoped CRL first; the country's CRL only when the issuer has none.
    pub fn is_revoked_at(&self, cert: &Certificate, now: DateTime<Utc>) -> Result<RevocationCheck> {
        let Some((crl, source)) = self.find_crl(cert)? else {
            debug!(
                subject = %cert.subject_dn,
                issuer = %cert.issuer_dn,
                "no CRL available, revocation not checked"
            );
            return Ok(RevocationCheck::not_checked());
        };

        let crl_status = if crl.is_stale(now) {
            warn!(crl_id = %crl.id, issuer = %crl.issuer_dn, "consulting stale CRL");
            CrlStatus::Stale
        } else {
            CrlStatus::Current
        };

        let entry = crl.find_entry(&cert.serial_number);
        if let Some(entry) = entry {
            warn!(
                subject = %cert.subject_dn,
                serial = %cert.serial_number,
                crl_id = %crl.id,
                "certificate revoked"
            );
        }

        Ok(RevocationCheck {
            revoked: entry.is_some(),
            checked: true,
            crl_status,
            details: Some(RevocationDetails {
                serial_number: cert.serial_number.clone(),
                crl_id: crl.id.clone(),
                crl_issuer: crl.issuer_dn.clone(),
                crl_source: source,
                this_update: crl.this_update,
                next_update: crl.next_update,
                revocation_date: entry.map(|e| e.revocation_date),
                reason: entry.and_then(|e| e.reason),
            }),
        })
    }

    fn find_crl(&self, cert: &Certificate) -> Result<Option<(CertificateRevocationList, CrlSource)>> {
        if let Some(crl) = self.crls.find_valid_by_issuer(&cert.issuer_dn)? {
            return Ok(Some((crl, CrlSource::Issuer)));
        }
        if !self.country_fallback {
            return Ok(None);
        }
        let Some(country) = cert.country_code.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .crls
            .find_valid_by_country(country)?
            .map(|crl| (crl, CrlSource::Country)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pkd_core::testing::{TestPki, UnavailableRepository};
    use pkd_core::{InMemoryCrlStore, PkdError, RevocationEntry};

    fn crl_for(issuer: &str, country: &str, serials: &[&str], next_in_days: i64) -> CertificateRevocationList {
        let now = Utc::now();
        CertificateRevocationList::new(
            format!("crl-{issuer}-{next_in_days}"),
            issuer,
            Some(country.to_string()),
            now - Duration::days(1),
            Some(now + Duration::days(next_in_days)),
            serials
                .iter()
                .map(|s| RevocationEntry::new(s, now - Duration::hours(2), Some(RevocationReason::Superseded))),
        )
    }

    #[test]
    fn missing_crl_is_not_revocation() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let checker = RevocationChecker::new(Arc::new(InMemoryCrlStore::new()), true);

        let check = checker.is_revoked(&dsc).unwrap();
        assert_eq!(check, RevocationCheck::not_checked());
    }

    #[test]
    fn listed_serial_is_revoked() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let store = InMemoryCrlStore::new();
        store.ingest(pki.crl(&[0x10]));
        let checker = RevocationChecker::new(Arc::new(store), true);

        let check = checker.is_revoked(&dsc).unwrap();
        assert!(check.revoked && check.checked);
        assert_eq!(check.crl_status, CrlStatus::Current);
        let details = check.details.unwrap();
        assert_eq!(details.crl_source, CrlSource::Issuer);
        assert_eq!(details.reason, Some(RevocationReason::KeyCompromise));
        assert!(details.revocation_date.is_some());
    }

    #[test]
    fn unlisted_serial_is_checked_not_revoked() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x11);
        let store = InMemoryCrlStore::new();
        store.ingest(pki.crl(&[0x10]));
        let check = RevocationChecker::new(Arc::new(store), true)
            .is_revoked(&dsc)
            .unwrap();
        assert!(check.checked);
        assert!(!check.revoked);
        assert!(check.details.unwrap().revocation_date.is_none());
    }

    #[test]
    fn country_fallback_only_when_enabled() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let store = Arc::new(InMemoryCrlStore::new());
        store.ingest(crl_for("C=KR, CN=Other CSCA", "KR", &["10"], 30));

        let with = RevocationChecker::new(store.clone(), true).is_revoked(&dsc).unwrap();
        assert!(with.revoked);
        assert_eq!(with.details.unwrap().crl_source, CrlSource::Country);

        let without = RevocationChecker::new(store, false).is_revoked(&dsc).unwrap();
        assert!(!without.checked);
    }

    #[test]
    fn issuer_crl_takes_precedence() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let store = InMemoryCrlStore::new();
        store.ingest(crl_for("C=KR, CN=Other CSCA", "KR", &["10"], 30));
        store.ingest(crl_for(&dsc.issuer_dn, "KR", &[], 30));

        let check = RevocationChecker::new(Arc::new(store), true).is_revoked(&dsc).unwrap();
        assert!(check.checked);
        assert!(!check.revoked);
        assert_eq!(check.details.unwrap().crl_source, CrlSource::Issuer);
    }

    #[test]
    fn invalidated_crl_is_ignored() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let store = InMemoryCrlStore::new();
        store.ingest(crl_for(&dsc.issuer_dn, "KR", &["10"], 30));
        store.ingest(crl_for(&dsc.issuer_dn, "KR", &[], 31));

        assert_eq!(store.valid_count_for_issuer(&dsc.issuer_dn), 1);
        let check = RevocationChecker::new(Arc::new(store), false).is_revoked(&dsc).unwrap();
        assert!(check.checked);
        assert!(!check.revoked);
    }

    #[test]
    fn stale_crl_still_consulted() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let store = InMemoryCrlStore::new();
        store.ingest(crl_for(&dsc.issuer_dn, "KR", &["10"], -1));
        let check = RevocationChecker::new(Arc::new(store), true).is_revoked(&dsc).unwrap();
        assert!(check.revoked);
        assert_eq!(check.crl_status, CrlStatus::Stale);
    }

    #[test]
    fn repository_failure_propagates() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x10);
        let err = RevocationChecker::new(Arc::new(UnavailableRepository), true)
            .is_revoked(&dsc)
            .unwrap_err();
        assert!(matches!(err, PkdError::Repository(_)));
    }
}
