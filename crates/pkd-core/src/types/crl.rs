//! Certificate revocation lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::certificate::asn1_to_utc;
use super::names::{normalize_serial, serial_from_bytes};
use crate::error::{PkdError, Result};
use crate::hash::sha256_hex;

/// RFC 5280 CRLReason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    /// Map an RFC 5280 reason code. Code 7 is unassigned and, like any
    /// unknown value, reads as `Unspecified`.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            _ => Self::Unspecified,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CaCompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::RemoveFromCrl => "removeFromCRL",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AaCompromise => "aACompromise",
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One revoked certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    /// Normalized serial number
    pub serial_number: String,
    pub revocation_date: DateTime<Utc>,
    pub reason: Option<RevocationReason>,
}

impl RevocationEntry {
    pub fn new(
        serial_number: &str,
        revocation_date: DateTime<Utc>,
        reason: Option<RevocationReason>,
    ) -> Self {
        Self {
            serial_number: normalize_serial(serial_number),
            revocation_date,
            reason,
        }
    }
}

/// A CRL record.
///
/// `is_valid` is owned by the store: ingesting a newer CRL for the same
/// issuer flips older ones to `false`; they are kept, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRevocationList {
    pub id: String,
    pub issuer_dn: String,
    pub country_code: Option<String>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    /// Revoked entries keyed by normalized serial
    pub entries: BTreeMap<String, RevocationEntry>,
    pub is_valid: bool,
}

impl CertificateRevocationList {
    /// Build a CRL record from already-extracted fields.
    pub fn new(
        id: impl Into<String>,
        issuer_dn: impl Into<String>,
        country_code: Option<String>,
        this_update: DateTime<Utc>,
        next_update: Option<DateTime<Utc>>,
        entries: impl IntoIterator<Item = RevocationEntry>,
    ) -> Self {
        Self {
            id: id.into(),
            issuer_dn: issuer_dn.into(),
            country_code: country_code.map(|c| c.to_ascii_uppercase()),
            this_update,
            next_update,
            entries: entries
                .into_iter()
                .map(|e| (e.serial_number.clone(), e))
                .collect(),
            is_valid: true,
        }
    }

    /// Parse a DER-encoded X.509 CRL. The id is the SHA-256 of the encoding.
    ///
    /// The CRL signature is not checked here; ingestion verifies it before
    /// the record reaches a store.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, crl) =
            x509_parser::parse_x509_crl(der).map_err(|e| PkdError::CrlParse(e.to_string()))?;

        let country_code = crl
            .issuer()
            .iter_country()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_string);

        let out_of_range = || PkdError::CrlParse("time out of range".to_string());
        let this_update = asn1_to_utc(crl.last_update()).ok_or_else(out_of_range)?;
        let next_update = match crl.next_update() {
            Some(t) => Some(asn1_to_utc(t).ok_or_else(out_of_range)?),
            None => None,
        };

        let mut entries = Vec::new();
        for revoked in crl.iter_revoked_certificates() {
            let revocation_date = asn1_to_utc(revoked.revocation_date).ok_or_else(out_of_range)?;
            let reason = revoked
                .reason_code()
                .map(|(_, code)| RevocationReason::from_code(code.0));
            entries.push(RevocationEntry {
                serial_number: serial_from_bytes(revoked.raw_serial()),
                revocation_date,
                reason,
            });
        }

        Ok(Self::new(
            sha256_hex(der),
            crl.issuer().to_string(),
            country_code,
            this_update,
            next_update,
            entries,
        ))
    }

    /// Parse PEM (`X509 CRL`) or DER.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.starts_with(b"-----BEGIN") {
            let block = pem::parse(data).map_err(|e| PkdError::CrlParse(e.to_string()))?;
            Self::from_der(block.contents())
        } else {
            Self::from_der(data)
        }
    }

    /// Look up a serial number (any formatting).
    pub fn find_entry(&self, serial: &str) -> Option<&RevocationEntry> {
        self.entries.get(&normalize_serial(serial))
    }

    /// `nextUpdate` has passed. A CRL without `nextUpdate` never goes stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.next_update.is_some_and(|next| next < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPki;
    use chrono::Duration;

    #[test]
    fn lookup_normalizes_serials() {
        let now = Utc::now();
        let crl = CertificateRevocationList::new(
            "crl-1",
            "C=KR, CN=CSCA",
            Some("kr".into()),
            now,
            Some(now + Duration::days(30)),
            [RevocationEntry::new("00:0A:BC", now, Some(RevocationReason::KeyCompromise))],
        );

        assert_eq!(crl.country_code.as_deref(), Some("KR"));
        assert!(crl.find_entry("abc").is_some());
        assert!(crl.find_entry("0ABC").is_some());
        assert!(crl.find_entry("0ABD").is_none());
        assert!(crl.is_valid);
    }

    #[test]
    fn staleness() {
        let now = Utc::now();
        let mut crl = CertificateRevocationList::new("c", "CN=X", None, now, None, []);
        assert!(!crl.is_stale(now + Duration::days(365)));
        crl.next_update = Some(now + Duration::days(1));
        assert!(!crl.is_stale(now));
        assert!(crl.is_stale(now + Duration::days(2)));
    }

    #[test]
    fn reason_codes() {
        assert_eq!(RevocationReason::from_code(1), RevocationReason::KeyCompromise);
        assert_eq!(RevocationReason::from_code(7), RevocationReason::Unspecified);
        assert_eq!(RevocationReason::from_code(10), RevocationReason::AaCompromise);
        assert_eq!(RevocationReason::Superseded.to_string(), "superseded");
    }

    #[test]
    fn parses_generated_crl() {
        let pki = TestPki::new("KR");
        let der = pki.crl_der(&[0x2001, 0x2002]);
        let crl = CertificateRevocationList::from_der(&der).unwrap();

        assert!(crate::types::dn_eq(&crl.issuer_dn, &pki.csca().subject_dn));
        assert_eq!(crl.country_code.as_deref(), Some("KR"));
        assert_eq!(crl.entries.len(), 2);
        let entry = crl.find_entry("2001").unwrap();
        assert_eq!(entry.reason, Some(RevocationReason::KeyCompromise));
        assert!(crl.next_update.is_some());
        assert_eq!(crl.id, sha256_hex(&der));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            CertificateRevocationList::from_der(&[0x30, 0x03, 0x01]),
            Err(PkdError::CrlParse(_))
        ));
    }
}
