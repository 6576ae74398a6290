//! Read-only lookup capabilities consumed by the validation core.
//!
//! Implementations are owned by the persistence layer. Any failure to answer
//! is reported as [`PkdError::Repository`](crate::PkdError::Repository) and
//! propagates unchanged to the caller.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{Certificate, CertificateRevocationList, CertificateType};

/// Certificate lookups (synchronous).
pub trait CertificateRepository: Send + Sync {
    /// Exact lookup by SHA-256 fingerprint
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Certificate>>;

    /// Lookup by (serial, issuer DN), the CMS `IssuerAndSerialNumber` key
    fn find_by_serial_and_issuer(&self, serial: &str, issuer_dn: &str)
        -> Result<Option<Certificate>>;

    /// All certificates with the given subject DN (issuer candidates)
    fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Vec<Certificate>>;

    fn find_by_type(&self, cert_type: CertificateType) -> Result<Vec<Certificate>>;

    fn find_by_country(&self, country_code: &str) -> Result<Vec<Certificate>>;

    /// All certificates issued under the given DN
    fn find_by_issuer_dn(&self, issuer_dn: &str) -> Result<Vec<Certificate>>;

    /// Certificates of one type for one country.
    fn find_by_country_and_type(
        &self,
        country_code: &str,
        cert_type: CertificateType,
    ) -> Result<Vec<Certificate>> {
        Ok(self
            .find_by_country(country_code)?
            .into_iter()
            .filter(|c| c.cert_type == cert_type)
            .collect())
    }
}

/// CRL lookups. Only CRLs flagged valid are ever returned.
pub trait CrlRepository: Send + Sync {
    /// The CRL currently flagged valid for an issuer
    fn find_valid_by_issuer(&self, issuer_dn: &str) -> Result<Option<CertificateRevocationList>>;

    /// The most recent valid CRL for a country
    fn find_valid_by_country(&self, country_code: &str)
        -> Result<Option<CertificateRevocationList>>;
}

impl<T: CertificateRepository + ?Sized> CertificateRepository for Arc<T> {
    fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Certificate>> {
        (**self).find_by_fingerprint(fingerprint)
    }

    fn find_by_serial_and_issuer(
        &self,
        serial: &str,
        issuer_dn: &str,
    ) -> Result<Option<Certificate>> {
        (**self).find_by_serial_and_issuer(serial, issuer_dn)
    }

    fn find_by_subject_dn(&self, subject_dn: &str) -> Result<Vec<Certificate>> {
        (**self).find_by_subject_dn(subject_dn)
    }

    fn find_by_type(&self, cert_type: CertificateType) -> Result<Vec<Certificate>> {
        (**self).find_by_type(cert_type)
    }

    fn find_by_country(&self, country_code: &str) -> Result<Vec<Certificate>> {
        (**self).find_by_country(country_code)
    }

    fn find_by_issuer_dn(&self, issuer_dn: &str) -> Result<Vec<Certificate>> {
        (**self).find_by_issuer_dn(issuer_dn)
    }
}

impl<T: CrlRepository + ?Sized> CrlRepository for Arc<T> {
    fn find_valid_by_issuer(&self, issuer_dn: &str) -> Result<Option<CertificateRevocationList>> {
        (**self).find_valid_by_issuer(issuer_dn)
    }

    fn find_valid_by_country(
        &self,
        country_code: &str,
    ) -> Result<Option<CertificateRevocationList>> {
        (**self).find_valid_by_country(country_code)
    }
}
