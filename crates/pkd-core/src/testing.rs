//! Test fixtures: a throwaway ICAO-style PKI generated with `rcgen`.
//!
//! All keys are ECDSA P-256. Fixture construction panics on failure; it is
//! only compiled for tests and the `test-support` feature.

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    CertificateParams, CertificateRevocationListParams, DistinguishedName, DnType, IsCa,
    KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams, SerialNumber,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use time::OffsetDateTime;

use crate::error::{PkdError, Result};
use crate::repository::{CertificateRepository, CrlRepository};
use crate::types::{Certificate, CertificateRevocationList, CertificateType};

fn to_offset(dt: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(dt.timestamp()).expect("timestamp in range")
}

fn distinguished_name(country: &str, common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, country);
    dn.push(DnType::OrganizationName, "Test Government");
    dn.push(DnType::CommonName, common_name);
    dn
}

fn base_params(
    country: &str,
    common_name: &str,
    serial: u64,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = distinguished_name(country, common_name);
    params.serial_number = Some(SerialNumber::from(serial));
    params.not_before = to_offset(not_before);
    params.not_after = to_offset(not_after);
    params
}

/// A certificate authority (CSCA or link certificate) with its private key.
pub struct Authority {
    country: String,
    key: KeyPair,
    cert: rcgen::Certificate,
    record: Certificate,
}

impl Authority {
    /// Self-signed CSCA valid from yesterday for ten years.
    pub fn root(country: &str, common_name: &str) -> Self {
        let now = Utc::now();
        Self::root_with_validity(
            country,
            common_name,
            now - Duration::days(1),
            now + Duration::days(3650),
        )
    }

    pub fn root_with_validity(
        country: &str,
        common_name: &str,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        let key = KeyPair::generate().expect("generate CSCA key");
        let mut params = base_params(country, common_name, 1, not_before, not_after);
        params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let cert = params.self_signed(&key).expect("self-sign CSCA");
        let record = Certificate::from_der(CertificateType::Csca, cert.der()).expect("parse CSCA");
        Self {
            country: country.to_string(),
            key,
            cert,
            record,
        }
    }

    /// Subordinate CA certificate (link certificate) issued by this authority.
    pub fn issue_authority(&self, common_name: &str, serial: u64) -> Self {
        let now = Utc::now();
        let key = KeyPair::generate().expect("generate CA key");
        let mut params = base_params(
            &self.country,
            common_name,
            serial,
            now - Duration::days(1),
            now + Duration::days(1825),
        );
        params.is_ca = IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .expect("sign CA certificate");
        let record = Certificate::from_der(CertificateType::Csca, cert.der()).expect("parse CA");
        Self {
            country: self.country.clone(),
            key,
            cert,
            record,
        }
    }

    /// Document signer valid from yesterday for one year.
    pub fn issue_signer(&self, cert_type: CertificateType, common_name: &str, serial: u64) -> Signer {
        let now = Utc::now();
        self.issue_signer_with_validity(
            cert_type,
            common_name,
            serial,
            now - Duration::days(1),
            now + Duration::days(365),
        )
    }

    pub fn issue_signer_with_validity(
        &self,
        cert_type: CertificateType,
        common_name: &str,
        serial: u64,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Signer {
        let key = KeyPair::generate().expect("generate signer key");
        let mut params = base_params(&self.country, common_name, serial, not_before, not_after);
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        let cert = params
            .signed_by(&key, &self.cert, &self.key)
            .expect("sign signer certificate");
        let record = Certificate::from_der(cert_type, cert.der()).expect("parse signer");
        Signer {
            pkcs8: key.serialize_der(),
            record,
        }
    }

    /// DER CRL signed by this authority revoking `serials` (key compromise).
    pub fn crl_der(&self, serials: &[u64]) -> Vec<u8> {
        let now = OffsetDateTime::now_utc();
        let params = CertificateRevocationListParams {
            this_update: now - time::Duration::hours(1),
            next_update: now + time::Duration::days(30),
            crl_number: SerialNumber::from(1_u64),
            issuing_distribution_point: None,
            revoked_certs: serials
                .iter()
                .map(|serial| RevokedCertParams {
                    serial_number: SerialNumber::from(*serial),
                    revocation_time: now - time::Duration::minutes(30),
                    reason_code: Some(rcgen::RevocationReason::KeyCompromise),
                    invalidity_date: None,
                })
                .collect(),
            key_identifier_method: KeyIdMethod::Sha256,
        };
        let crl = params
            .signed_by(&self.cert, &self.key)
            .expect("sign CRL");
        crl.der().to_vec()
    }

    /// Parsed CRL record revoking `serials`.
    pub fn crl(&self, serials: &[u64]) -> CertificateRevocationList {
        CertificateRevocationList::from_der(&self.crl_der(serials)).expect("parse CRL")
    }

    pub fn certificate(&self) -> &Certificate {
        &self.record
    }
}

/// A leaf certificate with a PKCS#8 private key able to sign SOD content.
pub struct Signer {
    pkcs8: Vec<u8>,
    record: Certificate,
}

impl Signer {
    pub fn certificate(&self) -> &Certificate {
        &self.record
    }

    /// ECDSA P-256 / SHA-256 signature (DER `Ecdsa-Sig-Value`) over `message`.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.pkcs8, &rng)
            .expect("load signer key");
        key_pair
            .sign(&rng, message)
            .expect("sign message")
            .as_ref()
            .to_vec()
    }
}

/// A country PKI: one CSCA plus helpers for the common fixtures.
pub struct TestPki {
    root: Authority,
}

impl TestPki {
    pub fn new(country: &str) -> Self {
        Self {
            root: Authority::root(country, &format!("CSCA {country}")),
        }
    }

    pub fn root(&self) -> &Authority {
        &self.root
    }

    pub fn csca(&self) -> &Certificate {
        self.root.certificate()
    }

    /// DSC issued by the CSCA.
    pub fn issue_dsc(&self, common_name: &str, serial: u64) -> Certificate {
        self.root
            .issue_signer(CertificateType::Dsc, common_name, serial)
            .record
    }

    pub fn issue_signer(&self, common_name: &str, serial: u64) -> Signer {
        self.root.issue_signer(CertificateType::Dsc, common_name, serial)
    }

    pub fn crl_der(&self, serials: &[u64]) -> Vec<u8> {
        self.root.crl_der(serials)
    }

    pub fn crl(&self, serials: &[u64]) -> CertificateRevocationList {
        self.root.crl(serials)
    }
}

/// Repository whose every lookup fails, for exercising error propagation.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRepository;

impl UnavailableRepository {
    fn fail<T>() -> Result<T> {
        Err(PkdError::repository("connection refused"))
    }
}

impl CertificateRepository for UnavailableRepository {
    fn find_by_fingerprint(&self, _fingerprint: &str) -> Result<Option<Certificate>> {
        Self::fail()
    }

    fn find_by_serial_and_issuer(
        &self,
        _serial: &str,
        _issuer_dn: &str,
    ) -> Result<Option<Certificate>> {
        Self::fail()
    }

    fn find_by_subject_dn(&self, _subject_dn: &str) -> Result<Vec<Certificate>> {
        Self::fail()
    }

    fn find_by_type(&self, _cert_type: CertificateType) -> Result<Vec<Certificate>> {
        Self::fail()
    }

    fn find_by_country(&self, _country_code: &str) -> Result<Vec<Certificate>> {
        Self::fail()
    }

    fn find_by_issuer_dn(&self, _issuer_dn: &str) -> Result<Vec<Certificate>> {
        Self::fail()
    }
}

impl CrlRepository for UnavailableRepository {
    fn find_valid_by_issuer(&self, _issuer_dn: &str) -> Result<Option<CertificateRevocationList>> {
        Self::fail()
    }

    fn find_valid_by_country(
        &self,
        _country_code: &str,
    ) -> Result<Option<CertificateRevocationList>> {
        Self::fail()
    }
}
