//! Certificate records as delivered by the ingestion collaborator.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::x509::SubjectPublicKeyInfo;

use super::names::{dn_eq, serial_from_bytes};
use crate::error::{PkdError, Result};
use crate::hash::sha256_hex;

/// SHA-256 fingerprint of a certificate's DER encoding (lowercase hex).
pub type Fingerprint = String;

/// Role of a certificate in the ICAO PKI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateType {
    /// Country Signing CA
    Csca,
    /// Document Signer
    Dsc,
    /// Non-conformant Document Signer
    DscNc,
    /// Master List Signer
    Mlsc,
}

impl CertificateType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csca => "CSCA",
            Self::Dsc => "DSC",
            Self::DscNc => "DSC_NC",
            Self::Mlsc => "MLSC",
        }
    }

    /// Whether certificates of this type are expected to be CAs.
    #[must_use]
    pub const fn is_authority(self) -> bool {
        matches!(self, Self::Csca)
    }
}

impl FromStr for CertificateType {
    type Err = PkdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "CSCA" => Ok(Self::Csca),
            "DSC" => Ok(Self::Dsc),
            "DSC_NC" => Ok(Self::DscNc),
            "MLSC" => Ok(Self::Mlsc),
            other => Err(PkdError::Config(format!("unknown certificate type: {other}"))),
        }
    }
}

impl std::fmt::Display for CertificateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived lifecycle status. Never authoritative on its own: recompute with
/// [`Certificate::derive_status`] for every fresh validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Active,
    Expired,
    Revoked,
    NotYetValid,
    Unknown,
}

/// Elliptic curves we recognize in SubjectPublicKeyInfo parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcCurve {
    P256,
    P384,
    /// Any other named curve (brainpool etc.), by dotted OID
    Other(String),
}

impl EcCurve {
    #[must_use]
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            "1.2.840.10045.3.1.7" => Self::P256,
            "1.3.132.0.34" => Self::P384,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Public key algorithm family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    Rsa,
    RsaPss,
    Ec(EcCurve),
    Ed25519,
    /// Unrecognized algorithm, by dotted OID
    Other(String),
}

/// Subject public key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyMaterial {
    /// Key algorithm (and curve for EC keys)
    pub algorithm: KeyAlgorithm,
    /// Full DER SubjectPublicKeyInfo
    #[serde(with = "hex::serde")]
    pub spki_der: Vec<u8>,
    /// Contents of the subjectPublicKey BIT STRING (RSAPublicKey or EC point)
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
}

impl PublicKeyMaterial {
    fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Self {
        let algorithm = match spki.algorithm.algorithm.to_id_string().as_str() {
            "1.2.840.113549.1.1.1" => KeyAlgorithm::Rsa,
            "1.2.840.113549.1.1.10" => KeyAlgorithm::RsaPss,
            "1.2.840.10045.2.1" => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|p| p.as_oid().ok())
                    .map_or_else(
                        || EcCurve::Other("implicit".to_string()),
                        |oid| EcCurve::from_oid(&oid.to_id_string()),
                    );
                KeyAlgorithm::Ec(curve)
            }
            "1.3.101.112" => KeyAlgorithm::Ed25519,
            other => KeyAlgorithm::Other(other.to_string()),
        };

        Self {
            algorithm,
            spki_der: spki.raw.to_vec(),
            key: spki.subject_public_key.data.to_vec(),
        }
    }
}

/// Basic Constraints extension content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicConstraints {
    pub ca: bool,
    pub path_len: Option<u32>,
}

/// The Key Usage bits the ICAO profile cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsage {
    pub digital_signature: bool,
    pub non_repudiation: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

/// A parsed X.509 certificate plus PKD bookkeeping.
///
/// Identity is the SHA-256 fingerprint of the DER encoding; it is computed
/// once in [`Certificate::from_der`] and cannot be reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    fingerprint: Fingerprint,
    #[serde(with = "hex::serde")]
    der: Vec<u8>,
    /// Role in the PKI
    pub cert_type: CertificateType,
    /// Subject distinguished name (RFC 4514-style, encoding order)
    pub subject_dn: String,
    /// Issuer distinguished name
    pub issuer_dn: String,
    /// Serial number, normalized uppercase hex
    pub serial_number: String,
    /// Subject country code (`C` attribute), uppercase
    pub country_code: Option<String>,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Subject public key
    pub public_key: PublicKeyMaterial,
    /// Basic Constraints, if the extension is present
    pub basic_constraints: Option<BasicConstraints>,
    /// Key Usage, if the extension is present
    pub key_usage: Option<KeyUsage>,
    /// Subject Key Identifier (lowercase hex), if the extension is present
    #[serde(default)]
    pub subject_key_identifier: Option<String>,
    /// Stored status (informational; see [`Certificate::derive_status`])
    pub status: CertificateStatus,
    /// Upload / source identifier
    pub upload_id: Option<String>,
    /// Whether the record has been published to LDAP
    pub stored_in_ldap: bool,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(cert_type: CertificateType, der: &[u8]) -> Result<Self> {
        let (_, x509) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| PkdError::CertificateParse(e.to_string()))?;
        Self::from_parsed(cert_type, der, &x509)
    }

    /// Parse a PEM-encoded certificate.
    pub fn from_pem(cert_type: CertificateType, pem_data: &[u8]) -> Result<Self> {
        let block = pem::parse(pem_data).map_err(|e| PkdError::CertificateParse(e.to_string()))?;
        if block.tag() != "CERTIFICATE" {
            return Err(PkdError::CertificateParse(format!(
                "unexpected PEM block: {}",
                block.tag()
            )));
        }
        Self::from_der(cert_type, block.contents())
    }

    /// Parse PEM or DER, detected from the leading bytes.
    pub fn from_bytes(cert_type: CertificateType, data: &[u8]) -> Result<Self> {
        if data.starts_with(b"-----BEGIN") {
            Self::from_pem(cert_type, data)
        } else {
            Self::from_der(cert_type, data)
        }
    }

    fn from_parsed(cert_type: CertificateType, der: &[u8], x509: &X509Certificate<'_>) -> Result<Self> {
        let basic_constraints = x509
            .basic_constraints()
            .map_err(|e| PkdError::CertificateParse(format!("basic constraints: {e}")))?
            .map(|ext| BasicConstraints {
                ca: ext.value.ca,
                path_len: ext.value.path_len_constraint,
            });

        let key_usage = x509
            .key_usage()
            .map_err(|e| PkdError::CertificateParse(format!("key usage: {e}")))?
            .map(|ext| KeyUsage {
                digital_signature: ext.value.digital_signature(),
                non_repudiation: ext.value.non_repudiation(),
                key_cert_sign: ext.value.key_cert_sign(),
                crl_sign: ext.value.crl_sign(),
            });

        let subject_key_identifier = x509.extensions().iter().find_map(|ext| {
            match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(ski) => Some(hex::encode(ski.0)),
                _ => None,
            }
        });

        let country_code = x509
            .subject()
            .iter_country()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_ascii_uppercase);

        let validity = x509.validity();
        let (not_before, not_after) = asn1_to_utc(validity.not_before)
            .zip(asn1_to_utc(validity.not_after))
            .ok_or_else(|| PkdError::CertificateParse("validity out of range".to_string()))?;

        let mut cert = Self {
            fingerprint: sha256_hex(der),
            der: der.to_vec(),
            cert_type,
            subject_dn: x509.subject().to_string(),
            issuer_dn: x509.issuer().to_string(),
            serial_number: serial_from_bytes(x509.raw_serial()),
            country_code,
            not_before,
            not_after,
            public_key: PublicKeyMaterial::from_spki(x509.public_key()),
            basic_constraints,
            key_usage,
            subject_key_identifier,
            status: CertificateStatus::Unknown,
            upload_id: None,
            stored_in_ldap: false,
        };
        cert.status = cert.derive_status(Utc::now(), false);
        Ok(cert)
    }

    /// Attach provenance recorded by the ingestion pipeline.
    #[must_use]
    pub fn with_provenance(mut self, upload_id: impl Into<String>, stored_in_ldap: bool) -> Self {
        self.upload_id = Some(upload_id.into());
        self.stored_in_ldap = stored_in_ldap;
        self
    }

    /// SHA-256 fingerprint (lowercase hex) of the DER encoding.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Raw DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Subject DN equals issuer DN. Says nothing about the signature.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        dn_eq(&self.subject_dn, &self.issuer_dn)
    }

    /// `not_before <= at <= not_after`
    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// Whether the validity window contains `at`, used to rank issuer candidates.
    #[must_use]
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.is_valid_at(at)
    }

    /// Basic Constraints asserts `cA = TRUE`.
    #[must_use]
    pub fn asserts_ca(&self) -> bool {
        self.basic_constraints.is_some_and(|bc| bc.ca)
    }

    /// Recompute the status from the validity window and a revocation verdict.
    #[must_use]
    pub fn derive_status(&self, now: DateTime<Utc>, revoked: bool) -> CertificateStatus {
        if revoked {
            CertificateStatus::Revoked
        } else if now < self.not_before {
            CertificateStatus::NotYetValid
        } else if now > self.not_after {
            CertificateStatus::Expired
        } else {
            CertificateStatus::Active
        }
    }
}

impl std::fmt::Display for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] serial={}", self.subject_dn, self.cert_type, self.serial_number)
    }
}

/// Convert an ASN.1 `GeneralizedTime` / `UTCTime` to `DateTime<Utc>`.
pub(crate) fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(t.timestamp(), 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPki;
    use chrono::Duration;

    #[test]
    fn parses_generated_csca() {
        let pki = TestPki::new("KR");
        let csca = pki.csca();

        assert_eq!(csca.cert_type, CertificateType::Csca);
        assert_eq!(csca.country_code.as_deref(), Some("KR"));
        assert!(csca.is_self_issued());
        assert!(csca.asserts_ca());
        let ku = csca.key_usage.unwrap();
        assert!(ku.key_cert_sign && ku.crl_sign);
        assert_eq!(csca.public_key.algorithm, KeyAlgorithm::Ec(EcCurve::P256));
        assert_eq!(csca.fingerprint().len(), 64);
        assert_eq!(csca.fingerprint(), sha256_hex(csca.der()));
    }

    #[test]
    fn parses_generated_dsc() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x1001);
        assert_eq!(dsc.subject_key_identifier.as_ref().map(String::len), Some(40));
        assert_ne!(dsc.subject_key_identifier, pki.csca().subject_key_identifier);

        assert!(!dsc.is_self_issued());
        assert!(!dsc.asserts_ca());
        assert_eq!(dsc.serial_number, "1001");
        assert!(crate::types::dn_eq(&dsc.issuer_dn, &pki.csca().subject_dn));
        assert!(dsc.key_usage.unwrap().digital_signature);
    }

    #[test]
    fn derive_status_follows_window() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 7);

        assert_eq!(dsc.derive_status(Utc::now(), false), CertificateStatus::Active);
        assert_eq!(dsc.derive_status(Utc::now(), true), CertificateStatus::Revoked);
        assert_eq!(
            dsc.derive_status(dsc.not_after + Duration::days(1), false),
            CertificateStatus::Expired
        );
        assert_eq!(
            dsc.derive_status(dsc.not_before - Duration::days(1), false),
            CertificateStatus::NotYetValid
        );
    }

    #[test]
    fn rejects_garbage() {
        let err = Certificate::from_der(CertificateType::Dsc, b"not a certificate").unwrap_err();
        assert!(matches!(err, PkdError::CertificateParse(_)));
    }

    #[test]
    fn pem_round_trip_keeps_fingerprint() {
        let pki = TestPki::new("KR");
        let csca = pki.csca();
        let pem_text = pem::encode(&pem::Pem::new("CERTIFICATE", csca.der().to_vec()));
        let parsed = Certificate::from_bytes(CertificateType::Csca, pem_text.as_bytes()).unwrap();
        assert_eq!(parsed.fingerprint(), csca.fingerprint());
    }

    #[test]
    fn type_parsing() {
        assert_eq!("dsc_nc".parse::<CertificateType>().unwrap(), CertificateType::DscNc);
        assert_eq!("CSCA".parse::<CertificateType>().unwrap(), CertificateType::Csca);
        assert!("root".parse::<CertificateType>().is_err());
    }
}
