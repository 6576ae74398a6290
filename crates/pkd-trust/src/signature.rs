//! Signature verification capability.
//!
//! Certificate signatures go through `x509-parser`'s `verify` feature, except
//! RSASSA-PSS which it does not cover. PSS certificates and raw CMS
//! signatures are checked with `ring` directly.

use pkd_core::{Certificate, DigestAlgorithm, EcCurve, KeyAlgorithm, PkdError, PublicKeyMaterial, Result};
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use serde::{Deserialize, Serialize};
use tracing::debug;
use x509_parser::error::X509Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use x509_parser::signature_algorithm::{RsaSsaPssParams, SignatureAlgorithm as X509SignatureAlgorithm};
use x509_parser::x509::SubjectPublicKeyInfo;

/// id-RSASSA-PSS
const RSASSA_PSS: &str = "1.2.840.113549.1.1.10";
/// id-mgf1
const MGF1: &str = "1.2.840.113549.1.1.8";

/// Signature scheme of a CMS `SignerInfo`, paired with its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5
    RsaPkcs1(DigestAlgorithm),
    /// RSASSA-PSS (MGF1 with the same digest)
    RsaPss(DigestAlgorithm),
    /// ECDSA, DER-encoded `Ecdsa-Sig-Value`
    Ecdsa(DigestAlgorithm),
}

impl SignatureAlgorithm {
    /// Resolve a `signatureAlgorithm` OID.
    ///
    /// Bare key OIDs (`rsaEncryption`, `id-ecPublicKey`) and RSASSA-PSS take
    /// their hash from `digest`, the SignerInfo's `digestAlgorithm`.
    pub fn from_oid(oid: &str, digest: DigestAlgorithm) -> Result<Self> {
        use DigestAlgorithm::{Sha1, Sha224, Sha256, Sha384, Sha512};

        let alg = match oid {
            "1.2.840.113549.1.1.1" => Self::RsaPkcs1(digest),
            "1.2.840.113549.1.1.5" => Self::RsaPkcs1(Sha1),
            "1.2.840.113549.1.1.14" => Self::RsaPkcs1(Sha224),
            "1.2.840.113549.1.1.11" => Self::RsaPkcs1(Sha256),
            "1.2.840.113549.1.1.12" => Self::RsaPkcs1(Sha384),
            "1.2.840.113549.1.1.13" => Self::RsaPkcs1(Sha512),
            "1.2.840.113549.1.1.10" => Self::RsaPss(digest),
            "1.2.840.10045.2.1" => Self::Ecdsa(digest),
            "1.2.840.10045.4.1" => Self::Ecdsa(Sha1),
            "1.2.840.10045.4.3.1" => Self::Ecdsa(Sha224),
            "1.2.840.10045.4.3.2" => Self::Ecdsa(Sha256),
            "1.2.840.10045.4.3.3" => Self::Ecdsa(Sha384),
            "1.2.840.10045.4.3.4" => Self::Ecdsa(Sha512),
            other => {
                return Err(PkdError::UnsupportedAlgorithm(format!(
                    "signature algorithm {other}"
                )))
            }
        };
        Ok(alg)
    }

    #[must_use]
    pub const fn digest(self) -> DigestAlgorithm {
        match self {
            Self::RsaPkcs1(d) | Self::RsaPss(d) | Self::Ecdsa(d) => d,
        }
    }

    /// Conventional name, e.g. `SHA256withECDSA`.
    #[must_use]
    pub fn name(self) -> String {
        let digest = self.digest().name().replace('-', "");
        match self {
            Self::RsaPkcs1(_) => format!("{digest}withRSA"),
            Self::RsaPss(_) => format!("{digest}withRSA/PSS"),
            Self::Ecdsa(_) => format!("{digest}withECDSA"),
        }
    }

    fn ring_algorithm(self, key: &PublicKeyMaterial) -> Result<&'static dyn VerificationAlgorithm> {
        use DigestAlgorithm::{Sha1, Sha256, Sha384, Sha512};

        let alg: &'static dyn VerificationAlgorithm = match (self, &key.algorithm) {
            (Self::RsaPkcs1(Sha1), KeyAlgorithm::Rsa) => {
                &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY
            }
            (Self::RsaPkcs1(Sha256), KeyAlgorithm::Rsa) => &signature::RSA_PKCS1_2048_8192_SHA256,
            (Self::RsaPkcs1(Sha384), KeyAlgorithm::Rsa) => &signature::RSA_PKCS1_2048_8192_SHA384,
            (Self::RsaPkcs1(Sha512), KeyAlgorithm::Rsa) => &signature::RSA_PKCS1_2048_8192_SHA512,
            (Self::RsaPss(Sha256), KeyAlgorithm::Rsa | KeyAlgorithm::RsaPss) => {
                &signature::RSA_PSS_2048_8192_SHA256
            }
            (Self::RsaPss(Sha384), KeyAlgorithm::Rsa | KeyAlgorithm::RsaPss) => {
                &signature::RSA_PSS_2048_8192_SHA384
            }
            (Self::RsaPss(Sha512), KeyAlgorithm::Rsa | KeyAlgorithm::RsaPss) => {
                &signature::RSA_PSS_2048_8192_SHA512
            }
            (Self::Ecdsa(Sha256), KeyAlgorithm::Ec(EcCurve::P256)) => &signature::ECDSA_P256_SHA256_ASN1,
            (Self::Ecdsa(Sha384), KeyAlgorithm::Ec(EcCurve::P256)) => &signature::ECDSA_P256_SHA384_ASN1,
            (Self::Ecdsa(Sha256), KeyAlgorithm::Ec(EcCurve::P384)) => &signature::ECDSA_P384_SHA256_ASN1,
            (Self::Ecdsa(Sha384), KeyAlgorithm::Ec(EcCurve::P384)) => &signature::ECDSA_P384_SHA384_ASN1,
            (alg, key_alg) => {
                return Err(PkdError::UnsupportedAlgorithm(format!(
                    "{} with {key_alg:?} key",
                    alg.name()
                )))
            }
        };
        Ok(alg)
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Capability to check signatures.
///
/// `Ok(false)` is a signature that does not verify; `Err` means the
/// signature could not be evaluated (unsupported algorithm, unreadable key).
pub trait SignatureVerifier: Send + Sync {
    /// Does `issuer`'s public key verify the signature on `subject`?
    fn verify_certificate(&self, subject: &Certificate, issuer: &Certificate) -> Result<bool>;

    /// Verify `signature` over `message` with `key`.
    fn verify_content(
        &self,
        key: &PublicKeyMaterial,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool>;
}

/// [`SignatureVerifier`] backed by `x509-parser` and `ring`.
#[derive(Debug, Default, Clone, Copy)]
pub struct X509SignatureVerifier;

impl SignatureVerifier for X509SignatureVerifier {
    fn verify_certificate(&self, subject: &Certificate, issuer: &Certificate) -> Result<bool> {
        let (_, x509) = x509_parser::parse_x509_certificate(subject.der())
            .map_err(|e| PkdError::CertificateParse(e.to_string()))?;
        if x509.signature_algorithm.algorithm.to_id_string() == RSASSA_PSS {
            return verify_pss_certificate(&x509, subject, issuer);
        }
        let (_, spki) = SubjectPublicKeyInfo::from_der(&issuer.public_key.spki_der)
            .map_err(|e| PkdError::CertificateParse(format!("issuer public key: {e}")))?;

        match x509.verify_signature(Some(&spki)) {
            Ok(()) => Ok(true),
            Err(X509Error::SignatureVerificationError) => {
                debug!(
                    subject = %subject.subject_dn,
                    issuer = %issuer.subject_dn,
                    "certificate signature does not verify"
                );
                Ok(false)
            }
            Err(X509Error::SignatureUnsupportedAlgorithm) => Err(PkdError::UnsupportedAlgorithm(
                format!(
                    "certificate signature {}",
                    x509.signature_algorithm.algorithm.to_id_string()
                ),
            )),
            Err(e) => Err(PkdError::CertificateParse(e.to_string())),
        }
    }

    fn verify_content(
        &self,
        key: &PublicKeyMaterial,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let alg = algorithm.ring_algorithm(key)?;
        Ok(UnparsedPublicKey::new(alg, &key.key)
            .verify(message, signature)
            .is_ok())
    }
}

/// RSASSA-PSS certificate signature, hash taken from RSASSA-PSS-params.
fn verify_pss_certificate(
    x509: &X509Certificate<'_>,
    subject: &Certificate,
    issuer: &Certificate,
) -> Result<bool> {
    let params = match X509SignatureAlgorithm::try_from(&x509.signature_algorithm) {
        Ok(X509SignatureAlgorithm::RSASSA_PSS(params)) => params,
        _ => {
            return Err(PkdError::CertificateParse(
                "malformed RSASSA-PSS parameters".to_string(),
            ))
        }
    };
    let digest = pss_digest(&params)?;
    let alg = SignatureAlgorithm::RsaPss(digest).ring_algorithm(&issuer.public_key)?;

    let signature: &[u8] = &x509.signature_value.data;
    let verified = UnparsedPublicKey::new(alg, &issuer.public_key.key)
        .verify(x509.tbs_certificate.as_ref(), signature)
        .is_ok();
    if !verified {
        debug!(
            subject = %subject.subject_dn,
            issuer = %issuer.subject_dn,
            "RSASSA-PSS certificate signature does not verify"
        );
    }
    Ok(verified)
}

/// Only MGF1 with the message digest and a digest-length salt are accepted.
fn pss_digest(params: &RsaSsaPssParams<'_>) -> Result<DigestAlgorithm> {
    let digest = DigestAlgorithm::from_oid(&params.hash_algorithm_oid().to_id_string())?;
    let mgf = params
        .mask_gen_algorithm()
        .map_err(|e| PkdError::CertificateParse(format!("RSASSA-PSS mask generation: {e}")))?;
    let mgf_digest = DigestAlgorithm::from_oid(&mgf.hash.to_id_string())?;

    if mgf.mgf.to_id_string() != MGF1
        || mgf_digest != digest
        || usize::try_from(params.salt_length()).ok() != Some(digest.output_len())
        || params.trailer_field() != 1
    {
        return Err(PkdError::UnsupportedAlgorithm(format!(
            "RSASSA-PSS with {digest}, salt length {}",
            params.salt_length()
        )));
    }
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkd_core::testing::TestPki;
    use pkd_core::CertificateType;

    #[test]
    fn issuer_key_verifies_child() {
        let pki = TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 10);
        let verifier = X509SignatureVerifier;

        assert!(verifier.verify_certificate(&dsc, pki.csca()).unwrap());
        assert!(verifier.verify_certificate(pki.csca(), pki.csca()).unwrap());
    }

    #[test]
    fn foreign_key_does_not_verify() {
        let kr = TestPki::new("KR");
        let de = TestPki::new("DE");
        let dsc = kr.issue_dsc("DS 01", 10);

        assert!(!X509SignatureVerifier.verify_certificate(&dsc, de.csca()).unwrap());
    }

    #[test]
    fn content_signature() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 02", 11);
        let sig = signer.sign(b"security object");
        let key = &signer.certificate().public_key;
        let alg = SignatureAlgorithm::from_oid("1.2.840.10045.4.3.2", DigestAlgorithm::Sha256).unwrap();

        assert!(X509SignatureVerifier.verify_content(key, alg, b"security object", &sig).unwrap());
        assert!(!X509SignatureVerifier.verify_content(key, alg, b"security objecT", &sig).unwrap());
    }

    #[test]
    fn algorithm_resolution() {
        let alg = SignatureAlgorithm::from_oid("1.2.840.113549.1.1.1", DigestAlgorithm::Sha384).unwrap();
        assert_eq!(alg, SignatureAlgorithm::RsaPkcs1(DigestAlgorithm::Sha384));
        assert_eq!(alg.name(), "SHA384withRSA");
        assert_eq!(
            SignatureAlgorithm::from_oid("1.2.840.10045.4.3.2", DigestAlgorithm::Sha1)
                .unwrap()
                .name(),
            "SHA256withECDSA"
        );
        assert!(matches!(
            SignatureAlgorithm::from_oid("1.3.101.112", DigestAlgorithm::Sha256),
            Err(PkdError::UnsupportedAlgorithm(_))
        ));
    }

    fn pss_pair() -> (Certificate, Certificate) {
        let csca = Certificate::from_pem(
            CertificateType::Csca,
            include_bytes!("../testdata/csca-rsa-pss.pem"),
        )
        .unwrap();
        let dsc = Certificate::from_pem(
            CertificateType::Dsc,
            include_bytes!("../testdata/dsc-rsa-pss.pem"),
        )
        .unwrap();
        (csca, dsc)
    }

    #[test]
    fn rsa_pss_certificates_verify() {
        let (csca, dsc) = pss_pair();

        assert!(X509SignatureVerifier.verify_certificate(&dsc, &csca).unwrap());
        assert!(X509SignatureVerifier.verify_certificate(&csca, &csca).unwrap());
        assert!(!X509SignatureVerifier.verify_certificate(&dsc, &dsc).unwrap());
    }

    #[test]
    fn mismatched_key_is_unsupported() {
        let pki = TestPki::new("KR");
        let key = &pki.csca().public_key;
        let err = X509SignatureVerifier
            .verify_content(key, SignatureAlgorithm::RsaPkcs1(DigestAlgorithm::Sha256), b"m", b"s")
            .unwrap_err();
        assert!(matches!(err, PkdError::UnsupportedAlgorithm(_)));
    }
}
