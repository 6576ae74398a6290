//! SOD signature verification.
//!
//! Every failure is reported inside [`SodVerification`]; this layer never
//! returns `Err`. Whether the signer is trusted is decided elsewhere.

use std::collections::BTreeMap;
use std::sync::Arc;

use pkd_core::{Certificate, CertificateRepository, DigestAlgorithm, PkdError};
use pkd_trust::{SignatureAlgorithm, SignatureVerifier};
use serde::Serialize;
use tracing::{debug, warn};

use crate::lds::{LdsVersion, SecurityObject, SignerId};

/// Why a SOD failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SodErrorCode {
    DecodeFailed,
    UnsupportedAlgorithm,
    SignerNotFound,
    ContentDigestMismatch,
    SignatureInvalid,
    RepositoryUnavailable,
}

impl SodErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DecodeFailed => "DECODE_FAILED",
            Self::UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            Self::SignerNotFound => "SIGNER_NOT_FOUND",
            Self::ContentDigestMismatch => "CONTENT_DIGEST_MISMATCH",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::RepositoryUnavailable => "REPOSITORY_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for SodErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SodError {
    pub code: SodErrorCode,
    pub message: String,
}

impl SodError {
    fn new(code: SodErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map an operational error onto its SOD error code.
    fn from_pkd(err: &PkdError) -> Self {
        match err {
            PkdError::UnsupportedAlgorithm(_) => {
                Self::new(SodErrorCode::UnsupportedAlgorithm, err.to_string())
            }
            PkdError::Repository(reason) => {
                Self::new(SodErrorCode::RepositoryUnavailable, reason.clone())
            }
            _ => Self::new(SodErrorCode::DecodeFailed, err.to_string()),
        }
    }
}

impl std::fmt::Display for SodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of [`SodSignatureVerifier::verify`].
#[derive(Debug, Clone, Serialize)]
pub struct SodVerification {
    pub valid: bool,
    /// e.g. `SHA256withECDSA`
    pub signature_algorithm: Option<String>,
    /// Algorithm of the data group hash table
    pub hash_algorithm: Option<DigestAlgorithm>,
    pub signer_certificate: Option<Certificate>,
    /// Expected digest per data group number
    #[serde(serialize_with = "hex_table")]
    pub hash_table: BTreeMap<u8, Vec<u8>>,
    pub lds_version: Option<LdsVersion>,
    pub errors: Vec<SodError>,
}

fn hex_table<S: serde::Serializer>(
    table: &BTreeMap<u8, Vec<u8>>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_map(table.iter().map(|(k, v)| (k, hex::encode(v))))
}

impl SodVerification {
    fn failed(error: SodError) -> Self {
        Self {
            valid: false,
            signature_algorithm: None,
            hash_algorithm: None,
            signer_certificate: None,
            hash_table: BTreeMap::new(),
            lds_version: None,
            errors: vec![error],
        }
    }

    /// First error with the given code.
    pub fn error(&self, code: SodErrorCode) -> Option<&SodError> {
        self.errors.iter().find(|e| e.code == code)
    }

    /// The SOD could not be evaluated at all, as opposed to failing
    /// verification.
    pub fn is_unevaluable(&self) -> bool {
        self.errors.iter().any(|e| {
            matches!(
                e.code,
                SodErrorCode::DecodeFailed | SodErrorCode::UnsupportedAlgorithm
            )
        })
    }
}

/// Verifies the signer's signature over the LDS Security Object.
pub struct SodSignatureVerifier {
    certs: Arc<dyn CertificateRepository>,
    verifier: Arc<dyn SignatureVerifier>,
    require_embedded_signer: bool,
}

impl SodSignatureVerifier {
    pub fn new(
        certs: Arc<dyn CertificateRepository>,
        verifier: Arc<dyn SignatureVerifier>,
        require_embedded_signer: bool,
    ) -> Self {
        Self {
            certs,
            verifier,
            require_embedded_signer,
        }
    }

    /// Decode and verify raw EF.SOD bytes.
    pub fn verify(&self, sod_bytes: &[u8]) -> SodVerification {
        match SecurityObject::decode(sod_bytes) {
            Ok(so) => self.verify_decoded(&so),
            Err(e) => {
                warn!(error = %e, "SOD could not be decoded");
                SodVerification::failed(SodError::from_pkd(&e))
            }
        }
    }

    /// Verify an already decoded security object.
    pub fn verify_decoded(&self, so: &SecurityObject) -> SodVerification {
        let mut result = SodVerification {
            valid: false,
            signature_algorithm: None,
            hash_algorithm: Some(so.hash_algorithm),
            signer_certificate: None,
            hash_table: so.data_group_hashes.clone(),
            lds_version: Some(so.lds_version.clone()),
            errors: Vec::new(),
        };

        let algorithm = match SignatureAlgorithm::from_oid(&so.signature_algorithm_oid, so.digest_algorithm) {
            Ok(alg) => {
                result.signature_algorithm = Some(alg.name());
                Some(alg)
            }
            Err(e) => {
                result.errors.push(SodError::from_pkd(&e));
                None
            }
        };

        match self.resolve_signer(so) {
            Ok(signer) => result.signer_certificate = Some(signer),
            Err(error) => result.errors.push(error),
        }

        if let Some(attrs) = &so.signed_attributes {
            let computed = so.digest_algorithm.digest(&so.econtent);
            if computed != attrs.message_digest {
                result.errors.push(SodError::new(
                    SodErrorCode::ContentDigestMismatch,
                    format!(
                        "messageDigest {} does not match {} of the security object {}",
                        hex::encode(&attrs.message_digest),
                        so.digest_algorithm,
                        hex::encode(computed)
                    ),
                ));
            }
        }

        if let (Some(alg), Some(signer)) = (algorithm, &result.signer_certificate) {
            match self
                .verifier
                .verify_content(&signer.public_key, alg, &so.signed_bytes, &so.signature)
            {
                Ok(true) => {}
                Ok(false) => result.errors.push(SodError::new(
                    SodErrorCode::SignatureInvalid,
                    format!("{alg} signature does not verify under '{}'", signer.subject_dn),
                )),
                Err(e) => result.errors.push(SodError::from_pkd(&e)),
            }
        }

        result.valid = result.errors.is_empty();
        debug!(
            valid = result.valid,
            signature_algorithm = result.signature_algorithm.as_deref().unwrap_or("-"),
            errors = result.errors.len(),
            "SOD signature verified"
        );
        result
    }

    fn resolve_signer(&self, so: &SecurityObject) -> std::result::Result<Certificate, SodError> {
        if let Some(cert) = &so.embedded_signer {
            return Ok(cert.clone());
        }
        if self.require_embedded_signer {
            return Err(SodError::new(
                SodErrorCode::SignerNotFound,
                "no signer certificate embedded in the SOD",
            ));
        }

        let SignerId::IssuerAndSerial {
            issuer_dn,
            serial_number,
        } = &so.signer_id
        else {
            return Err(SodError::new(
                SodErrorCode::SignerNotFound,
                "signer identified by subjectKeyIdentifier and not embedded",
            ));
        };

        match self.certs.find_by_serial_and_issuer(serial_number, issuer_dn) {
            Ok(Some(cert)) => {
                debug!(subject = %cert.subject_dn, "signer resolved from repository");
                Ok(cert)
            }
            Ok(None) => Err(SodError::new(
                SodErrorCode::SignerNotFound,
                format!("no certificate with serial {serial_number} issued by '{issuer_dn}'"),
            )),
            Err(e) => Err(SodError::from_pkd(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SodBuilder;
    use pkd_core::testing::{TestPki, UnavailableRepository};
    use pkd_core::InMemoryCertificateStore;
    use pkd_trust::X509SignatureVerifier;

    fn verifier(store: Arc<dyn CertificateRepository>, require_embedded: bool) -> SodSignatureVerifier {
        SodSignatureVerifier::new(store, Arc::new(X509SignatureVerifier), require_embedded)
    }

    fn empty_store() -> Arc<dyn CertificateRepository> {
        Arc::new(InMemoryCertificateStore::new())
    }

    #[test]
    fn valid_signature_with_embedded_signer() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .data_group(2, b"FACE")
            .build();

        let result = verifier(empty_store(), false).verify(&sod);
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(result.signature_algorithm.as_deref(), Some("SHA256withECDSA"));
        assert_eq!(result.hash_algorithm, Some(DigestAlgorithm::Sha256));
        assert_eq!(result.hash_table.len(), 2);
        assert_eq!(
            result.signer_certificate.unwrap().fingerprint(),
            signer.certificate().fingerprint()
        );
    }

    #[test]
    fn signature_over_econtent_without_attributes() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .without_signed_attributes()
            .build();
        assert!(verifier(empty_store(), false).verify(&sod).valid);
    }

    #[test]
    fn corrupted_signature_is_invalid() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .corrupt_signature()
            .build();
        let result = verifier(empty_store(), false).verify(&sod);
        assert!(!result.valid);
        assert!(result.error(SodErrorCode::SignatureInvalid).is_some());
        assert!(!result.is_unevaluable());
    }

    #[test]
    fn message_digest_mismatch_reported() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .wrong_message_digest()
            .build();
        let result = verifier(empty_store(), false).verify(&sod);
        assert!(!result.valid);
        assert!(result.error(SodErrorCode::ContentDigestMismatch).is_some());
        // the attributes themselves are still correctly signed
        assert!(result.error(SodErrorCode::SignatureInvalid).is_none());
    }

    #[test]
    fn signer_looked_up_when_not_embedded() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .without_certificate()
            .build();

        let missing = verifier(empty_store(), false).verify(&sod);
        assert_eq!(missing.errors[0].code, SodErrorCode::SignerNotFound);

        let store = InMemoryCertificateStore::new();
        store.insert(signer.certificate().clone());
        let found = verifier(Arc::new(store), false).verify(&sod);
        assert!(found.valid, "{:?}", found.errors);
    }

    #[test]
    fn unrelated_embedded_certificate_is_not_the_signer() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let unrelated = pki.issue_dsc("DS 09", 0x59);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .without_certificate()
            .also_embed(&unrelated)
            .build();

        let store = InMemoryCertificateStore::new();
        store.insert(signer.certificate().clone());
        let result = verifier(Arc::new(store), false).verify(&sod);
        assert!(result.valid, "{:?}", result.errors);
        assert_eq!(
            result.signer_certificate.unwrap().fingerprint(),
            signer.certificate().fingerprint()
        );
    }

    #[test]
    fn key_identifier_signer_verifies() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .signer_by_key_identifier()
            .build();
        let result = verifier(empty_store(), false).verify(&sod);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn embedded_signer_can_be_required() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .without_certificate()
            .build();
        let store = InMemoryCertificateStore::new();
        store.insert(signer.certificate().clone());

        let result = verifier(Arc::new(store), true).verify(&sod);
        assert!(!result.valid);
        assert!(result.error(SodErrorCode::SignerNotFound).is_some());
    }

    #[test]
    fn repository_failure_is_reported() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .without_certificate()
            .build();
        let result = verifier(Arc::new(UnavailableRepository), false).verify(&sod);
        assert!(result.error(SodErrorCode::RepositoryUnavailable).is_some());
    }

    #[test]
    fn undecodable_sod_is_data() {
        let result = verifier(empty_store(), false).verify(b"\x77\x02\x30\x00");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, SodErrorCode::DecodeFailed);
        assert!(result.is_unevaluable());
        assert!(result.hash_table.is_empty());
    }

    #[test]
    fn unknown_signature_algorithm_is_unevaluable() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .signature_algorithm("1.3.101.112")
            .build();
        let result = verifier(empty_store(), false).verify(&sod);

        assert!(!result.valid);
        assert!(result.error(SodErrorCode::UnsupportedAlgorithm).is_some());
        assert!(result.is_unevaluable());
        assert!(result.signature_algorithm.is_none());
        assert_eq!(result.hash_table.len(), 1);
    }

    #[test]
    fn unknown_hash_algorithm_is_unevaluable() {
        let pki = TestPki::new("KR");
        let signer = pki.issue_signer("DS 01", 0x51);
        let sod = SodBuilder::new(&signer)
            .data_group(1, b"MRZ")
            .lds_hash_oid("1.2.840.113549.2.5")
            .build();
        let result = verifier(empty_store(), false).verify(&sod);

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, SodErrorCode::UnsupportedAlgorithm);
        assert!(result.hash_algorithm.is_none());
    }

    #[test]
    fn serializes_codes_screaming() {
        let json = serde_json::to_value(SodError::new(SodErrorCode::SignerNotFound, "x")).unwrap();
        assert_eq!(json["code"], "SIGNER_NOT_FOUND");
    }
}
