//! Verdict records emitted by Passive Authentication.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pkd_core::{Certificate, DigestAlgorithm, ValidationError, ValidationErrorKind};
use pkd_trust::{CrlStatus, RevocationDetails, ValidationReport};
use serde::Serialize;
use uuid::Uuid;

use crate::datagroup::DataGroupValidation;
use crate::lds::LdsVersion;
use crate::sod::{SodError, SodVerification};

/// Overall PA status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaStatus {
    Valid,
    Invalid,
    /// The document could not be evaluated
    Error,
}

impl PaStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for PaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller context passed through untouched for auditing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    pub requested_by: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Inputs of one PA run.
#[derive(Debug, Clone, Default)]
pub struct PaRequest {
    pub sod: Vec<u8>,
    pub data_groups: HashMap<u8, Vec<u8>>,
    pub issuing_country: String,
    pub document_number: String,
    pub metadata: RequestMetadata,
}

/// Trust and revocation verdict for the document signer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CertificateChainValidation {
    pub valid: bool,
    pub dsc_subject: Option<String>,
    pub dsc_serial_number: Option<String>,
    pub dsc_not_before: Option<DateTime<Utc>>,
    pub dsc_not_after: Option<DateTime<Utc>>,
    pub csca_subject: Option<String>,
    pub csca_serial_number: Option<String>,
    pub revoked: bool,
    pub crl_checked: bool,
    pub crl_status: Option<CrlStatus>,
    pub revocation: Option<RevocationDetails>,
    /// Every finding, blocking or not
    pub findings: Vec<ValidationError>,
}

impl CertificateChainValidation {
    /// Verdict when no signer certificate is available to judge.
    pub(crate) fn without_signer() -> Self {
        Self::default()
    }

    /// Negative verdict for a signer that could not be evaluated. The signer
    /// endpoints are still reported.
    pub(crate) fn unevaluated(signer: &Certificate) -> Self {
        Self {
            dsc_subject: Some(signer.subject_dn.clone()),
            dsc_serial_number: Some(signer.serial_number.clone()),
            dsc_not_before: Some(signer.not_before),
            dsc_not_after: Some(signer.not_after),
            ..Self::default()
        }
    }

    /// Build from a validator report. `blocking` decides which findings
    /// fail the chain.
    pub(crate) fn from_report(
        signer: &Certificate,
        anchor: Option<&Certificate>,
        report: ValidationReport,
        blocking: impl Fn(ValidationErrorKind) -> bool,
    ) -> Self {
        let csca = report
            .chain
            .as_ref()
            .map(|chain| chain.anchor().clone())
            .or_else(|| anchor.cloned());
        let revocation = report.revocation.as_ref();
        Self {
            valid: !report.findings.iter().any(|f| blocking(f.kind)),
            dsc_subject: Some(signer.subject_dn.clone()),
            dsc_serial_number: Some(signer.serial_number.clone()),
            dsc_not_before: Some(signer.not_before),
            dsc_not_after: Some(signer.not_after),
            csca_subject: csca.as_ref().map(|c| c.subject_dn.clone()),
            csca_serial_number: csca.as_ref().map(|c| c.serial_number.clone()),
            revoked: revocation.is_some_and(|r| r.revoked),
            crl_checked: revocation.is_some_and(|r| r.checked),
            crl_status: revocation.map(|r| r.crl_status),
            revocation: revocation.and_then(|r| r.details.clone()),
            findings: report.findings,
        }
    }
}

/// Signature verdict over the security object.
#[derive(Debug, Clone, Serialize)]
pub struct SodSignatureValidation {
    pub valid: bool,
    pub signature_algorithm: Option<String>,
    pub hash_algorithm: Option<DigestAlgorithm>,
    pub errors: Vec<SodError>,
}

impl From<&SodVerification> for SodSignatureValidation {
    fn from(v: &SodVerification) -> Self {
        Self {
            valid: v.valid,
            signature_algorithm: v.signature_algorithm.clone(),
            hash_algorithm: v.hash_algorithm,
            errors: v.errors.clone(),
        }
    }
}

/// Aggregate outcome of one PA request. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct PassiveAuthenticationResult {
    pub verification_id: Uuid,
    pub status: PaStatus,
    /// Overall verdict
    pub passed: bool,
    pub document_number: String,
    pub issuing_country: String,
    pub verified_at: DateTime<Utc>,
    pub processing_duration_ms: u64,
    pub certificate_chain: CertificateChainValidation,
    pub sod_signature: SodSignatureValidation,
    pub data_groups: Option<DataGroupValidation>,
    pub lds_version: Option<LdsVersion>,
    /// Why the document could not be evaluated (`ERROR` status only)
    pub error: Option<String>,
    pub metadata: RequestMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(serde_json::to_value(PaStatus::Error).unwrap(), "ERROR");
        assert_eq!(PaStatus::Valid.to_string(), "VALID");
    }

    #[test]
    fn without_signer_is_not_valid() {
        let chain = CertificateChainValidation::without_signer();
        assert!(!chain.valid);
        assert!(!chain.crl_checked);
        assert!(chain.dsc_subject.is_none());
    }

    #[test]
    fn unevaluated_keeps_signer_endpoints() {
        let pki = pkd_core::testing::TestPki::new("KR");
        let dsc = pki.issue_dsc("DS 01", 0x0A0B);
        let chain = CertificateChainValidation::unevaluated(&dsc);
        assert!(!chain.valid);
        assert_eq!(chain.dsc_subject.as_deref(), Some(dsc.subject_dn.as_str()));
        assert_eq!(chain.dsc_serial_number.as_deref(), Some("0A0B"));
        assert_eq!(chain.dsc_not_after, Some(dsc.not_after));
        assert!(chain.csca_subject.is_none());
    }
}
