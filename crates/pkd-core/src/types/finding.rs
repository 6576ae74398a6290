//! Validation findings: negative verdicts reported as data.

use serde::{Deserialize, Serialize};

use super::certificate::Certificate;

/// Kind of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorKind {
    SignatureInvalid,
    Expired,
    NotYetValid,
    BasicConstraintsMismatch,
    KeyUsageMismatch,
    Revoked,
    ChainBroken,
    ChainTooLong,
    TrustAnchorNotFound,
}

impl ValidationErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::Expired => "EXPIRED",
            Self::NotYetValid => "NOT_YET_VALID",
            Self::BasicConstraintsMismatch => "BASIC_CONSTRAINTS_MISMATCH",
            Self::KeyUsageMismatch => "KEY_USAGE_MISMATCH",
            Self::Revoked => "REVOKED",
            Self::ChainBroken => "CHAIN_BROKEN",
            Self::ChainTooLong => "CHAIN_TOO_LONG",
            Self::TrustAnchorNotFound => "TRUST_ANCHOR_NOT_FOUND",
        }
    }

    /// Findings produced by chain building.
    #[must_use]
    pub const fn is_chain_failure(self) -> bool {
        matches!(
            self,
            Self::ChainBroken | Self::ChainTooLong | Self::TrustAnchorNotFound
        )
    }
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding with the certificate it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
    /// Subject DN of the certificate the finding is about
    pub subject_dn: String,
    /// Fingerprint of that certificate
    pub fingerprint: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, cert: &Certificate, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            subject_dn: cert.subject_dn.clone(),
            fingerprint: cert.fingerprint().to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.message, self.subject_dn)
    }
}
