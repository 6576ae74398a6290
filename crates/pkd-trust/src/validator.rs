//! Certificate validation: structural checks, chain building and revocation
//! combined into one itemized verdict.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pkd_core::{
    dn_eq, Certificate, CertificateRepository, CertificateType, CrlRepository, PkdError, Result,
    ValidationConfig, ValidationError, ValidationErrorKind,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::chain::{ChainBuilder, ChainError, TrustChain};
use crate::revocation::{RevocationCheck, RevocationChecker};
use crate::signature::{SignatureVerifier, X509SignatureVerifier};

/// Everything one validation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// All findings; empty means valid
    pub findings: Vec<ValidationError>,
    /// The chain, when it could be built
    pub chain: Option<TrustChain>,
    /// Revocation outcome, when it ran
    pub revocation: Option<RevocationCheck>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has(&self, kind: ValidationErrorKind) -> bool {
        self.findings.iter().any(|f| f.kind == kind)
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation.as_ref().is_some_and(|r| r.revoked)
    }
}

/// Runs every applicable check against a certificate.
pub struct CertificateValidator {
    chain_builder: ChainBuilder,
    revocation: RevocationChecker,
    verifier: Arc<dyn SignatureVerifier>,
    config: ValidationConfig,
}

impl CertificateValidator {
    /// Validator using [`X509SignatureVerifier`].
    pub fn new(
        certs: Arc<dyn CertificateRepository>,
        crls: Arc<dyn CrlRepository>,
        config: ValidationConfig,
    ) -> Self {
        Self::with_verifier(certs, crls, Arc::new(X509SignatureVerifier), config)
    }

    pub fn with_verifier(
        certs: Arc<dyn CertificateRepository>,
        crls: Arc<dyn CrlRepository>,
        verifier: Arc<dyn SignatureVerifier>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            chain_builder: ChainBuilder::new(certs, verifier.clone(), config.cross_certification),
            revocation: RevocationChecker::new(crls, config.crl_country_fallback),
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn chain_builder(&self) -> &ChainBuilder {
        &self.chain_builder
    }

    pub fn revocation_checker(&self) -> &RevocationChecker {
        &self.revocation
    }

    /// Validate at the current time. An empty list means the certificate is valid.
    pub fn perform_full_validation(
        &self,
        cert: &Certificate,
        trust_anchor: Option<&Certificate>,
        check_revocation: bool,
    ) -> Result<Vec<ValidationError>> {
        Ok(self.evaluate(cert, trust_anchor, check_revocation)?.findings)
    }

    /// Like [`perform_full_validation`](Self::perform_full_validation) but
    /// keeps the chain and revocation outcome.
    pub fn evaluate(
        &self,
        cert: &Certificate,
        trust_anchor: Option<&Certificate>,
        check_revocation: bool,
    ) -> Result<ValidationReport> {
        self.validate_at(Utc::now(), cert, trust_anchor, check_revocation)
    }

    /// Validate against a fixed clock.
    ///
    /// The structural checks always all run. Only revocation depends on
    /// another step: it needs a built chain.
    pub fn validate_at(
        &self,
        now: DateTime<Utc>,
        cert: &Certificate,
        trust_anchor: Option<&Certificate>,
        check_revocation: bool,
    ) -> Result<ValidationReport> {
        let mut findings = Vec::new();
        findings.extend(check_validity(cert, now));
        findings.extend(check_basic_constraints(cert));
        findings.extend(check_key_usage(cert));

        let chain = match self
            .chain_builder
            .build_chain(cert, trust_anchor, self.config.max_chain_depth)
        {
            Ok(chain) => Some(chain),
            Err(ChainError::Invalid(finding)) => {
                debug!(subject = %cert.subject_dn, kind = %finding.kind, "chain build failed");
                findings.push(finding);
                None
            }
            Err(ChainError::Operational(e)) => return Err(e),
        };

        findings.extend(self.check_signatures(cert, trust_anchor, chain.as_ref())?);

        if let Some(chain) = &chain {
            findings.extend(check_issuers_are_ca(chain));
        }

        let revocation = match &chain {
            Some(_) if check_revocation => {
                let check = self.revocation.is_revoked_at(cert, now)?;
                if check.revoked {
                    findings.push(revoked_finding(cert, &check));
                }
                Some(check)
            }
            _ => None,
        };

        info!(
            subject = %cert.subject_dn,
            cert_type = %cert.cert_type,
            findings = findings.len(),
            chain_len = chain.as_ref().map_or(0, TrustChain::len),
            "certificate validated"
        );

        Ok(ValidationReport {
            findings,
            chain,
            revocation,
            validated_at: now,
        })
    }

    /// Direct two-hop check: `dsc` must name `csca` as issuer and verify under
    /// its key. Fails with [`PkdError::ChainValidation`] otherwise.
    pub fn validate_trust_chain(&self, dsc: &Certificate, csca: &Certificate) -> Result<()> {
        if !dn_eq(&dsc.issuer_dn, &csca.subject_dn) {
            return Err(PkdError::ChainValidation(format!(
                "issuer '{}' does not match CSCA subject '{}'",
                dsc.issuer_dn, csca.subject_dn
            )));
        }
        if !self.verifier.verify_certificate(dsc, csca)? {
            return Err(PkdError::ChainValidation(format!(
                "signature of '{}' does not verify under '{}'",
                dsc.subject_dn, csca.subject_dn
            )));
        }
        Ok(())
    }

    /// Against the anchor when it is the direct issuer, then along every
    /// other link of the built chain.
    fn check_signatures(
        &self,
        cert: &Certificate,
        trust_anchor: Option<&Certificate>,
        chain: Option<&TrustChain>,
    ) -> Result<Vec<ValidationError>> {
        let mut findings = Vec::new();
        let direct_anchor = trust_anchor.filter(|a| dn_eq(&a.subject_dn, &cert.issuer_dn));

        if let Some(anchor) = direct_anchor {
            if !self.verifier.verify_certificate(cert, anchor)? {
                findings.push(ValidationError::new(
                    ValidationErrorKind::SignatureInvalid,
                    cert,
                    format!("signature does not verify under '{}'", anchor.subject_dn),
                ));
            }
        }

        for (child, parent) in chain.into_iter().flat_map(TrustChain::links) {
            let already_checked = child.fingerprint() == cert.fingerprint()
                && direct_anchor.is_some_and(|a| a.fingerprint() == parent.fingerprint());
            if already_checked {
                continue;
            }
            if !self.verifier.verify_certificate(child, parent)? {
                findings.push(ValidationError::new(
                    ValidationErrorKind::SignatureInvalid,
                    child,
                    format!("signature does not verify under '{}'", parent.subject_dn),
                ));
            }
        }
        Ok(findings)
    }
}

/// `notBefore <= now <= notAfter`. At most one finding.
pub fn check_validity(cert: &Certificate, now: DateTime<Utc>) -> Option<ValidationError> {
    if now < cert.not_before {
        Some(ValidationError::new(
            ValidationErrorKind::NotYetValid,
            cert,
            format!("not valid before {}", cert.not_before.to_rfc3339()),
        ))
    } else if now > cert.not_after {
        Some(ValidationError::new(
            ValidationErrorKind::Expired,
            cert,
            format!("expired at {}", cert.not_after.to_rfc3339()),
        ))
    } else {
        None
    }
}

/// CSCAs must assert `cA`; signer certificates must not.
pub fn check_basic_constraints(cert: &Certificate) -> Option<ValidationError> {
    let message = match (cert.cert_type.is_authority(), cert.basic_constraints) {
        (true, None) => "CSCA lacks the Basic Constraints extension",
        (true, Some(bc)) if !bc.ca => "CSCA does not assert cA",
        (false, Some(bc)) if bc.ca => "signer certificate asserts cA",
        _ => return None,
    };
    Some(ValidationError::new(
        ValidationErrorKind::BasicConstraintsMismatch,
        cert,
        message,
    ))
}

/// CSCA: keyCertSign and cRLSign. DSC and MLSC: digitalSignature.
/// Non-conformant DSCs are not checked.
pub fn check_key_usage(cert: &Certificate) -> Option<ValidationError> {
    let message = match (cert.cert_type, cert.key_usage) {
        (CertificateType::DscNc, _) => return None,
        (_, None) => "Key Usage extension missing",
        (CertificateType::Csca, Some(ku)) if !(ku.key_cert_sign && ku.crl_sign) => {
            "CSCA key usage lacks keyCertSign or cRLSign"
        }
        (CertificateType::Dsc | CertificateType::Mlsc, Some(ku)) if !ku.digital_signature => {
            "signer key usage lacks digitalSignature"
        }
        _ => return None,
    };
    Some(ValidationError::new(
        ValidationErrorKind::KeyUsageMismatch,
        cert,
        message,
    ))
}

/// Every certificate that issues another in the chain must assert `cA`.
fn check_issuers_are_ca(chain: &TrustChain) -> Vec<ValidationError> {
    chain
        .links()
        .filter(|(_, parent)| !parent.asserts_ca())
        .map(|(child, parent)| {
            ValidationError::new(
                ValidationErrorKind::BasicConstraintsMismatch,
                parent,
                format!("issuer of '{}' does not assert cA", child.subject_dn),
            )
        })
        .collect()
}

fn revoked_finding(cert: &Certificate, check: &RevocationCheck) -> ValidationError {
    let message = check.details.as_ref().map_or_else(
        || "certificate is revoked".to_string(),
        |d| {
            let date = d
                .revocation_date
                .map_or_else(|| "unknown date".to_string(), |t| t.to_rfc3339());
            let reason = d.reason.map_or("unspecified", |r| r.as_str());
            format!(
                "serial {} revoked on {date} ({reason}) per CRL {}",
                d.serial_number, d.crl_id
            )
        },
    );
    ValidationError::new(ValidationErrorKind::Revoked, cert, message)
}
