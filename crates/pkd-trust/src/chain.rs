//! Trust chain discovery.
//!
//! Walks issuer links through the certificate repository from an end-entity
//! certificate up to a self-signed root or a supplied trust anchor.

use std::cmp::Ordering;
use std::sync::Arc;

use pkd_core::{
    dn_eq, Certificate, CertificateRepository, CertificateType, CrossCertificationPolicy,
    PkdError, ValidationError, ValidationErrorKind,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::signature::SignatureVerifier;

/// Ordered certificates from end-entity (first) to anchor (last). Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustChain {
    certificates: Vec<Certificate>,
}

impl TrustChain {
    fn new(end_entity: Certificate) -> Self {
        Self {
            certificates: vec![end_entity],
        }
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn end_entity(&self) -> &Certificate {
        &self.certificates[0]
    }

    /// Last certificate: the root or the supplied anchor.
    pub fn anchor(&self) -> &Certificate {
        self.last()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Issuer hops (`len - 1`).
    pub fn hops(&self) -> usize {
        self.certificates.len() - 1
    }

    /// Adjacent `(child, parent)` pairs.
    pub fn links(&self) -> impl Iterator<Item = (&Certificate, &Certificate)> {
        self.certificates.windows(2).map(|pair| (&pair[0], &pair[1]))
    }

    fn last(&self) -> &Certificate {
        &self.certificates[self.certificates.len() - 1]
    }

    fn contains(&self, cert: &Certificate) -> bool {
        self.certificates
            .iter()
            .any(|c| c.fingerprint() == cert.fingerprint())
    }
}

/// Why a chain could not be built.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// A negative verdict (`CHAIN_BROKEN`, `CHAIN_TOO_LONG`, `TRUST_ANCHOR_NOT_FOUND`)
    #[error("{0}")]
    Invalid(ValidationError),

    /// The repository or a signature check failed to answer
    #[error(transparent)]
    Operational(#[from] PkdError),
}

/// Builds [`TrustChain`]s from repository lookups. Read-only.
pub struct ChainBuilder {
    certs: Arc<dyn CertificateRepository>,
    verifier: Arc<dyn SignatureVerifier>,
    policy: CrossCertificationPolicy,
}

impl ChainBuilder {
    pub fn new(
        certs: Arc<dyn CertificateRepository>,
        verifier: Arc<dyn SignatureVerifier>,
        policy: CrossCertificationPolicy,
    ) -> Self {
        Self {
            certs,
            verifier,
            policy,
        }
    }

    /// Build the chain for `cert`.
    ///
    /// Stops successfully at a self-signed certificate or at `anchor`
    /// (matched by fingerprint). `max_depth` bounds the number of issuer hops.
    pub fn build_chain(
        &self,
        cert: &Certificate,
        anchor: Option<&Certificate>,
        max_depth: usize,
    ) -> Result<TrustChain, ChainError> {
        let mut chain = TrustChain::new(cert.clone());

        loop {
            let current = chain.last();

            if anchor.is_some_and(|a| a.fingerprint() == current.fingerprint()) {
                debug!(hops = chain.hops(), anchor = %current.subject_dn, "trust anchor reached");
                return Ok(chain);
            }

            if self.is_self_signed(current)? {
                if let Some(anchor) = anchor {
                    return Err(ChainError::Invalid(ValidationError::new(
                        ValidationErrorKind::TrustAnchorNotFound,
                        cert,
                        format!(
                            "chain ends at root '{}' which is not the expected anchor '{}'",
                            current.subject_dn, anchor.subject_dn
                        ),
                    )));
                }
                debug!(hops = chain.hops(), root = %current.subject_dn, "self-signed root reached");
                return Ok(chain);
            }

            if chain.hops() >= max_depth {
                warn!(
                    subject = %cert.subject_dn,
                    max_depth,
                    "chain exceeds maximum depth"
                );
                return Err(ChainError::Invalid(ValidationError::new(
                    ValidationErrorKind::ChainTooLong,
                    cert,
                    format!("no root within {max_depth} issuer hops"),
                )));
            }

            let candidates = self.issuer_candidates(current, &chain, anchor)?;
            let Some(issuer) = self.select_issuer(current, candidates) else {
                return Err(ChainError::Invalid(ValidationError::new(
                    ValidationErrorKind::ChainBroken,
                    cert,
                    format!("no issuer found for '{}'", current.issuer_dn),
                )));
            };

            debug!(
                child = %current.subject_dn,
                issuer = %issuer.subject_dn,
                fingerprint = %issuer.fingerprint(),
                "issuer selected"
            );
            chain.certificates.push(issuer);
        }
    }

    /// Subject equals issuer and the certificate verifies under its own key.
    fn is_self_signed(&self, cert: &Certificate) -> Result<bool, PkdError> {
        if !cert.is_self_issued() {
            return Ok(false);
        }
        self.verifier.verify_certificate(cert, cert)
    }

    fn allows_issuer(&self, cert_type: CertificateType) -> bool {
        match cert_type {
            CertificateType::Csca => true,
            CertificateType::Dsc | CertificateType::DscNc => self.policy.allow_dsc_issuers,
            CertificateType::Mlsc => self.policy.allow_mlsc_issuers,
        }
    }

    fn issuer_candidates(
        &self,
        current: &Certificate,
        chain: &TrustChain,
        anchor: Option<&Certificate>,
    ) -> Result<Vec<Certificate>, PkdError> {
        let mut candidates: Vec<Certificate> = self
            .certs
            .find_by_subject_dn(&current.issuer_dn)?
            .into_iter()
            .filter(|c| self.allows_issuer(c.cert_type) && !chain.contains(c))
            .collect();

        // The anchor counts as a candidate even when the store does not hold it.
        if let Some(anchor) = anchor {
            if dn_eq(&anchor.subject_dn, &current.issuer_dn)
                && !chain.contains(anchor)
                && !candidates.iter().any(|c| c.fingerprint() == anchor.fingerprint())
            {
                candidates.push(anchor.clone());
            }
        }
        Ok(candidates)
    }

    /// Pick the issuer for `child` among same-DN candidates.
    fn select_issuer(&self, child: &Certificate, candidates: Vec<Certificate>) -> Option<Certificate> {
        let mut ranked: Vec<(bool, Certificate)> = candidates
            .into_iter()
            .map(|c| {
                let verifies = self.verifier.verify_certificate(child, &c).unwrap_or_else(|e| {
                    debug!(candidate = %c.fingerprint(), error = %e, "candidate not checkable");
                    false
                });
                (verifies, c)
            })
            .collect();
        ranked.sort_by(|(va, a), (vb, b)| rank_issuers(child, (*va, a), (*vb, b)));
        ranked.into_iter().next().map(|(_, c)| c)
    }
}

/// Issuer ranking, best first: signature verifies, validity window covers the
/// child's notBefore, latest notBefore, then fingerprint.
pub fn rank_issuers(
    child: &Certificate,
    (a_verifies, a): (bool, &Certificate),
    (b_verifies, b): (bool, &Certificate),
) -> Ordering {
    b_verifies
        .cmp(&a_verifies)
        .then_with(|| b.covers(child.not_before).cmp(&a.covers(child.not_before)))
        .then_with(|| b.not_before.cmp(&a.not_before))
        .then_with(|| a.fingerprint().cmp(b.fingerprint()))
}
