//! Passive Authentication: SOD signature, signer trust and data group
//! integrity combined into one verdict.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use pkd_core::{
    dn_eq, Certificate, CertificateRepository, CertificateType, CrlRepository, PaConfig, PkdError,
    Result, ValidationError, ValidationErrorKind,
};
use pkd_trust::{rank_issuers, CertificateValidator, SignatureVerifier, X509SignatureVerifier};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::datagroup::DataGroupVerifier;
use crate::result::{
    CertificateChainValidation, PaRequest, PaStatus, PassiveAuthenticationResult, RequestMetadata,
    SodSignatureValidation,
};
use crate::sod::{SodErrorCode, SodSignatureVerifier};

/// Runs Passive Authentication against read-only certificate and CRL stores.
pub struct PassiveAuthenticator {
    certs: Arc<dyn CertificateRepository>,
    verifier: Arc<dyn SignatureVerifier>,
    validator: CertificateValidator,
    sod: SodSignatureVerifier,
    config: PaConfig,
}

impl PassiveAuthenticator {
    pub fn new(
        certs: Arc<dyn CertificateRepository>,
        crls: Arc<dyn CrlRepository>,
        config: PaConfig,
    ) -> Self {
        Self::with_verifier(certs, crls, Arc::new(X509SignatureVerifier), config)
    }

    pub fn with_verifier(
        certs: Arc<dyn CertificateRepository>,
        crls: Arc<dyn CrlRepository>,
        verifier: Arc<dyn SignatureVerifier>,
        config: PaConfig,
    ) -> Self {
        Self {
            validator: CertificateValidator::with_verifier(
                certs.clone(),
                crls,
                verifier.clone(),
                config.validation.clone(),
            ),
            sod: SodSignatureVerifier::new(
                certs.clone(),
                verifier.clone(),
                config.require_embedded_signer,
            ),
            certs,
            verifier,
            config,
        }
    }

    pub fn config(&self) -> &PaConfig {
        &self.config
    }

    pub fn verify_request(&self, request: &PaRequest) -> Result<PassiveAuthenticationResult> {
        self.run(
            &request.sod,
            &request.data_groups,
            &request.issuing_country,
            &request.document_number,
            request.metadata.clone(),
        )
    }

    /// Verify a presented document.
    ///
    /// A negative verdict is `Ok`. `Err` only when a repository failed;
    /// a document that cannot be evaluated yields status `ERROR`.
    pub fn verify(
        &self,
        sod_bytes: &[u8],
        data_groups: &HashMap<u8, Vec<u8>>,
        issuing_country: &str,
        document_number: &str,
    ) -> Result<PassiveAuthenticationResult> {
        self.run(
            sod_bytes,
            data_groups,
            issuing_country,
            document_number,
            RequestMetadata::default(),
        )
    }

    fn run(
        &self,
        sod_bytes: &[u8],
        data_groups: &HashMap<u8, Vec<u8>>,
        issuing_country: &str,
        document_number: &str,
        metadata: RequestMetadata,
    ) -> Result<PassiveAuthenticationResult> {
        let started = Instant::now();
        let verification_id = Uuid::new_v4();
        let country = issuing_country.trim().to_ascii_uppercase();
        debug!(%verification_id, country = %country, document = %document_number, "passive authentication started");

        let sod = self.sod.verify(sod_bytes);
        if let Some(error) = sod.error(SodErrorCode::RepositoryUnavailable) {
            return Err(PkdError::Repository(error.message.clone()));
        }
        let mut unevaluable = sod
            .errors
            .iter()
            .find(|e| matches!(e.code, SodErrorCode::DecodeFailed | SodErrorCode::UnsupportedAlgorithm))
            .map(ToString::to_string);

        let certificate_chain = match &sod.signer_certificate {
            Some(signer) => match self.validate_signer(signer, &country) {
                Ok(chain) => chain,
                Err(e) if e.is_repository_error() => return Err(e),
                Err(e) => {
                    warn!(subject = %signer.subject_dn, error = %e, "signer could not be evaluated");
                    unevaluable.get_or_insert_with(|| e.to_string());
                    CertificateChainValidation::unevaluated(signer)
                }
            },
            None => CertificateChainValidation::without_signer(),
        };

        let data_group_validation = sod
            .hash_algorithm
            .map(|alg| DataGroupVerifier::verify(&sod.hash_table, data_groups, alg));

        let passed = unevaluable.is_none()
            && sod.valid
            && certificate_chain.valid
            && !certificate_chain.revoked
            && data_group_validation
                .as_ref()
                .is_some_and(|dg| dg.invalid_groups == 0 && dg.total_groups > 0);
        let status = match (&unevaluable, passed) {
            (Some(_), _) => PaStatus::Error,
            (None, true) => PaStatus::Valid,
            (None, false) => PaStatus::Invalid,
        };

        let result = PassiveAuthenticationResult {
            verification_id,
            status,
            passed,
            document_number: document_number.to_string(),
            issuing_country: country,
            verified_at: Utc::now(),
            processing_duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            certificate_chain,
            sod_signature: SodSignatureValidation::from(&sod),
            data_groups: data_group_validation,
            lds_version: sod.lds_version.clone(),
            error: unevaluable,
            metadata,
        };

        info!(
            %verification_id,
            status = %result.status,
            country = %result.issuing_country,
            signature_valid = result.sod_signature.valid,
            chain_valid = result.certificate_chain.valid,
            invalid_groups = result.data_groups.as_ref().map_or(0, |dg| dg.invalid_groups),
            duration_ms = result.processing_duration_ms,
            "passive authentication completed"
        );
        Ok(result)
    }

    /// Judge the signer against the issuing country's CSCAs.
    fn validate_signer(&self, signer: &Certificate, country: &str) -> Result<CertificateChainValidation> {
        let anchor = self.resolve_anchor(signer, country)?;
        let config = &self.config.validation;

        let mut report = self
            .validator
            .evaluate(signer, anchor.as_ref(), config.check_revocation)?;
        if anchor.is_none() {
            report.findings.push(ValidationError::new(
                ValidationErrorKind::TrustAnchorNotFound,
                signer,
                format!("no CSCA of {country} with subject '{}'", signer.issuer_dn),
            ));
        }

        let tolerate_expired = config.tolerate_expired_signer;
        Ok(CertificateChainValidation::from_report(
            signer,
            anchor.as_ref(),
            report,
            |kind| !(tolerate_expired && kind == ValidationErrorKind::Expired),
        ))
    }

    /// Best CSCA of `country` named as the signer's issuer.
    fn resolve_anchor(&self, signer: &Certificate, country: &str) -> Result<Option<Certificate>> {
        let mut candidates: Vec<(bool, Certificate)> = self
            .certs
            .find_by_country_and_type(country, CertificateType::Csca)?
            .into_iter()
            .filter(|csca| dn_eq(&csca.subject_dn, &signer.issuer_dn))
            .map(|csca| {
                let verifies = self.verifier.verify_certificate(signer, &csca).unwrap_or(false);
                (verifies, csca)
            })
            .collect();
        candidates.sort_by(|(va, a), (vb, b)| rank_issuers(signer, (*va, a), (*vb, b)));

        let anchor = candidates.into_iter().next().map(|(_, csca)| csca);
        match &anchor {
            Some(csca) => debug!(anchor = %csca.subject_dn, fingerprint = %csca.fingerprint(), "trust anchor resolved"),
            None => warn!(issuer = %signer.issuer_dn, country, "no trust anchor for signer"),
        }
        Ok(anchor)
    }
}
