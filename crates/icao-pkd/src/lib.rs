//! ICAO PKD certificate trust validation and ePassport Passive Authentication.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use icao_pkd::{Certificate, CertificateType, InMemoryCertificateStore, InMemoryCrlStore};
//! use icao_pkd::{CertificateValidator, PassiveAuthenticator, PaConfig, ValidationConfig};
//!
//! let certs = Arc::new(InMemoryCertificateStore::new());
//! certs.insert(Certificate::from_pem(CertificateType::Csca, &csca_pem)?);
//! let crls = Arc::new(InMemoryCrlStore::new());
//!
//! // Trust validation of a single certificate
//! let validator = CertificateValidator::new(certs.clone(), crls.clone(), ValidationConfig::default());
//! for finding in validator.perform_full_validation(&dsc, None, true)? {
//!     println!("{finding}");
//! }
//!
//! // Passive Authentication of a presented document
//! let pa = PassiveAuthenticator::new(certs, crls, PaConfig::default());
//! let result = pa.verify(&sod, &data_groups, "KR", "M12345678")?;
//! println!("{} ({} groups checked)", result.status, result.data_groups.map_or(0, |d| d.total_groups));
//! ```
//!
//! # Features
//!
//! - `test-support` - Generated PKI fixtures and a signed SOD builder

// Re-export core types
pub use pkd_core::*;

// Re-export trust validation
pub use pkd_trust::{
    ChainBuilder, ChainError, CrlSource, CrlStatus, CertificateValidator, RevocationCheck,
    RevocationChecker, RevocationDetails, SignatureAlgorithm, SignatureVerifier, TrustChain,
    ValidationReport, X509SignatureVerifier,
};

// Re-export Passive Authentication
pub use pkd_pa::{
    parse_data_group_key, CertificateChainValidation, DataGroupResult, DataGroupValidation,
    DataGroupVerifier, LdsVersion, PaRequest, PaStatus, PassiveAuthenticationResult,
    PassiveAuthenticator, RequestMetadata, SecurityObject, SignerId, SodError, SodErrorCode,
    SodSignatureValidation, SodSignatureVerifier, SodVerification,
};

pub use pkd_pa as pa;
pub use pkd_trust as trust;

// Re-export serialization for result consumers
pub use serde;
pub use serde_json;
