//! # pkd-trust
//!
//! Certificate trust decisions for the ICAO PKD:
//!
//! - [`ChainBuilder`] discovers the issuer path up to a CSCA
//! - [`RevocationChecker`] consults the single valid CRL of an issuer
//! - [`CertificateValidator`] runs every check and itemizes the findings
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pkd_core::{InMemoryCertificateStore, InMemoryCrlStore, ValidationConfig};
//! use pkd_trust::CertificateValidator;
//!
//! let validator = CertificateValidator::new(
//!     Arc::new(InMemoryCertificateStore::new()),
//!     Arc::new(InMemoryCrlStore::new()),
//!     ValidationConfig::default(),
//! );
//! let findings = validator.perform_full_validation(&dsc, None, true)?;
//! ```

pub mod chain;
pub mod revocation;
pub mod signature;
pub mod validator;

pub use chain::{rank_issuers, ChainBuilder, ChainError, TrustChain};
pub use revocation::{CrlSource, CrlStatus, RevocationCheck, RevocationChecker, RevocationDetails};
pub use signature::{SignatureAlgorithm, SignatureVerifier, X509SignatureVerifier};
pub use validator::{
    check_basic_constraints, check_key_usage, check_validity, CertificateValidator,
    ValidationReport,
};
