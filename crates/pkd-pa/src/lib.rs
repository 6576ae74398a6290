//! # pkd-pa
//!
//! ICAO Doc 9303 Passive Authentication.
//!
//! - [`SecurityObject`] decodes EF.SOD (CMS `SignedData` over the LDS Security Object)
//! - [`SodSignatureVerifier`] checks the document signer's signature
//! - [`DataGroupVerifier`] recomputes data group hashes
//! - [`PassiveAuthenticator`] combines them with signer trust validation
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pkd_core::{InMemoryCertificateStore, InMemoryCrlStore, PaConfig};
//! use pkd_pa::PassiveAuthenticator;
//!
//! let pa = PassiveAuthenticator::new(Arc::new(certs), Arc::new(crls), PaConfig::default());
//! let result = pa.verify(&sod_bytes, &data_groups, "KR", "M12345678")?;
//! println!("{}: passed={}", result.status, result.passed);
//! ```

pub mod datagroup;
pub mod lds;
pub mod orchestrator;
pub mod result;
pub mod sod;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use datagroup::{parse_data_group_key, DataGroupResult, DataGroupValidation, DataGroupVerifier};
pub use lds::{LdsVersion, SecurityObject, SignedAttributes, SignerId, MAX_DATA_GROUP};
pub use orchestrator::PassiveAuthenticator;
pub use result::{
    CertificateChainValidation, PaRequest, PaStatus, PassiveAuthenticationResult, RequestMetadata,
    SodSignatureValidation,
};
pub use sod::{SodError, SodErrorCode, SodSignatureVerifier, SodVerification};
