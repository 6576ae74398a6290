//! # pkd-core
//!
//! Shared building blocks for ICAO PKD trust validation:
//!
//! - **Data model**: [`Certificate`], [`CertificateRevocationList`] and
//!   [`ValidationError`] findings
//! - **Repositories**: read-only lookup traits plus in-memory implementations
//! - **Digests**: the hash algorithms allowed in LDS security objects
//! - **Configuration**: validation and Passive Authentication policy

pub mod config;
pub mod error;
pub mod hash;
pub mod repository;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{CrossCertificationPolicy, PaConfig, ValidationConfig};
pub use error::{PkdError, Result};
pub use hash::{sha256_hex, DigestAlgorithm};
pub use repository::{CertificateRepository, CrlRepository};
pub use store::{InMemoryCertificateStore, InMemoryCrlStore};
pub use types::*;
