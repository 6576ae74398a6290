//! Validation policy.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PkdError, Result};

/// Policy for certificate trust validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum number of issuer hops from the end-entity (default: 5).
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Consult CRLs once the chain is built (default: true).
    #[serde(default = "default_true")]
    pub check_revocation: bool,

    /// Fall back to the country's CRL when the issuer has none (default: true).
    #[serde(default = "default_true")]
    pub crl_country_fallback: bool,

    /// Which non-CSCA certificates may act as issuers.
    #[serde(default)]
    pub cross_certification: CrossCertificationPolicy,

    /// Treat an expired PA signer as non-blocking (default: false).
    #[serde(default)]
    pub tolerate_expired_signer: bool,
}

/// Cross-certification policy for chain building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossCertificationPolicy {
    /// Allow `DSC` certificates as intermediate issuers.
    #[serde(default)]
    pub allow_dsc_issuers: bool,

    /// Allow `MLSC` certificates as intermediate issuers.
    #[serde(default)]
    pub allow_mlsc_issuers: bool,
}

/// Passive Authentication policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaConfig {
    /// Trust validation settings for the signer certificate.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Reject SODs without an embedded signer instead of looking the
    /// signer up by issuer and serial (default: false).
    #[serde(default)]
    pub require_embedded_signer: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            check_revocation: true,
            crl_country_fallback: true,
            cross_certification: CrossCertificationPolicy::default(),
            tolerate_expired_signer: false,
        }
    }
}

impl ValidationConfig {
    /// Parse from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| PkdError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_toml(&std::fs::read_to_string(path)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings that cannot produce a chain.
    pub fn validate(&self) -> Result<()> {
        if self.max_chain_depth == 0 {
            return Err(PkdError::Config("max_chain_depth must be at least 1".into()));
        }
        Ok(())
    }
}

// Default value functions for serde.
const fn default_max_chain_depth() -> usize {
    5
}

const fn default_true() -> bool {
    true
}
