//! Configuration management.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use directories::ProjectDirs;
use icao_pkd::ValidationConfig;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;

/// CLI configuration, read from `config.toml` in the platform config dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default store directory.
    pub store: Option<PathBuf>,

    /// Default output format.
    pub output_format: Option<OutputFormat>,

    /// Reject SODs without an embedded signer.
    #[serde(default)]
    pub require_embedded_signer: bool,

    /// Validation policy overrides.
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Get the config file path.
    pub fn path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "icao-pkd", "pkd")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from the default location; defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validation.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config.store.is_none());
        assert_eq!(config.validation, ValidationConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
store = "/var/lib/pkd"
output_format = "json"

[validation]
max_chain_depth = 3
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store.as_deref(), Some(Path::new("/var/lib/pkd")));
        assert_eq!(config.output_format, Some(OutputFormat::Json));
        assert_eq!(config.validation.max_chain_depth, 3);
        assert!(config.validation.check_revocation);
    }

    #[test]
    fn zero_depth_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[validation]\nmax_chain_depth = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
