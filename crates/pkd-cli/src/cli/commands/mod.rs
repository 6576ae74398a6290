//! Command implementations.

pub mod config;
pub mod inspect_sod;
pub mod pa;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;
use icao_pkd::ValidationConfig;
use tracing::warn;

use crate::config::Config;
use crate::output::OutputFormat;
use crate::store::{load_store, LoadedStore};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Store directory from `--store`, `PKD_STORE` or the config file
    pub store_dir: Option<PathBuf>,

    /// Output format
    pub output_format: OutputFormat,

    /// Verbose output
    pub verbose: bool,

    /// Disable colors
    pub no_color: bool,

    /// Loaded configuration
    pub config: Config,
}

impl Context {
    /// Validation policy from the config file.
    pub fn validation(&self) -> ValidationConfig {
        self.config.validation.clone()
    }

    /// Load the store directory; empty stores when none is configured.
    pub async fn load_store(&self) -> Result<LoadedStore> {
        match &self.store_dir {
            Some(dir) => load_store(dir).await,
            None => {
                warn!("no store directory configured (--store or PKD_STORE); using empty stores");
                Ok(LoadedStore::empty())
            }
        }
    }
}
