//! Command-line argument definitions using clap.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use icao_pkd::{parse_data_group_key, CertificateType};

use crate::output::OutputFormat;

/// ICAO PKD trust validation and ePassport Passive Authentication
///
/// Certificates and CRLs are read from a store directory with `csca/`,
/// `dsc/`, `dsc_nc/`, `mlsc/` and `crl/` subdirectories.
#[derive(Parser, Debug)]
#[command(name = "pkd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Certificate/CRL store directory (or set PKD_STORE env var)
    #[arg(short, long, env = "PKD_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a certificate's trust chain, structure and revocation status
    Validate(ValidateArgs),

    /// Run Passive Authentication on an EF.SOD and its data groups
    Pa(PaArgs),

    /// Decode an EF.SOD without evaluating trust
    InspectSod(InspectSodArgs),

    /// Show CLI configuration
    Config(ConfigArgs),
}

// ============================================================================
// Validate command
// ============================================================================

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Certificate file (PEM or DER)
    pub cert: PathBuf,

    /// Certificate type: CSCA, DSC, DSC_NC or MLSC
    #[arg(short = 't', long = "type", default_value = "DSC", value_parser = parse_cert_type)]
    pub cert_type: CertificateType,

    /// Trust anchor (CSCA) the chain must end at
    #[arg(long)]
    pub anchor: Option<PathBuf>,

    /// Skip the CRL revocation check
    #[arg(long)]
    pub no_revocation: bool,

    /// Maximum issuer hops
    #[arg(long)]
    pub max_depth: Option<usize>,
}

// ============================================================================
// Passive Authentication command
// ============================================================================

#[derive(Args, Debug)]
pub struct PaArgs {
    /// EF.SOD file
    #[arg(long)]
    pub sod: PathBuf,

    /// Data group file as NUMBER=PATH (e.g. 1=dg1.bin, DG2=face.bin); repeatable
    #[arg(long = "dg", value_parser = parse_data_group_arg)]
    pub data_groups: Vec<(u8, PathBuf)>,

    /// Issuing country (ISO 3166-1 alpha-2)
    #[arg(short, long)]
    pub country: String,

    /// Document number
    #[arg(short = 'n', long)]
    pub document_number: String,

    /// Reject SODs without an embedded signer certificate
    #[arg(long)]
    pub require_embedded_signer: bool,
}

// ============================================================================
// Inspect SOD command
// ============================================================================

#[derive(Args, Debug)]
pub struct InspectSodArgs {
    /// EF.SOD file
    pub file: PathBuf,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Print the configuration file path
    Path,
}

fn parse_cert_type(s: &str) -> Result<CertificateType, String> {
    CertificateType::from_str(s).map_err(|e| e.to_string())
}

/// `NUMBER=PATH`, where NUMBER is `1`, `01`, `DG1` or `dg01`.
pub fn parse_data_group_arg(s: &str) -> Result<(u8, PathBuf), String> {
    let (key, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NUMBER=PATH, got '{s}'"))?;
    let number = parse_data_group_key(key)
        .ok_or_else(|| format!("'{key}' is not a data group number between 1 and 16"))?;
    if path.is_empty() {
        return Err(format!("missing path for data group {number}"));
    }
    Ok((number, PathBuf::from(path)))
}
