//! # pkd-cli
//!
//! Local harness around the ICAO PKD validation core.
//!
//! ## Features
//!
//! - **validate**: trust chain, structural checks and CRL revocation for one certificate
//! - **pa**: Passive Authentication of an EF.SOD plus data group files
//! - **inspect-sod**: decoded security object without trust evaluation
//! - **Store directory**: `csca/`, `dsc/`, `dsc_nc/`, `mlsc/` and `crl/` loaded into memory
//! - **Output formats**: pretty tables or JSON

pub mod cli;
pub mod config;
pub mod output;
pub mod store;

pub use cli::run;
