//! pkd - ICAO PKD trust validation and Passive Authentication from the command line.

use std::process::ExitCode;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    pkd_cli::run().await
}
