//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use std::process::ExitCode;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::output::OutputFormat;

/// Run the CLI application.
///
/// Exits with code 1 when the certificate or document does not validate.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Load configuration
    let config = Config::load()?;

    // Flags win over the config file
    let output_format = cli
        .output
        .or(config.output_format)
        .unwrap_or(OutputFormat::Pretty);
    let store_dir = cli.store.or_else(|| config.store.clone());

    // Create context for commands
    let ctx = commands::Context {
        store_dir,
        output_format,
        verbose: cli.verbose,
        no_color: cli.no_color,
        config,
    };

    // Dispatch to appropriate command
    let passed = match cli.command {
        Commands::Validate(args) => commands::validate::execute(ctx, args).await?,
        Commands::Pa(args) => commands::pa::execute(ctx, args).await?,
        Commands::InspectSod(args) => commands::inspect_sod::execute(ctx, args).await?,
        Commands::Config(args) => commands::config::execute(ctx, args)?,
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Log to stderr; `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}
