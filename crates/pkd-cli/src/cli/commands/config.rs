//! `pkd config` - Show CLI configuration.

use anyhow::Result;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config::Config;
use crate::output::{print_json, OutputFormat};

pub fn execute(ctx: Context, args: ConfigArgs) -> Result<bool> {
    match args.command {
        ConfigCommands::Path => println!("{}", Config::path()?.display()),
        ConfigCommands::Show => {
            let mut effective = ctx.config;
            effective.store = ctx.store_dir;
            effective.output_format = Some(ctx.output_format);
            match ctx.output_format {
                OutputFormat::Json => print_json(&effective)?,
                OutputFormat::Pretty => print!("{}", toml::to_string_pretty(&effective)?),
            }
        }
    }
    Ok(true)
}
