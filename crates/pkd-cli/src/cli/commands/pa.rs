//! `pkd pa` - Passive Authentication of an EF.SOD and its data groups.

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use colored::Colorize;
use icao_pkd::{PaConfig, PaStatus, PassiveAuthenticationResult, PassiveAuthenticator};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::Context;
use crate::cli::args::PaArgs;
use crate::output::{field, print_findings, print_json, verdict, OutputFormat};

#[derive(Tabled)]
struct DataGroupRow {
    #[tabled(rename = "DG")]
    number: u8,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Actual")]
    actual: String,
}

pub async fn execute(ctx: Context, args: PaArgs) -> Result<bool> {
    let sod = tokio::fs::read(&args.sod)
        .await
        .with_context(|| format!("reading {}", args.sod.display()))?;

    let mut data_groups = HashMap::new();
    for (number, path) in &args.data_groups {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading data group {number} from {}", path.display()))?;
        if data_groups.insert(*number, bytes).is_some() {
            anyhow::bail!("data group {number} given more than once");
        }
    }

    let config = PaConfig {
        validation: ctx.validation(),
        require_embedded_signer: args.require_embedded_signer || ctx.config.require_embedded_signer,
    };
    config.validation.validate()?;

    let store = ctx.load_store().await?;
    let authenticator = PassiveAuthenticator::new(store.certs, store.crls, config);
    let result = authenticator.verify(&sod, &data_groups, &args.country, &args.document_number)?;

    match ctx.output_format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Pretty => print_pretty(&result),
    }

    Ok(result.passed)
}

fn print_pretty(result: &PassiveAuthenticationResult) {
    println!(
        "{} {} ({})",
        "Document:".bold(),
        result.document_number.cyan().bold(),
        result.issuing_country
    );
    println!();
    field("Verification", result.verification_id);

    let sod = &result.sod_signature;
    field(
        "SOD signature",
        format!(
            "{} {}",
            verdict(sod.valid),
            sod.signature_algorithm.as_deref().unwrap_or("-")
        ),
    );
    for error in &sod.errors {
        println!("    {} {}", "-".red(), error);
    }

    let chain = &result.certificate_chain;
    field(
        "Signer",
        format!(
            "{} {}",
            verdict(chain.valid && !chain.revoked),
            chain.dsc_subject.as_deref().unwrap_or("-")
        ),
    );
    if let Some(csca) = &chain.csca_subject {
        field("CSCA", csca);
    }
    let revocation = if chain.revoked {
        "REVOKED".red().bold()
    } else if chain.crl_checked {
        "not revoked".green()
    } else {
        "no CRL available".yellow()
    };
    field("Revocation", revocation);
    if let Some(lds) = &result.lds_version {
        field("LDS", format!("{lds:?}"));
    }

    if let Some(dg) = &result.data_groups {
        field(
            "Data groups",
            format!(
                "{}/{} valid ({})",
                dg.valid_groups, dg.total_groups, dg.hash_algorithm
            ),
        );
        let rows: Vec<DataGroupRow> = dg
            .details
            .values()
            .map(|d| DataGroupRow {
                number: d.data_group,
                status: if d.valid { "OK".into() } else { "MISMATCH".into() },
                expected: abbreviate(&d.expected_hash),
                actual: abbreviate(&d.actual_hash),
            })
            .collect();
        if !rows.is_empty() {
            println!();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
        if !dg.not_presented.is_empty() {
            field("Not presented", format!("{:?}", dg.not_presented));
        }
    }

    print_findings(&chain.findings);
    if let Some(error) = &result.error {
        println!();
        println!("{} {}", "Could not evaluate:".red().bold(), error);
    }

    println!();
    let status = match result.status {
        PaStatus::Valid => result.status.as_str().green().bold(),
        PaStatus::Invalid => result.status.as_str().red().bold(),
        PaStatus::Error => result.status.as_str().yellow().bold(),
    };
    println!(
        "{} {} in {} ms",
        "Result:".bold(),
        status,
        result.processing_duration_ms
    );
}

/// First and last eight hex digits.
fn abbreviate(hash: &str) -> String {
    if hash.is_empty() {
        return "-".into();
    }
    if hash.len() <= 20 {
        return hash.to_string();
    }
    format!("{}..{}", &hash[..8], &hash[hash.len() - 8..])
}
