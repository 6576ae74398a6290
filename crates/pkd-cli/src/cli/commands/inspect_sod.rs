//! `pkd inspect-sod` - Decoded security object, no trust evaluation.

use anyhow::{Context as _, Result};
use colored::Colorize;
use icao_pkd::{LdsVersion, SecurityObject, SignerId};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::Context;
use crate::cli::args::InspectSodArgs;
use crate::output::{field, print_json, OutputFormat};

#[derive(Tabled)]
struct HashRow {
    #[tabled(rename = "DG")]
    number: u8,
    #[tabled(rename = "Hash")]
    hash: String,
}

pub async fn execute(ctx: Context, args: InspectSodArgs) -> Result<bool> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("reading {}", args.file.display()))?;
    let so = SecurityObject::decode(&bytes)
        .with_context(|| format!("decoding {}", args.file.display()))?;

    match ctx.output_format {
        OutputFormat::Json => print_json(&so)?,
        OutputFormat::Pretty => print_pretty(&so),
    }
    Ok(true)
}

fn print_pretty(so: &SecurityObject) {
    println!("{}", "Security Object".bold());
    println!();
    match &so.lds_version {
        LdsVersion::V0 => field("LDS", "V0"),
        LdsVersion::V1 {
            lds_version,
            unicode_version,
        } => field("LDS", format!("V1 (LDS {lds_version}, Unicode {unicode_version})")),
    }
    field("Hash algorithm", so.hash_algorithm);
    field("Digest algorithm", so.digest_algorithm);
    field("Signature algorithm", &so.signature_algorithm_oid);
    match &so.signer_id {
        SignerId::IssuerAndSerial {
            issuer_dn,
            serial_number,
        } => field("Signer", format!("{issuer_dn} / serial {serial_number}")),
        SignerId::SubjectKeyIdentifier(ski) => field("Signer", format!("SKI {ski}")),
    }
    match &so.embedded_signer {
        Some(cert) => field("Embedded certificate", cert.subject_dn.cyan()),
        None => field("Embedded certificate", "none".yellow()),
    }
    field("Signed attributes", so.signed_attributes.is_some());

    let rows: Vec<HashRow> = so
        .data_group_hashes
        .iter()
        .map(|(number, hash)| HashRow {
            number: *number,
            hash: hex::encode_upper(hash),
        })
        .collect();
    println!();
    println!("{}", Table::new(rows).with(Style::rounded()));
}
