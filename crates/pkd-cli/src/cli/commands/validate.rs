//! `pkd validate` - Trust chain, structure and revocation of one certificate.

use anyhow::Result;
use colored::Colorize;
use icao_pkd::{Certificate, CertificateType, CertificateValidator, CrlStatus, ValidationReport};
use serde::Serialize;

use super::Context;
use crate::cli::args::ValidateArgs;
use crate::output::{field, print_findings, print_json, verdict, OutputFormat};
use crate::store::read_certificate;

#[derive(Serialize)]
struct ValidateOutput<'a> {
    valid: bool,
    subject_dn: &'a str,
    issuer_dn: &'a str,
    serial_number: &'a str,
    cert_type: CertificateType,
    fingerprint: &'a str,
    report: &'a ValidationReport,
}

pub async fn execute(ctx: Context, args: ValidateArgs) -> Result<bool> {
    let mut config = ctx.validation();
    if let Some(depth) = args.max_depth {
        config.max_chain_depth = depth;
    }
    config.validate()?;
    let check_revocation = config.check_revocation && !args.no_revocation;

    let cert = read_certificate(&args.cert, args.cert_type).await?;
    let anchor = match &args.anchor {
        Some(path) => Some(read_certificate(path, CertificateType::Csca).await?),
        None => None,
    };

    let store = ctx.load_store().await?;
    let validator = CertificateValidator::new(store.certs, store.crls, config);
    let report = validator.evaluate(&cert, anchor.as_ref(), check_revocation)?;
    let valid = report.is_valid();

    match ctx.output_format {
        OutputFormat::Json => print_json(&ValidateOutput {
            valid,
            subject_dn: &cert.subject_dn,
            issuer_dn: &cert.issuer_dn,
            serial_number: &cert.serial_number,
            cert_type: cert.cert_type,
            fingerprint: cert.fingerprint(),
            report: &report,
        })?,
        OutputFormat::Pretty => print_pretty(&cert, &report, check_revocation),
    }

    Ok(valid)
}

fn print_pretty(cert: &Certificate, report: &ValidationReport, check_revocation: bool) {
    println!("{} {}", "Certificate:".bold(), cert.subject_dn.cyan().bold());
    println!();
    field("Type", cert.cert_type);
    field("Issuer", &cert.issuer_dn);
    field("Serial", &cert.serial_number);
    field("Fingerprint", cert.fingerprint());
    field(
        "Validity",
        format!(
            "{} .. {}",
            cert.not_before.format("%Y-%m-%d"),
            cert.not_after.format("%Y-%m-%d")
        ),
    );

    match &report.chain {
        Some(chain) => {
            let path: Vec<&str> = chain
                .certificates()
                .iter()
                .map(|c| c.subject_dn.as_str())
                .collect();
            field("Chain", path.join(" -> "));
        }
        None => field("Chain", "not built".yellow()),
    }

    let revocation = match &report.revocation {
        Some(check) if check.revoked => "REVOKED".red().bold(),
        Some(check) if !check.checked => "no CRL available".yellow(),
        Some(check) if check.crl_status == CrlStatus::Stale => "not revoked (stale CRL)".yellow(),
        Some(_) => "not revoked".green(),
        None if !check_revocation => "skipped".dimmed(),
        None => "not checked (no chain)".yellow(),
    };
    field("Revocation", revocation);

    print_findings(&report.findings);
    println!();
    println!("{} {}", "Result:".bold(), verdict(report.is_valid()));
}
