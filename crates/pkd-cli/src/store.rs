//! Store directory loading.
//!
//! ```text
//! <store>/csca/    CSCA certificates
//! <store>/dsc/     document signers
//! <store>/dsc_nc/  non-conformant document signers
//! <store>/mlsc/    master list signers
//! <store>/crl/     CRLs
//! ```
//!
//! Certificate files may be PEM (bundles allowed) or DER. Files that fail to
//! parse are logged and skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use icao_pkd::{
    Certificate, CertificateRevocationList, CertificateType, InMemoryCertificateStore,
    InMemoryCrlStore,
};
use serde::Serialize;
use tracing::{debug, info, warn};

const CERT_DIRS: &[(&str, CertificateType)] = &[
    ("csca", CertificateType::Csca),
    ("dsc", CertificateType::Dsc),
    ("dsc_nc", CertificateType::DscNc),
    ("mlsc", CertificateType::Mlsc),
];

const CERT_EXTENSIONS: &[&str] = &["pem", "crt", "cer", "der"];
const CRL_EXTENSIONS: &[&str] = &["crl", "pem", "der"];

/// In-memory stores filled from a store directory.
pub struct LoadedStore {
    pub certs: Arc<InMemoryCertificateStore>,
    pub crls: Arc<InMemoryCrlStore>,
    pub stats: LoadStats,
}

impl LoadedStore {
    /// Empty stores, used when no store directory is configured.
    pub fn empty() -> Self {
        Self {
            certs: Arc::new(InMemoryCertificateStore::new()),
            crls: Arc::new(InMemoryCrlStore::new()),
            stats: LoadStats::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub certificates: usize,
    pub duplicates: usize,
    pub crls: usize,
    /// Files that could not be parsed
    pub skipped: usize,
}

/// Load every certificate and CRL under `dir`.
///
/// CRLs are ingested oldest `thisUpdate` first, so the newest CRL of each
/// issuer ends up the valid one.
pub async fn load_store(dir: &Path) -> Result<LoadedStore> {
    if !dir.is_dir() {
        anyhow::bail!("store directory {} does not exist", dir.display());
    }

    let store = LoadedStore::empty();
    let mut stats = LoadStats::default();

    for (subdir, cert_type) in CERT_DIRS {
        let path = dir.join(subdir);
        if !path.is_dir() {
            debug!(path = %path.display(), "store subdirectory not found, skipping");
            continue;
        }
        for file in list_files(&path, CERT_EXTENSIONS).await? {
            match read_certificates(&file, *cert_type).await {
                Ok(found) => {
                    for cert in found {
                        if store.certs.insert(cert) {
                            stats.certificates += 1;
                        } else {
                            stats.duplicates += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping certificate file");
                    stats.skipped += 1;
                }
            }
        }
    }

    let crl_dir = dir.join("crl");
    let mut crls = Vec::new();
    if crl_dir.is_dir() {
        for file in list_files(&crl_dir, CRL_EXTENSIONS).await? {
            match read_crls(&file).await {
                Ok(found) => crls.extend(found),
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping CRL file");
                    stats.skipped += 1;
                }
            }
        }
    }
    crls.sort_by_key(|crl| crl.this_update);
    stats.crls = crls.len();
    for crl in crls {
        store.crls.ingest(crl);
    }

    info!(
        store = %dir.display(),
        certificates = stats.certificates,
        crls = stats.crls,
        skipped = stats.skipped,
        "store loaded"
    );
    Ok(LoadedStore { stats, ..store })
}

/// Files in `dir` with one of `extensions`, sorted by name.
async fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("reading {}", dir.display()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("reading {}", dir.display()))?
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if path.is_file() && extensions.contains(&ext.as_str()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .is_some_and(|start| bytes[start..].starts_with(b"-----BEGIN"))
}

/// All certificates in a PEM bundle or a single DER file.
pub async fn read_certificates(path: &Path, cert_type: CertificateType) -> Result<Vec<Certificate>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ders: Vec<Vec<u8>> = if is_pem(&bytes) {
        pem::parse_many(&bytes)
            .with_context(|| format!("decoding PEM {}", path.display()))?
            .into_iter()
            .filter(|p| p.tag() == "CERTIFICATE")
            .map(pem::Pem::into_contents)
            .collect()
    } else {
        vec![bytes]
    };
    if ders.is_empty() {
        anyhow::bail!("no certificate in {}", path.display());
    }

    ders.iter()
        .map(|der| {
            Certificate::from_der(cert_type, der)
                .map(|cert| cert.with_provenance(source.clone(), false))
                .with_context(|| format!("parsing {}", path.display()))
        })
        .collect()
}

/// The first certificate of a file.
pub async fn read_certificate(path: &Path, cert_type: CertificateType) -> Result<Certificate> {
    read_certificates(path, cert_type)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no certificate in {}", path.display()))
}

async fn read_crls(path: &Path) -> Result<Vec<CertificateRevocationList>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let ders: Vec<Vec<u8>> = if is_pem(&bytes) {
        pem::parse_many(&bytes)
            .with_context(|| format!("decoding PEM {}", path.display()))?
            .into_iter()
            .filter(|p| p.tag() == "X509 CRL")
            .map(pem::Pem::into_contents)
            .collect()
    } else {
        vec![bytes]
    };
    if ders.is_empty() {
        anyhow::bail!("no CRL in {}", path.display());
    }

    ders.iter()
        .map(|der| {
            CertificateRevocationList::from_der(der)
                .with_context(|| format!("parsing {}", path.display()))
        })
        .collect()
}
