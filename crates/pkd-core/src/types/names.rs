//! Distinguished-name and serial-number normalization.
//!
//! DNs and serials arrive from several sources (parsed certificates, CRLs,
//! CMS signer identifiers, repository rows). Every comparison in the crate
//! goes through these helpers so formatting differences never decide trust.

/// Normalize a serial number to uppercase hex without separators or
/// leading zero octets. `"00:1a:2B"` and `"1A2B"` normalize identically.
#[must_use]
pub fn normalize_serial(serial: &str) -> String {
    let hex: String = serial
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        return "0".to_string();
    }
    // Keep whole octets so the result stays a valid hex byte string.
    if trimmed.len() % 2 == 1 {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Serial from raw big-endian bytes (DER INTEGER content).
#[must_use]
pub fn serial_from_bytes(raw: &[u8]) -> String {
    normalize_serial(&hex::encode_upper(raw))
}

/// Canonical form of a distinguished name: RDNs split on `,` or `+`, each
/// `TYPE=value` trimmed, type uppercased, value lowercased with inner
/// whitespace collapsed.
#[must_use]
pub fn normalize_dn(dn: &str) -> String {
    dn.split([',', '+'])
        .map(str::trim)
        .filter(|rdn| !rdn.is_empty())
        .map(|rdn| match rdn.split_once('=') {
            Some((ty, value)) => format!(
                "{}={}",
                ty.trim().to_ascii_uppercase(),
                value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
            ),
            None => rdn.to_lowercase(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Distinguished-name equality, insensitive to case and spacing.
#[must_use]
pub fn dn_eq(a: &str, b: &str) -> bool {
    normalize_dn(a) == normalize_dn(b)
}
