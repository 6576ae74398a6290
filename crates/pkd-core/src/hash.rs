//! Digest algorithms used by certificates and security objects.
//!
//! SHA-1/256/384/512 go through `ring::digest`; SHA-224 (allowed by
//! ICAO Doc 9303 but absent from ring) comes from `sha2`.

use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY, SHA256, SHA384, SHA512};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use crate::error::{PkdError, Result};

/// Hash algorithms permitted for LDS data group hashes and SOD signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Resolve a digest algorithm from its dotted OID.
    pub fn from_oid(oid: &str) -> Result<Self> {
        match oid {
            "1.3.14.3.2.26" => Ok(Self::Sha1),
            "2.16.840.1.101.3.4.2.4" => Ok(Self::Sha224),
            "2.16.840.1.101.3.4.2.1" => Ok(Self::Sha256),
            "2.16.840.1.101.3.4.2.2" => Ok(Self::Sha384),
            "2.16.840.1.101.3.4.2.3" => Ok(Self::Sha512),
            other => Err(PkdError::UnsupportedAlgorithm(format!(
                "digest algorithm {other}"
            ))),
        }
    }

    /// Dotted OID of this algorithm.
    #[must_use]
    pub const fn oid(self) -> &'static str {
        match self {
            Self::Sha1 => "1.3.14.3.2.26",
            Self::Sha224 => "2.16.840.1.101.3.4.2.4",
            Self::Sha256 => "2.16.840.1.101.3.4.2.1",
            Self::Sha384 => "2.16.840.1.101.3.4.2.2",
            Self::Sha512 => "2.16.840.1.101.3.4.2.3",
        }
    }

    /// Conventional name (`SHA-256`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Digest output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Compute the digest of `data`.
    #[must_use]
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => digest(&SHA1_FOR_LEGACY_USE_ONLY, data).as_ref().to_vec(),
            Self::Sha224 => Sha224::digest(data).to_vec(),
            Self::Sha256 => digest(&SHA256, data).as_ref().to_vec(),
            Self::Sha384 => digest(&SHA384, data).as_ref().to_vec(),
            Self::Sha512 => digest(&SHA512, data).as_ref().to_vec(),
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Compute SHA-256 of raw bytes, lowercase hex (certificate / CRL fingerprints).
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest(&SHA256, data).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha224_empty() {
        assert_eq!(
            hex::encode(DigestAlgorithm::Sha224.digest(b"")),
            "d14a028c2a3a2bc9476102bb288234c415a2b01f828ea62ac5b3e42f"
        );
    }

    #[test]
    fn output_lengths_match_digests() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha224,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(alg.digest(b"abc").len(), alg.output_len(), "{alg}");
            assert_eq!(DigestAlgorithm::from_oid(alg.oid()).unwrap(), alg);
        }
    }

    #[test]
    fn unknown_oid_is_unsupported() {
        let err = DigestAlgorithm::from_oid("1.2.840.113549.2.5").unwrap_err();
        assert!(matches!(err, PkdError::UnsupportedAlgorithm(_)));
    }
}
