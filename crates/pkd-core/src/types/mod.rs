//! PKD data model

mod certificate;
mod crl;
mod finding;
mod names;

pub use certificate::{
    BasicConstraints, Certificate, CertificateStatus, CertificateType, EcCurve, Fingerprint,
    KeyAlgorithm, KeyUsage, PublicKeyMaterial,
};
pub use crl::{CertificateRevocationList, RevocationEntry, RevocationReason};
pub use finding::{ValidationError, ValidationErrorKind};
pub use names::{dn_eq, normalize_dn, normalize_serial, serial_from_bytes};
