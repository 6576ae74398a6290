use thiserror::Error;

/// Result type alias for PKD operations
pub type Result<T> = std::result::Result<T, PkdError>;

/// Operational failures: conditions under which a certificate or document
/// could not be evaluated at all.
///
/// A negative verdict ("certificate revoked", "data group tampered") is never
/// an error; those are reported as findings inside the result records.
#[derive(Error, Debug)]
pub enum PkdError {
    /// Certificate bytes could not be decoded
    #[error("certificate parse error: {0}")]
    CertificateParse(String),

    /// CRL bytes could not be decoded
    #[error("CRL parse error: {0}")]
    CrlParse(String),

    /// Security object (EF.SOD) could not be decoded
    #[error("SOD decode error: {0}")]
    SodDecode(String),

    /// Algorithm identifier we cannot evaluate
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Certificate or CRL repository failed to answer
    #[error("repository unavailable: {0}")]
    Repository(String),

    /// Direct DSC -> CSCA relationship does not hold
    #[error("trust chain validation failed: {0}")]
    ChainValidation(String),

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PkdError {
    /// Returns true if the error came from a collaborator (store) rather than
    /// from the material being evaluated.
    #[must_use]
    pub const fn is_repository_error(&self) -> bool {
        matches!(self, Self::Repository(_))
    }

    /// Returns true if the input itself could not be evaluated
    /// (undecodable bytes or an algorithm we do not implement).
    #[must_use]
    pub const fn is_unevaluable_input(&self) -> bool {
        matches!(
            self,
            Self::CertificateParse(_)
                | Self::CrlParse(_)
                | Self::SodDecode(_)
                | Self::UnsupportedAlgorithm(_)
        )
    }

    /// Shorthand for a repository failure.
    pub fn repository(reason: impl std::fmt::Display) -> Self {
        Self::Repository(reason.to_string())
    }
}
