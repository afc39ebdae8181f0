//! Integrity verification errors

/// Failures of token or digest verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// Token was never issued for this form, expired from history, or already used
    #[error("form token not recognised (expired or already used)")]
    TokenRejected,

    /// No table digest was stored under the presented token
    #[error("no table digest issued for this token")]
    DigestMissing,

    /// Recomputed table digest differs from the issued one
    #[error("table digest mismatch")]
    DigestMismatch,

    /// Key marker could not be decoded
    #[error("invalid key marker: {0}")]
    InvalidKeyMarker(String),
}
