//! PKI error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKI error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Key or certificate generation failed.
    #[error("certificate generation failed: {0}")]
    Generation(String),

    /// Key or certificate parsing failed.
    #[error("certificate parsing failed: {0}")]
    Parse(String),

    /// The private key does not belong to the certificate.
    #[error("private key does not match certificate public key")]
    KeyMismatch,

    /// The public key of a signing request is not a valid P-256 point.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Subject Alternative Name error.
    #[error("SAN error: {0}")]
    San(String),

    /// Signing a certificate with the CA key failed.
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// Certificate validation failed.
    #[error("certificate validation failed: {0}")]
    Validation(String),

    /// Certificate has expired.
    #[error("certificate has expired")]
    Expired,

    /// Certificate not yet valid.
    #[error("certificate not yet valid")]
    NotYetValid,

    /// Signature verification failed.
    #[error("signature verification failed: {0}")]
    SignatureVerification(String),

    /// Reading key material from disk failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` for I/O failures, `false` for cryptographic ones.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display_includes_path() {
        let err = Error::Io {
            path: PathBuf::from("/var/lib/sca/ca.key"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/lib/sca/ca.key"));
        assert!(msg.contains("denied"));
        assert!(err.is_io());
    }

    #[test]
    fn crypto_errors_are_not_io() {
        assert!(!Error::KeyMismatch.is_io());
        assert!(!Error::InvalidPublicKey("short".into()).is_io());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            Error::InvalidPublicKey("not on curve".into()).to_string(),
            "invalid public key: not on curve"
        );
        assert_eq!(
            Error::KeyMismatch.to_string(),
            "private key does not match certificate public key"
        );
    }
}
