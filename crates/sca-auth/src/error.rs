//! Error types for caller authentication and credential provisioning.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The request carried no credential.
    #[error("authentication required")]
    Forbidden,

    /// The identity is unknown or the secret is wrong.
    #[error("invalid credentials")]
    Unauthorized,

    /// The credential store could not be consulted.
    #[error("credential lookup failed: {0}")]
    Internal(String),
}

/// A credential store failed to answer a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CredentialStoreError(pub String);

impl CredentialStoreError {
    /// Creates a lookup error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors from reading or writing password files.
#[derive(Debug, Error)]
pub enum Error {
    /// A password file could not be read or written.
    #[error("password file {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A password file is not a JSON object of strings.
    #[error("invalid password file {}: {source}", path.display())]
    Serialization {
        /// File involved.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
