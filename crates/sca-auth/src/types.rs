//! Caller credentials.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// The identity key and secret presented by a caller with one request.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct IdentityCredential {
    identity_key: String,
    secret: String,
}

impl IdentityCredential {
    /// Creates a credential.
    pub fn new(identity_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity_key: identity_key.into(),
            secret: secret.into(),
        }
    }

    /// The caller's identity key.
    #[must_use]
    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// The caller's secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for IdentityCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCredential")
            .field("identity_key", &self.identity_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
