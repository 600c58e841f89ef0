//! Authenticates signing callers against a credential store.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::error::AuthError;
use crate::types::IdentityCredential;

/// Checks caller credentials. Stateless apart from the shared store.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
}

impl Authenticator {
    /// Creates an authenticator backed by `store`.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Authenticates one request.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Forbidden`] if no credential was presented.
    /// - [`AuthError::Internal`] if the store lookup failed.
    /// - [`AuthError::Unauthorized`] if the identity is unknown or the secret
    ///   does not match.
    pub fn authenticate(&self, credential: Option<&IdentityCredential>) -> Result<(), AuthError> {
        let Some(credential) = credential else {
            debug!("request carried no credential");
            return Err(AuthError::Forbidden);
        };
        let identity = credential.identity_key();

        let expected = self.store.lookup_secret(identity).map_err(|e| {
            warn!(identity, error = %e, "credential lookup failed");
            AuthError::Internal(e.to_string())
        })?;

        let Some(expected) = expected else {
            debug!(identity, "unknown identity");
            return Err(AuthError::Unauthorized);
        };

        if secrets_match(expected.as_bytes(), credential.secret().as_bytes()) {
            debug!(identity, "caller authenticated");
            Ok(())
        } else {
            debug!(identity, "secret mismatch");
            Err(AuthError::Unauthorized)
        }
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

// Lengths are compared in the clear; contents in constant time.
fn secrets_match(expected: &[u8], presented: &[u8]) -> bool {
    expected.ct_eq(presented).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{FnCredentialStore, SharedSecret, StaticCredentials};
    use crate::error::CredentialStoreError;
    use test_case::test_case;

    fn static_authenticator() -> Authenticator {
        Authenticator::new(Arc::new(
            StaticCredentials::new()
                .with("tokens", "t0k3ns")
                .with("apps", "4pps"),
        ))
    }

    #[test]
    fn missing_credential_is_forbidden() {
        assert_eq!(
            static_authenticator().authenticate(None),
            Err(AuthError::Forbidden)
        );
    }

    #[test_case("tokens", "t0k3ns" => Ok(()) ; "known identity with right secret")]
    #[test_case("tokens", "wrong" => Err(AuthError::Unauthorized) ; "wrong secret")]
    #[test_case("tokens", "" => Err(AuthError::Unauthorized) ; "empty secret")]
    #[test_case("tokens", "t0k3ns " => Err(AuthError::Unauthorized) ; "secret with trailing space")]
    #[test_case("apps", "t0k3ns" => Err(AuthError::Unauthorized) ; "another identity's secret")]
    #[test_case("ghost", "t0k3ns" => Err(AuthError::Unauthorized) ; "unknown identity")]
    fn static_store_outcomes(identity: &str, secret: &str) -> Result<(), AuthError> {
        let credential = IdentityCredential::new(identity, secret);
        static_authenticator().authenticate(Some(&credential))
    }

    #[test]
    fn shared_secret_accepts_any_identity() {
        let auth = Authenticator::new(Arc::new(SharedSecret::new("shared")));

        for identity in ["discovery", "accounts", "anything"] {
            let credential = IdentityCredential::new(identity, "shared");
            assert_eq!(auth.authenticate(Some(&credential)), Ok(()));
        }

        let credential = IdentityCredential::new("discovery", "not-shared");
        assert_eq!(
            auth.authenticate(Some(&credential)),
            Err(AuthError::Unauthorized)
        );
    }

    #[test]
    fn store_failure_is_internal() {
        let auth = Authenticator::new(Arc::new(FnCredentialStore::new(|_: &str| {
            Err(CredentialStoreError::new("vault sealed"))
        })));
        let credential = IdentityCredential::new("tokens", "t0k3ns");

        assert_eq!(
            auth.authenticate(Some(&credential)),
            Err(AuthError::Internal("vault sealed".into()))
        );
    }

    #[test]
    fn authenticator_is_cloneable_across_threads() {
        let auth = static_authenticator();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let auth = auth.clone();
                std::thread::spawn(move || {
                    let credential = IdentityCredential::new("apps", "4pps");
                    auth.authenticate(Some(&credential))
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(()));
        }
    }
}
