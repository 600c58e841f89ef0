//! Credential stores: where the expected secret of an identity key comes from.

use std::collections::HashMap;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::error::CredentialStoreError;

/// Looks up the secret an identity key must present.
pub trait CredentialStore: Send + Sync {
    /// Returns the expected secret for `identity_key`, `Ok(None)` if the key
    /// is unknown, or an error if the lookup itself failed.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialStoreError`] when the backing source is unavailable.
    fn lookup_secret(&self, identity_key: &str) -> Result<Option<String>, CredentialStoreError>;
}

impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    fn lookup_secret(&self, identity_key: &str) -> Result<Option<String>, CredentialStoreError> {
        (**self).lookup_secret(identity_key)
    }
}

impl<T: CredentialStore + ?Sized> CredentialStore for Box<T> {
    fn lookup_secret(&self, identity_key: &str) -> Result<Option<String>, CredentialStoreError> {
        (**self).lookup_secret(identity_key)
    }
}

/// Accepts every identity key with one shared secret.
pub struct SharedSecret {
    secret: Zeroizing<String>,
}

impl SharedSecret {
    /// Creates a store that expects `secret` from every caller.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl CredentialStore for SharedSecret {
    fn lookup_secret(&self, _identity_key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(Some(self.secret.to_string()))
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A fixed map of identity keys to secrets.
#[derive(Default)]
pub struct StaticCredentials {
    secrets: HashMap<String, Zeroizing<String>>,
}

impl StaticCredentials {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the secret of `identity_key`.
    #[must_use]
    pub fn with(mut self, identity_key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.insert(identity_key, secret);
        self
    }

    /// Adds or replaces the secret of `identity_key`.
    pub fn insert(&mut self, identity_key: impl Into<String>, secret: impl Into<String>) {
        self.secrets
            .insert(identity_key.into(), Zeroizing::new(secret.into()));
    }

    /// Number of known identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Returns `true` if no identity is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Known identity keys, sorted.
    #[must_use]
    pub fn identities(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl From<HashMap<String, String>> for StaticCredentials {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter()
            .fold(Self::new(), |store, (key, secret)| store.with(key, secret))
    }
}

impl CredentialStore for StaticCredentials {
    fn lookup_secret(&self, identity_key: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self
            .secrets
            .get(identity_key)
            .map(|secret| secret.to_string()))
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("identities", &self.identities())
            .finish()
    }
}

/// Adapts a closure into a [`CredentialStore`].
pub struct FnCredentialStore<F> {
    lookup: F,
}

impl<F> FnCredentialStore<F>
where
    F: Fn(&str) -> Result<Option<String>, CredentialStoreError> + Send + Sync,
{
    /// Wraps `lookup`.
    pub const fn new(lookup: F) -> Self {
        Self { lookup }
    }
}

impl<F> CredentialStore for FnCredentialStore<F>
where
    F: Fn(&str) -> Result<Option<String>, CredentialStoreError> + Send + Sync,
{
    fn lookup_secret(&self, identity_key: &str) -> Result<Option<String>, CredentialStoreError> {
        (self.lookup)(identity_key)
    }
}

impl<F> std::fmt::Debug for FnCredentialStore<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCredentialStore").finish_non_exhaustive()
    }
}
