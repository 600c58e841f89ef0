//! Caller authentication for the services CA.
//!
//! Signing callers present an identity key and a secret. The
//! [`Authenticator`] checks them against a [`CredentialStore`], which can be
//! a single shared secret, a fixed map loaded from a password file, or any
//! closure.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sca_auth::{extract_credential, AuthError, Authenticator, StaticCredentials};
//!
//! let store = StaticCredentials::new().with("tokens", "s3cret");
//! let auth = Authenticator::new(Arc::new(store));
//!
//! let credential = extract_credential(Some("tokens"), Some("s3cret"));
//! assert!(auth.authenticate(credential.as_ref()).is_ok());
//!
//! let credential = extract_credential(Some("tokens"), Some("guess"));
//! assert_eq!(auth.authenticate(credential.as_ref()), Err(AuthError::Unauthorized));
//!
//! assert_eq!(auth.authenticate(None), Err(AuthError::Forbidden));
//! ```

#![forbid(unsafe_code)]

pub mod authenticator;
pub mod credentials;
pub mod error;
pub mod headers;
pub mod provision;
pub mod types;

pub use authenticator::Authenticator;
pub use credentials::{CredentialStore, FnCredentialStore, SharedSecret, StaticCredentials};
pub use error::{AuthError, CredentialStoreError, Error, Result};
pub use headers::{IDENTITY_KEY_HEADER, IDENTITY_SECRET_HEADER, extract_credential};
pub use provision::{
    ADMIN_IDENTITY, ADMIN_PASSWORD_FILE, DEFAULT_SERVICES, PASSWORD_LENGTH, PASSWORDS_FILE,
    ensure_admin_password, generate_password, load_or_provision_passwords,
};
pub use types::IdentityCredential;
