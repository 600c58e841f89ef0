//! Shared state of the request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sca_auth::Authenticator;
use sca_pki::CaKeyMaterial;

/// Read-only state shared by every request handler.
#[derive(Debug)]
pub struct AppState {
    ca: Arc<CaKeyMaterial>,
    authenticator: Authenticator,
    ca_cert_path: PathBuf,
}

impl AppState {
    /// Creates the handler state.
    pub fn new(ca: Arc<CaKeyMaterial>, authenticator: Authenticator, ca_cert_path: PathBuf) -> Self {
        Self {
            ca,
            authenticator,
            ca_cert_path,
        }
    }

    /// The CA key material.
    #[must_use]
    pub fn ca(&self) -> &CaKeyMaterial {
        &self.ca
    }

    /// The caller authenticator.
    #[must_use]
    pub const fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// Location of the CA certificate served over HTTP.
    #[must_use]
    pub fn ca_cert_path(&self) -> &Path {
        &self.ca_cert_path
    }
}
