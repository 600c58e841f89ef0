//! TLS configuration for both listeners.

use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ServerConfig, ServerConnection, WebPkiClientVerifier};
use sca_pki::{CaKeyMaterial, Certificate};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};

/// ALPN protocols offered by both listeners.
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Builds the RPC listener's TLS configuration from the CA material.
///
/// The server presents the CA certificate itself. Client certificates are
/// verified against the CA when presented but are not required; callers are
/// authenticated by their secret either way.
///
/// # Errors
///
/// Returns [`ServerError::Tls`] if rustls rejects the certificate or key.
pub fn build_server_tls_config(ca: &CaKeyMaterial) -> ServerResult<Arc<ServerConfig>> {
    let provider = provider();
    let ca_der = CertificateDer::from(ca.certificate().der().to_vec());

    let mut roots = RootCertStore::empty();
    roots
        .add(ca_der.clone())
        .map_err(|e| ServerError::Tls(format!("CA certificate rejected as trust root: {e}")))?;

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .allow_unauthenticated()
        .build()
        .map_err(|e| ServerError::Tls(format!("failed to build client verifier: {e}")))?;

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(ca.private_key().der().to_vec()));

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(vec![ca_der], key)
        .map_err(|e| ServerError::Tls(format!("CA certificate/key rejected: {e}")))?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    debug!("built RPC TLS configuration");
    Ok(Arc::new(config))
}

/// Builds the HTTP listener's TLS configuration from externally provided files.
///
/// # Errors
///
/// Returns [`ServerError::Tls`] if either file is missing or malformed.
pub fn load_external_tls_config(cert_path: &Path, key_path: &Path) -> ServerResult<Arc<ServerConfig>> {
    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| ServerError::Tls(format!("{}: {e}", cert_path.display())))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("{}: {e}", cert_path.display())))?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "{}: no certificates found",
            cert_path.display()
        )));
    }

    let key = PrivateKeyDer::from_pem_file(key_path)
        .map_err(|e| ServerError::Tls(format!("{}: {e}", key_path.display())))?;

    let mut config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("certificate/key rejected: {e}")))?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    debug!(cert = %cert_path.display(), "loaded HTTP TLS configuration");
    Ok(Arc::new(config))
}

/// Parses the client certificate of an established TLS connection.
pub(crate) fn peer_certificate(conn: &ServerConnection) -> Option<Arc<Certificate>> {
    let der = conn.peer_certificates()?.first()?;
    match Certificate::from_der(der) {
        Ok(cert) => Some(Arc::new(cert)),
        Err(e) => {
            warn!(error = %e, "verified client certificate could not be parsed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sca_pki::DEFAULT_ORGANIZATION;
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    fn test_ca() -> CaKeyMaterial {
        CaKeyMaterial::generate(
            "ca.internal",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            DEFAULT_ORGANIZATION,
        )
        .unwrap()
    }

    #[test]
    fn test_rpc_tls_config_offers_h2_and_http11() {
        let config = build_server_tls_config(&test_ca()).unwrap();
        assert_eq!(
            config.alpn_protocols,
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn test_external_tls_config_from_files() {
        let dir = TempDir::new().unwrap();
        let ca = test_ca();
        let cert_path = dir.path().join("http.crt");
        let key_path = dir.path().join("http.key");
        std::fs::write(&cert_path, ca.certificate().pem()).unwrap();
        std::fs::write(&key_path, ca.private_key().pem()).unwrap();

        let config = load_external_tls_config(&cert_path, &key_path).unwrap();
        assert_eq!(config.alpn_protocols.len(), 2);
    }

    #[test]
    fn test_external_tls_missing_files() {
        let dir = TempDir::new().unwrap();
        let result = load_external_tls_config(
            &dir.path().join("missing.crt"),
            &dir.path().join("missing.key"),
        );
        assert!(matches!(result, Err(ServerError::Tls(_))));
    }

    #[test]
    fn test_external_tls_empty_certificate_file() {
        let dir = TempDir::new().unwrap();
        let ca = test_ca();
        let cert_path = dir.path().join("http.crt");
        let key_path = dir.path().join("http.key");
        std::fs::write(&cert_path, "").unwrap();
        std::fs::write(&key_path, ca.private_key().pem()).unwrap();

        let result = load_external_tls_config(&cert_path, &key_path);
        assert!(matches!(result, Err(ServerError::Tls(_))));
    }
}
