//! Key material and certificate issuance for the services CA.
//!
//! The crate owns the CA's ECDSA P-256 key and self-signed certificate and
//! signs service certificates for raw public keys.
//!
//! # Example
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use sca_pki::{CertificateSigningRequest, KeyMaterialStore, DEFAULT_ORGANIZATION};
//!
//! let store = KeyMaterialStore::new("/var/lib/sca");
//! let ca = store
//!     .load_or_generate(
//!         "ca.example.com",
//!         IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
//!         DEFAULT_ORGANIZATION,
//!     )
//!     .unwrap();
//!
//! # let public_key: Vec<u8> = Vec::new();
//! let request = CertificateSigningRequest::builder("tokens")
//!     .domain("tokens.svc")
//!     .address("10.0.0.9")
//!     .public_key(public_key)
//!     .build();
//! let issued = ca.sign(&request).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`store`] - Working-directory persistence of the CA material
//! - [`ca`] - CA material and service certificate signing
//! - [`validation`] - Certificate validation utilities
//! - [`types`] - Certificates, keys and signing requests
//! - [`error`] - Error types

#![forbid(unsafe_code)]

pub mod ca;
pub mod error;
pub mod store;
pub mod types;
pub mod validation;

pub use ca::{
    CA_COMMON_NAME, CA_VALIDITY_DAYS, CaKeyMaterial, DEFAULT_ORGANIZATION, MaterialOrigin,
    SERVICE_CERT_VALIDITY_DAYS, parse_addresses,
};
pub use error::{Error, Result};
pub use store::{CA_CERT_FILE, CA_KEY_FILE, KeyMaterialStore};
pub use types::{
    Certificate, CertificateSigningRequest, CertificateSigningRequestBuilder, IssuedCertificate,
    PrivateKey, SubjectAltName,
};
pub use validation::{validate_certificate, validate_self_signed};

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256};
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    #[test]
    fn restart_and_issue_workflow() {
        let dir = TempDir::new().unwrap();
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

        // 1. First start creates the CA.
        let store = KeyMaterialStore::new(dir.path());
        let ca = store
            .load_or_generate("svc.example.com", ip, DEFAULT_ORGANIZATION)
            .unwrap();
        let first_der = ca.certificate().der().to_vec();
        drop(ca);

        // 2. Restart reloads the same CA.
        let ca = KeyMaterialStore::new(dir.path())
            .load_or_generate("svc.example.com", ip, DEFAULT_ORGANIZATION)
            .unwrap();
        assert_eq!(ca.certificate().der(), first_der.as_slice());
        assert!(ca.certificate().covers_domain("svc.example.com"));
        assert!(ca.certificate().covers_ip(ip));

        // 3. Issue a service certificate and verify it against the persisted CA.
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let request = CertificateSigningRequest::builder("discovery")
            .domain("discovery.svc")
            .public_key(key.public_key_raw().to_vec())
            .build();
        let cert = ca.sign(&request).unwrap().parse().unwrap();

        let on_disk = std::fs::read(store.cert_path()).unwrap();
        let ca_cert = Certificate::from_pem(&on_disk).unwrap();
        validate_certificate(&cert, &ca_cert).unwrap();
        validate_self_signed(&ca_cert).unwrap();
    }
}
