//! Wire types of the issuance RPC and the HTTP responder.

use std::net::SocketAddr;
use std::sync::Arc;

use sca_pki::{Certificate, CertificateSigningRequest};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/sign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCertificateRequest {
    /// The signing request.
    pub csr: CsrPayload,
}

/// A signing request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrPayload {
    /// Common name of the certificate.
    pub subject: String,
    /// DNS names to include.
    #[serde(default)]
    pub domains: Vec<String>,
    /// IP addresses to include; entries that do not parse are dropped.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// SEC1-encoded P-256 public key.
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

impl From<CsrPayload> for CertificateSigningRequest {
    fn from(payload: CsrPayload) -> Self {
        Self {
            subject: payload.subject,
            domains: payload.domains,
            addresses: payload.addresses,
            public_key: payload.public_key,
        }
    }
}

/// Body of a successful `POST /v1/sign` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCertificateResponse {
    /// DER-encoded issued certificate.
    #[serde(with = "base64_bytes")]
    pub raw_certificate: Vec<u8>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Per-connection facts attached to every request as an extension.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote socket address.
    pub remote_addr: SocketAddr,
    /// Client certificate verified during the TLS handshake, if one was sent.
    pub peer_certificate: Option<Arc<Certificate>>,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"csr":{"subject":"a","domains":["a.svc"],"addresses":["10.0.0.9","not-an-ip"],"public_key":"BAEC"}}"#;
        let request: SignCertificateRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.csr.subject, "a");
        assert_eq!(request.csr.domains, vec!["a.svc"]);
        assert_eq!(request.csr.addresses, vec!["10.0.0.9", "not-an-ip"]);
        assert_eq!(request.csr.public_key, vec![4, 1, 2]);
    }

    #[test]
    fn test_optional_lists_default_to_empty() {
        let json = r#"{"csr":{"subject":"a","public_key":""}}"#;
        let request: SignCertificateRequest = serde_json::from_str(json).unwrap();

        assert!(request.csr.domains.is_empty());
        assert!(request.csr.addresses.is_empty());
        assert!(request.csr.public_key.is_empty());
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let json = r#"{"csr":{"subject":"a","public_key":"***"}}"#;
        assert!(serde_json::from_str::<SignCertificateRequest>(json).is_err());
    }

    #[test]
    fn test_response_serialization() {
        let response = SignCertificateResponse {
            raw_certificate: vec![0x30, 0x82],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["raw_certificate"], "MII=");
    }

    #[test]
    fn test_payload_into_signing_request() {
        let payload = CsrPayload {
            subject: "tokens".into(),
            domains: vec!["tokens.svc".into()],
            addresses: vec!["10.0.0.1".into()],
            public_key: vec![4],
        };

        let request = CertificateSigningRequest::from(payload);
        assert_eq!(request.subject, "tokens");
        assert_eq!(request.domains, vec!["tokens.svc"]);
        assert_eq!(request.public_key, vec![4]);
    }
}
