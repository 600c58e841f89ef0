//! Core PKI types for CA key material and certificate issuance.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// PEM label for X.509 certificates.
pub const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// PEM label for PKCS#8 private keys.
pub const PRIVATE_KEY_PEM_LABEL: &str = "PRIVATE KEY";

/// Subject Alternative Name types carried by CA and service certificates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectAltName {
    /// DNS name.
    Dns(String),
    /// IP address.
    Ip(IpAddr),
}

impl std::fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dns(name) => write!(f, "DNS:{name}"),
            Self::Ip(ip) => write!(f, "IP:{ip}"),
        }
    }
}

/// A request to sign a service certificate for a caller-held key.
///
/// The caller keeps its private key; only the public point travels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSigningRequest {
    /// Subject common name.
    pub subject: String,
    /// Requested DNS names.
    pub domains: Vec<String>,
    /// Requested IP addresses, unparsed. Entries that do not parse are dropped at signing time.
    pub addresses: Vec<String>,
    /// SEC1-encoded P-256 public point (compressed or uncompressed).
    pub public_key: Vec<u8>,
}

impl CertificateSigningRequest {
    /// Creates a new signing request builder.
    #[must_use]
    pub fn builder(subject: impl Into<String>) -> CertificateSigningRequestBuilder {
        CertificateSigningRequestBuilder {
            request: Self {
                subject: subject.into(),
                domains: Vec::new(),
                addresses: Vec::new(),
                public_key: Vec::new(),
            },
        }
    }
}

/// Builder for signing requests.
#[derive(Debug)]
pub struct CertificateSigningRequestBuilder {
    request: CertificateSigningRequest,
}

impl CertificateSigningRequestBuilder {
    /// Adds a requested DNS name.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.request.domains.push(domain.into());
        self
    }

    /// Adds a requested IP address string.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.request.addresses.push(address.into());
        self
    }

    /// Sets the SEC1-encoded public key.
    #[must_use]
    pub fn public_key(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.request.public_key = public_key.into();
        self
    }

    /// Finishes the request.
    #[must_use]
    pub fn build(self) -> CertificateSigningRequest {
        self.request
    }
}

/// A certificate signed by the CA, as returned to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    der: Vec<u8>,
}

impl IssuedCertificate {
    pub(crate) const fn new(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// Returns the DER-encoded certificate bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Consumes the certificate, returning the DER bytes.
    #[must_use]
    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    /// Parses the issued bytes into a [`Certificate`] view.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn parse(&self) -> Result<Certificate> {
        Certificate::from_der(&self.der)
    }
}

impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("len", &self.der.len())
            .finish()
    }
}

/// A DER-encoded X.509 certificate with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// DER-encoded certificate bytes.
    der: Vec<u8>,
    /// Certificate validity start time.
    not_before: DateTime<Utc>,
    /// Certificate validity end time.
    not_after: DateTime<Utc>,
    /// Subject common name.
    subject: String,
    /// Issuer common name.
    issuer: String,
    /// Full subject distinguished name.
    subject_dn: String,
    /// Full issuer distinguished name.
    issuer_dn: String,
    /// Subject alternative names.
    san: Vec<SubjectAltName>,
    /// Raw subject public key (SEC1 point for EC keys).
    public_key: Vec<u8>,
}

impl Certificate {
    /// Parses a certificate from DER-encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        use x509_parser::prelude::*;

        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Parse(format!("failed to parse certificate: {e}")))?;

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| Error::Parse("invalid not_before timestamp".into()))?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| Error::Parse("invalid not_after timestamp".into()))?;

        Ok(Self {
            der: der.to_vec(),
            not_before,
            not_after,
            subject: extract_common_name(cert.subject()),
            issuer: extract_common_name(cert.issuer()),
            subject_dn: cert.subject().to_string(),
            issuer_dn: cert.issuer().to_string(),
            san: extract_san(&cert),
            public_key: cert.public_key().subject_public_key.data.to_vec(),
        })
    }

    /// Parses the first `CERTIFICATE` block of a PEM document.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or holds something else.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
            .map_err(|e| Error::Parse(format!("invalid certificate PEM: {e}")))?;
        if pem.label != CERTIFICATE_PEM_LABEL {
            return Err(Error::Parse(format!(
                "expected {CERTIFICATE_PEM_LABEL} PEM block, found {}",
                pem.label
            )));
        }
        Self::from_der(&pem.contents)
    }

    /// Returns the DER-encoded certificate bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded certificate.
    #[must_use]
    pub fn pem(&self) -> String {
        encode_pem(CERTIFICATE_PEM_LABEL, &self.der)
    }

    /// Returns the certificate validity start time.
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Returns the certificate validity end time.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns the subject common name, empty if the subject has none.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the issuer common name, empty if the issuer has none.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the full subject distinguished name.
    #[must_use]
    pub fn subject_dn(&self) -> &str {
        &self.subject_dn
    }

    /// Returns the full issuer distinguished name.
    #[must_use]
    pub fn issuer_dn(&self) -> &str {
        &self.issuer_dn
    }

    /// Returns the subject alternative names.
    #[must_use]
    pub fn san(&self) -> &[SubjectAltName] {
        &self.san
    }

    /// Returns the raw subject public key bytes.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns `true` if the SANs list the given DNS name.
    #[must_use]
    pub fn covers_domain(&self, domain: &str) -> bool {
        self.san
            .iter()
            .any(|san| matches!(san, SubjectAltName::Dns(d) if d.eq_ignore_ascii_case(domain)))
    }

    /// Returns `true` if the SANs list the given IP address.
    #[must_use]
    pub fn covers_ip(&self, ip: IpAddr) -> bool {
        self.san
            .iter()
            .any(|san| matches!(san, SubjectAltName::Ip(i) if *i == ip))
    }
}

/// Extracts the common name from an X.509 name.
fn extract_common_name(name: &x509_parser::x509::X509Name) -> String {
    name.iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(String::from)
        .unwrap_or_default()
}

/// Extracts SANs from a certificate.
fn extract_san(cert: &x509_parser::certificate::X509Certificate) -> Vec<SubjectAltName> {
    let mut sans = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                x509_parser::extensions::GeneralName::DNSName(dns) => {
                    sans.push(SubjectAltName::Dns((*dns).to_string()));
                }
                x509_parser::extensions::GeneralName::IPAddress(ip_bytes) => {
                    if let Some(ip) = parse_ip_bytes(ip_bytes) {
                        sans.push(SubjectAltName::Ip(ip));
                    }
                }
                _ => {}
            }
        }
    }

    sans
}

/// Parses IP address bytes into an `IpAddr`.
fn parse_ip_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

/// A PKCS#8 private key with secure memory handling.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    /// DER-encoded private key bytes.
    der: Vec<u8>,
}

impl PrivateKey {
    /// Creates a new private key from PKCS#8 DER bytes.
    #[must_use]
    pub const fn new(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// Returns the DER-encoded private key bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded private key.
    #[must_use]
    pub fn pem(&self) -> String {
        encode_pem(PRIVATE_KEY_PEM_LABEL, &self.der)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("der", &"[REDACTED]")
            .finish()
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self {
            der: self.der.clone(),
        }
    }
}

fn encode_pem(label: &str, der: &[u8]) -> String {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    format!(
        "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
        b64.as_bytes()
            .chunks(64)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n")
    )
}
