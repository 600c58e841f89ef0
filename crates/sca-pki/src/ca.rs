//! CA key material and service certificate issuance.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::Rng;
use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, Issuer, KeyPair, KeyUsagePurpose, PKCS_ECDSA_P256_SHA256, PublicKeyData, SanType,
    SerialNumber, SignatureAlgorithm,
};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Certificate, CertificateSigningRequest, IssuedCertificate, PrivateKey};

/// Common name of the CA certificate.
pub const CA_COMMON_NAME: &str = "CA";

/// Organization placed in the CA subject when none is configured.
pub const DEFAULT_ORGANIZATION: &str = "Services CA";

/// Validity of the CA certificate, in days.
pub const CA_VALIDITY_DAYS: i64 = 370;

/// Validity of issued service certificates, in days. Not caller-configurable.
pub const SERVICE_CERT_VALIDITY_DAYS: i64 = 730;

/// How the CA key material came to exist in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialOrigin {
    /// Read back from the working directory.
    Loaded,
    /// Freshly generated and written to the working directory.
    Generated,
    /// Freshly generated, but writing it to disk failed. Usable for this run only.
    GeneratedUnpersisted(String),
}

impl MaterialOrigin {
    /// Returns `true` if the material exists on disk.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        !matches!(self, Self::GeneratedUnpersisted(_))
    }
}

/// The CA's private key and self-signed certificate.
///
/// Immutable once built; share it behind an `Arc` with every handler.
pub struct CaKeyMaterial {
    certificate: Certificate,
    private_key: PrivateKey,
    issuer: Issuer<'static, KeyPair>,
    origin: MaterialOrigin,
}

impl CaKeyMaterial {
    /// Generates a new P-256 key and a self-signed CA certificate.
    ///
    /// The certificate names `domain` and `public_ip` as SANs and is valid for
    /// [`CA_VALIDITY_DAYS`] days from now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if the key or certificate cannot be produced.
    pub fn generate(domain: &str, public_ip: IpAddr, organization: &str) -> Result<Self> {
        info!(domain, %public_ip, "generating CA key material");

        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| Error::Generation(format!("failed to generate key pair: {e}")))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::OrganizationName, organization);
        params
            .distinguished_name
            .push(DnType::CommonName, CA_COMMON_NAME);
        params.subject_alt_names = convert_sans(&[domain.to_string()], &[public_ip])?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        // The CA certificate doubles as the server certificate of the RPC listener.
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.serial_number = Some(random_serial());

        let now = Utc::now();
        params.not_before = to_rcgen_time(now)?;
        params.not_after = to_rcgen_time(now + Duration::days(CA_VALIDITY_DAYS))?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Generation(format!("failed to self-sign CA certificate: {e}")))?;

        let certificate = Certificate::from_der(cert.der())?;
        let private_key = PrivateKey::new(key_pair.serialize_der());
        let issuer = Issuer::new(params, key_pair);

        debug!(subject = certificate.subject_dn(), "CA certificate created");

        Ok(Self {
            certificate,
            private_key,
            issuer,
            origin: MaterialOrigin::Generated,
        })
    }

    /// Rebuilds key material from a PEM certificate and a PEM PKCS#8 key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if either document is malformed or the key is
    /// not ECDSA P-256, and [`Error::KeyMismatch`] if the key does not belong
    /// to the certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certificate = Certificate::from_pem(cert_pem)?;

        let key_pem = std::str::from_utf8(key_pem)
            .map_err(|e| Error::Parse(format!("private key is not valid UTF-8: {e}")))?;
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| Error::Parse(format!("failed to parse private key: {e}")))?;
        if *key_pair.algorithm() != PKCS_ECDSA_P256_SHA256 {
            return Err(Error::Parse("CA private key must be ECDSA P-256".into()));
        }
        if key_pair.der_bytes() != certificate.public_key() {
            return Err(Error::KeyMismatch);
        }

        let private_key = PrivateKey::new(key_pair.serialize_der());
        let cert_pem = std::str::from_utf8(cert_pem)
            .map_err(|e| Error::Parse(format!("certificate is not valid UTF-8: {e}")))?;
        let issuer = Issuer::from_ca_cert_pem(cert_pem, key_pair)
            .map_err(|e| Error::Parse(format!("failed to load CA certificate as issuer: {e}")))?;

        Ok(Self {
            certificate,
            private_key,
            issuer,
            origin: MaterialOrigin::Loaded,
        })
    }

    pub(crate) fn with_origin(mut self, origin: MaterialOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Returns the self-signed CA certificate.
    #[must_use]
    pub const fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Returns the CA private key.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Returns where this material came from.
    #[must_use]
    pub const fn origin(&self) -> &MaterialOrigin {
        &self.origin
    }

    /// Signs a service certificate for the public key in `request`.
    ///
    /// Address strings that do not parse as IP addresses are dropped. The
    /// certificate is valid for [`SERVICE_CERT_VALIDITY_DAYS`] days from now.
    /// Nothing about the call is recorded; concurrent calls are independent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the key is not a P-256 point,
    /// [`Error::San`] for a domain that cannot be encoded, and
    /// [`Error::Signing`] if signing fails.
    pub fn sign(&self, request: &CertificateSigningRequest) -> Result<IssuedCertificate> {
        let addresses = parse_addresses(&request.addresses);
        let public_key = RequestPublicKey::from_sec1(&request.public_key)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, request.subject.as_str());
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::KeyAgreement,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.subject_alt_names = convert_sans(&request.domains, &addresses)?;
        params.serial_number = Some(random_serial());
        params.use_authority_key_identifier_extension = true;

        let now = Utc::now();
        params.not_before = to_rcgen_time(now)?;
        params.not_after = to_rcgen_time(now + Duration::days(SERVICE_CERT_VALIDITY_DAYS))?;

        let cert = params
            .signed_by(&public_key, &self.issuer)
            .map_err(|e| Error::Signing(format!("failed to sign certificate: {e}")))?;

        debug!(
            subject = %request.subject,
            domains = request.domains.len(),
            addresses = addresses.len(),
            "service certificate signed"
        );

        Ok(IssuedCertificate::new(cert.der().to_vec()))
    }
}

impl std::fmt::Debug for CaKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaKeyMaterial")
            .field("certificate", &self.certificate.subject_dn())
            .field("private_key", &"[REDACTED]")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Parses requested address strings, dropping the ones that are not IP addresses.
#[must_use]
pub fn parse_addresses(addresses: &[String]) -> Vec<IpAddr> {
    addresses
        .iter()
        .filter_map(|address| match address.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                debug!(address = %address, "dropping unparsable address from signing request");
                None
            }
        })
        .collect()
}

/// Public key of a signing request, normalized to an uncompressed P-256 point.
struct RequestPublicKey {
    point: Vec<u8>,
}

impl RequestPublicKey {
    fn from_sec1(bytes: &[u8]) -> Result<Self> {
        let key = p256::PublicKey::from_sec1_bytes(bytes).map_err(|_| {
            Error::InvalidPublicKey(format!(
                "{} bytes do not encode a P-256 point",
                bytes.len()
            ))
        })?;

        Ok(Self {
            point: key.to_encoded_point(false).as_bytes().to_vec(),
        })
    }
}

impl PublicKeyData for RequestPublicKey {
    fn der_bytes(&self) -> &[u8] {
        &self.point
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_ECDSA_P256_SHA256
    }
}

/// Converts requested names and parsed addresses to rcgen `SanTypes`, domains first.
fn convert_sans(domains: &[String], addresses: &[IpAddr]) -> Result<Vec<SanType>> {
    let mut sans = Vec::with_capacity(domains.len() + addresses.len());
    for domain in domains {
        let ia5 = Ia5String::try_from(domain.clone())
            .map_err(|e| Error::San(format!("invalid DNS name '{domain}': {e}")))?;
        sans.push(SanType::DnsName(ia5));
    }
    sans.extend(addresses.iter().copied().map(SanType::IpAddress));
    Ok(sans)
}

/// Random positive 128-bit serial number.
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

/// Converts a chrono `DateTime` to rcgen `OffsetDateTime`.
fn to_rcgen_time(dt: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|e| Error::Generation(format!("invalid timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubjectAltName;
    use crate::validation::validate_certificate;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn test_ca() -> CaKeyMaterial {
        CaKeyMaterial::generate(
            "svc.example.com",
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            DEFAULT_ORGANIZATION,
        )
        .unwrap()
    }

    fn service_public_key() -> Vec<u8> {
        KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .unwrap()
            .public_key_raw()
            .to_vec()
    }

    #[test]
    fn generated_ca_names_domain_and_ip() {
        let ca = test_ca();
        let cert = ca.certificate();

        assert_eq!(cert.subject(), CA_COMMON_NAME);
        assert_eq!(cert.issuer(), CA_COMMON_NAME);
        assert!(cert.subject_dn().contains(DEFAULT_ORGANIZATION));
        assert_eq!(
            cert.san(),
            &[
                SubjectAltName::Dns("svc.example.com".into()),
                SubjectAltName::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
            ]
        );
        assert_eq!(ca.origin(), &MaterialOrigin::Generated);
    }

    #[test]
    fn generated_ca_is_valid_for_370_days() {
        let ca = test_ca();
        let cert = ca.certificate();

        assert_eq!(cert.not_after() - cert.not_before(), Duration::days(370));
        assert!((cert.not_before() - Utc::now()).num_seconds().abs() < 60);
    }

    #[test]
    fn generated_ca_key_matches_certificate() {
        let ca = test_ca();
        let key = KeyPair::from_pem(&ca.private_key().pem()).unwrap();
        assert_eq!(key.public_key_raw(), ca.certificate().public_key());
    }

    #[test]
    fn sign_drops_malformed_addresses() {
        let ca = test_ca();
        let request = CertificateSigningRequest::builder("a")
            .domain("a.svc")
            .address("10.0.0.9")
            .address("not-an-ip")
            .public_key(service_public_key())
            .build();

        let cert = ca.sign(&request).unwrap().parse().unwrap();

        assert_eq!(
            cert.san(),
            &[
                SubjectAltName::Dns("a.svc".into()),
                SubjectAltName::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))),
            ]
        );
    }

    #[test]
    fn issued_certificate_is_issued_by_ca() {
        let ca = test_ca();
        let request = CertificateSigningRequest::builder("tokens")
            .domain("tokens.svc")
            .public_key(service_public_key())
            .build();

        let cert = ca.sign(&request).unwrap().parse().unwrap();

        assert_eq!(cert.subject(), "tokens");
        assert_eq!(cert.issuer_dn(), ca.certificate().subject_dn());
        validate_certificate(&cert, ca.certificate()).unwrap();
    }

    #[test]
    fn issued_certificate_is_valid_for_730_days() {
        let ca = test_ca();
        let request = CertificateSigningRequest::builder("apps")
            .public_key(service_public_key())
            .build();

        let cert = ca.sign(&request).unwrap().parse().unwrap();

        assert_eq!(cert.not_after() - cert.not_before(), Duration::days(730));
        assert!((cert.not_before() - Utc::now()).num_seconds().abs() < 60);
    }

    #[test]
    fn issued_certificate_carries_request_key() {
        let ca = test_ca();
        let public_key = service_public_key();
        let request = CertificateSigningRequest::builder("apps")
            .public_key(public_key.clone())
            .build();

        let cert = ca.sign(&request).unwrap().parse().unwrap();

        assert_eq!(cert.public_key(), public_key.as_slice());
    }

    #[test]
    fn sign_accepts_compressed_points() {
        let ca = test_ca();
        let uncompressed = service_public_key();
        let compressed = p256::PublicKey::from_sec1_bytes(&uncompressed)
            .unwrap()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let request = CertificateSigningRequest::builder("discovery")
            .public_key(compressed)
            .build();

        let cert = ca.sign(&request).unwrap().parse().unwrap();

        assert_eq!(cert.public_key(), uncompressed.as_slice());
    }

    #[test]
    fn sign_rejects_invalid_public_keys() {
        let ca = test_ca();

        let mut off_curve = vec![0x04];
        off_curve.extend_from_slice(&[0x01; 64]);

        for key in [Vec::new(), vec![1, 2, 3], off_curve] {
            let request = CertificateSigningRequest::builder("x").public_key(key).build();
            assert!(matches!(ca.sign(&request), Err(Error::InvalidPublicKey(_))));
        }
    }

    #[test]
    fn sign_rejects_non_ascii_domains() {
        let ca = test_ca();
        let request = CertificateSigningRequest::builder("x")
            .domain("bücher.example")
            .public_key(service_public_key())
            .build();

        assert!(matches!(ca.sign(&request), Err(Error::San(_))));
    }

    #[test]
    fn pem_round_trip_preserves_material() {
        let ca = test_ca();
        let cert_pem = ca.certificate().pem();
        let key_pem = ca.private_key().pem();

        let loaded = CaKeyMaterial::from_pem(cert_pem.as_bytes(), key_pem.as_bytes()).unwrap();

        assert_eq!(loaded.certificate().der(), ca.certificate().der());
        assert_eq!(loaded.private_key().der(), ca.private_key().der());
        assert_eq!(loaded.origin(), &MaterialOrigin::Loaded);

        // Certificates issued by the reloaded CA chain to the first certificate.
        let request = CertificateSigningRequest::builder("accounts")
            .public_key(service_public_key())
            .build();
        let cert = loaded.sign(&request).unwrap().parse().unwrap();
        validate_certificate(&cert, ca.certificate()).unwrap();
    }

    #[test]
    fn from_pem_rejects_mismatched_key() {
        let ca1 = test_ca();
        let ca2 = test_ca();

        let result = CaKeyMaterial::from_pem(
            ca1.certificate().pem().as_bytes(),
            ca2.private_key().pem().as_bytes(),
        );

        assert!(matches!(result, Err(Error::KeyMismatch)));
    }

    #[test]
    fn from_pem_rejects_non_p256_key() {
        let ca = test_ca();
        let ed25519 = KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();

        let result =
            CaKeyMaterial::from_pem(ca.certificate().pem().as_bytes(), ed25519.serialize_pem().as_bytes());

        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn concurrent_issuance_is_independent() {
        let ca = Arc::new(test_ca());

        let certs: Vec<Certificate> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let ca = Arc::clone(&ca);
                    scope.spawn(move || {
                        let request = CertificateSigningRequest::builder(format!("svc-{i}"))
                            .domain(format!("svc-{i}.internal"))
                            .public_key(service_public_key())
                            .build();
                        ca.sign(&request).unwrap().parse().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<Vec<u8>> = certs.iter().map(|c| c.der().to_vec()).collect();
        assert_eq!(distinct.len(), 8);
        for (i, cert) in certs.iter().enumerate() {
            assert_eq!(cert.subject(), format!("svc-{i}"));
            validate_certificate(cert, ca.certificate()).unwrap();
        }
    }

    #[test]
    fn ca_debug_redacts_key() {
        let ca = test_ca();
        let debug = format!("{ca:?}");
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn origin_persistence_flag() {
        assert!(MaterialOrigin::Loaded.is_persisted());
        assert!(MaterialOrigin::Generated.is_persisted());
        assert!(!MaterialOrigin::GeneratedUnpersisted("read-only".into()).is_persisted());
    }

    proptest! {
        #[test]
        fn parse_addresses_keeps_exactly_the_valid_entries(
            entries in proptest::collection::vec(
                prop_oneof![
                    any::<[u8; 4]>().prop_map(|o| Ipv4Addr::from(o).to_string()),
                    "[a-z0-9.:-]{0,16}",
                ],
                0..12,
            )
        ) {
            let parsed = parse_addresses(&entries);
            let expected: Vec<IpAddr> = entries.iter().filter_map(|e| e.parse().ok()).collect();
            prop_assert_eq!(parsed, expected);
        }
    }
}
