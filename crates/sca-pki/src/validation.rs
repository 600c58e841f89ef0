//! Certificate validation utilities.

use chrono::Utc;
use tracing::debug;
use x509_parser::prelude::*;

use crate::error::{Error, Result};
use crate::types::Certificate;

/// Validates a service certificate against the CA certificate that issued it.
///
/// Checks the validity window, that the issuer DN equals the CA subject DN,
/// and the signature.
///
/// # Errors
///
/// Returns [`Error::Expired`], [`Error::NotYetValid`], [`Error::Validation`]
/// or [`Error::SignatureVerification`].
pub fn validate_certificate(cert: &Certificate, ca_cert: &Certificate) -> Result<()> {
    debug!(subject = cert.subject(), "validating certificate");

    check_window(cert)?;

    if cert.issuer_dn() != ca_cert.subject_dn() {
        return Err(Error::Validation(format!(
            "issuer '{}' does not match CA subject '{}'",
            cert.issuer_dn(),
            ca_cert.subject_dn()
        )));
    }

    verify_signature(cert, ca_cert)
}

/// Validates a self-signed CA certificate.
///
/// # Errors
///
/// Returns an error if the certificate is outside its validity window, is not
/// self-issued, or its signature does not verify with its own key.
pub fn validate_self_signed(cert: &Certificate) -> Result<()> {
    check_window(cert)?;
    if cert.issuer_dn() != cert.subject_dn() {
        return Err(Error::Validation("certificate is not self-signed".into()));
    }

    verify_signature(cert, cert)
}

fn check_window(cert: &Certificate) -> Result<()> {
    let now = Utc::now();
    if cert.not_after() < now {
        return Err(Error::Expired);
    }
    if cert.not_before() > now {
        return Err(Error::NotYetValid);
    }
    Ok(())
}

fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    let (_, parsed_cert) = X509Certificate::from_der(cert.der())
        .map_err(|e| Error::Parse(format!("failed to parse certificate: {e}")))?;
    let (_, parsed_issuer) = X509Certificate::from_der(issuer.der())
        .map_err(|e| Error::Parse(format!("failed to parse issuer certificate: {e}")))?;

    parsed_cert
        .verify_signature(Some(parsed_issuer.public_key()))
        .map_err(|e| {
            Error::SignatureVerification(format!(
                "signature verification failed for '{}': {e:?}",
                cert.subject()
            ))
        })
}
