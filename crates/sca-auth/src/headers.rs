//! Request header names and credential extraction.

use crate::types::IdentityCredential;

/// Header carrying the caller's identity key.
pub const IDENTITY_KEY_HEADER: &str = "x-identity-key";

/// Header carrying the caller's secret.
pub const IDENTITY_SECRET_HEADER: &str = "x-identity-secret";

/// Builds a credential from the two identity headers.
///
/// Returns `None` unless both headers are present and the identity key is not
/// blank. The identity key is trimmed; the secret is taken as sent.
#[must_use]
pub fn extract_credential(
    identity_key: Option<&str>,
    secret: Option<&str>,
) -> Option<IdentityCredential> {
    let identity_key = identity_key?.trim();
    if identity_key.is_empty() {
        return None;
    }
    Some(IdentityCredential::new(identity_key, secret?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn both_headers_present() {
        let credential = extract_credential(Some("tokens"), Some("s3cret")).unwrap();
        assert_eq!(credential.identity_key(), "tokens");
        assert_eq!(credential.secret(), "s3cret");
    }

    #[test]
    fn identity_key_is_trimmed() {
        let credential = extract_credential(Some("  tokens "), Some("s")).unwrap();
        assert_eq!(credential.identity_key(), "tokens");
    }

    #[test]
    fn empty_secret_is_still_a_credential() {
        let credential = extract_credential(Some("tokens"), Some("")).unwrap();
        assert_eq!(credential.secret(), "");
    }

    #[test_case(None, Some("s") ; "missing identity key")]
    #[test_case(Some("tokens"), None ; "missing secret")]
    #[test_case(Some(""), Some("s") ; "empty identity key")]
    #[test_case(Some("   "), Some("s") ; "blank identity key")]
    #[test_case(None, None ; "no headers")]
    fn no_credential(identity_key: Option<&str>, secret: Option<&str>) {
        assert!(extract_credential(identity_key, secret).is_none());
    }
}
