//! Credential digests for compare-based authentication.

use aws_lc_rs::digest;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ldx_model::credential::Credential;

/// Digest scheme used to hash credentials, named by its `userPassword` label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestScheme {
    /// `{SHA}`, the historical default.
    #[default]
    Sha1,
    /// `{SHA256}`.
    Sha256,
    /// `{SHA512}`.
    Sha512,
}

impl DigestScheme {
    /// The `userPassword` scheme label, braces included.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha1 => "{SHA}",
            Self::Sha256 => "{SHA256}",
            Self::Sha512 => "{SHA512}",
        }
    }

    fn algorithm(self) -> &'static digest::Algorithm {
        match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha512 => &digest::SHA512,
        }
    }
}

/// Formats a credential as `{scheme}base64(digest)`, the form directory
/// servers store in `userPassword`.
#[must_use]
pub fn hash_credential(scheme: DigestScheme, credential: &Credential) -> String {
    let hashed = digest::digest(scheme.algorithm(), credential.as_bytes());
    format!("{}{}", scheme.label(), BASE64.encode(hashed.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_matches_the_openldap_form() {
        let credential = Credential::from("password");
        assert_eq!(
            hash_credential(DigestScheme::Sha1, &credential),
            "{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g="
        );
    }

    #[test]
    fn sha256_matches_the_openldap_form() {
        let credential = Credential::from("password");
        assert_eq!(
            hash_credential(DigestScheme::Sha256, &credential),
            "{SHA256}XohImNooBHFR0OVvjcYpJ3NgPQ1qq73WKhHvch0VQtg="
        );
    }

    #[test]
    fn labels() {
        assert_eq!(DigestScheme::Sha1.label(), "{SHA}");
        assert_eq!(DigestScheme::Sha512.label(), "{SHA512}");
    }
}
