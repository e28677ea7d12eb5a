//! SASL bind configuration.

use serde::{Deserialize, Serialize};

/// SASL mechanism.
///
/// Mechanism support is a backend capability; a backend that does not
/// implement a mechanism rejects the bind before touching the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Mechanism {
    /// EXTERNAL: identity established by the transport (e.g. TLS client cert).
    External,
    /// DIGEST-MD5 challenge/response.
    DigestMd5,
    /// CRAM-MD5 challenge/response.
    CramMd5,
    /// GSSAPI (Kerberos).
    GssApi,
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::External => "EXTERNAL",
            Self::DigestMd5 => "DIGEST-MD5",
            Self::CramMd5 => "CRAM-MD5",
            Self::GssApi => "GSSAPI",
        })
    }
}

/// Quality of protection negotiated by a SASL bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityOfProtection {
    /// Authentication only.
    Auth,
    /// Authentication with integrity protection.
    AuthInt,
    /// Authentication with integrity and confidentiality protection.
    AuthConf,
}

impl std::fmt::Display for QualityOfProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Auth => "auth",
            Self::AuthInt => "auth-int",
            Self::AuthConf => "auth-conf",
        })
    }
}

/// Configuration of a SASL bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaslConfig {
    /// Mechanism to bind with.
    pub mechanism: Mechanism,
    /// Authorization identity, when different from the authentication identity.
    pub authorization_id: Option<String>,
    /// Realm, for mechanisms that use one.
    pub realm: Option<String>,
    /// Requested quality of protection.
    pub quality_of_protection: Option<QualityOfProtection>,
}

impl SaslConfig {
    /// Creates a config for the given mechanism with no optional properties.
    #[must_use]
    pub fn new(mechanism: Mechanism) -> Self {
        Self { mechanism, authorization_id: None, realm: None, quality_of_protection: None }
    }

    /// Creates an EXTERNAL config.
    #[must_use]
    pub fn external() -> Self {
        Self::new(Mechanism::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanism_names_match_sasl_registry() {
        assert_eq!(Mechanism::External.to_string(), "EXTERNAL");
        assert_eq!(Mechanism::DigestMd5.to_string(), "DIGEST-MD5");
        assert_eq!(Mechanism::CramMd5.to_string(), "CRAM-MD5");
        assert_eq!(Mechanism::GssApi.to_string(), "GSSAPI");
    }

    #[test]
    fn qop_names() {
        assert_eq!(QualityOfProtection::AuthConf.to_string(), "auth-conf");
    }
}
