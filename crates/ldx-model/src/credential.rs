//! Bind credentials.

use serde::{Deserialize, Serialize, Serializer};

/// An opaque byte credential.
///
/// Credentials never appear in logs or serialized output: `Debug` is
/// redacted and serialization always emits a placeholder.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(Vec<u8>);

impl Credential {
    /// Creates a credential from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the credential bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the credential as UTF-8, if it is valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Whether the credential is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl Serialize for Credential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_redacted() {
        let credential = Credential::from("s3cret");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
    }

    #[test]
    fn serialization_is_redacted() {
        let credential = Credential::from("s3cret");
        assert_eq!(serde_json::to_string(&credential).unwrap(), "\"***\"");
    }

    #[test]
    fn bytes_round_trip() {
        let credential = Credential::new(vec![0x00, 0xff]);
        assert_eq!(credential.as_bytes(), &[0x00, 0xff]);
        assert_eq!(credential.as_str(), None);
        assert_eq!(Credential::from("pw").as_str(), Some("pw"));
    }

    #[test]
    fn empty_credential() {
        assert!(Credential::from("").is_empty());
        assert!(!Credential::from("x").is_empty());
    }
}
