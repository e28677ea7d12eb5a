//! Error taxonomy and retry classification.
//!
//! Expected negative outcomes (invalid credentials, compare-false, an entry
//! that does not exist) are values carried in responses, never errors. An
//! error means the operation could not run or could not complete.

use std::time::Duration;

use ldx_model::control::ResponseControl;
use ldx_model::result_code::ResultCode;
use ldx_model::sasl::Mechanism;

/// Result type of provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Closed set of failure categories a backend maps its native failures onto.
///
/// Backends translate native errors to a kind first and only then to a
/// [`ResultCode`], so the native-to-logical mapping lives in one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorKind {
    /// Authentication was rejected by the server.
    Authentication,
    /// The target entry does not exist.
    NoSuchEntry,
    /// The filter could not be parsed or applied.
    InvalidFilter,
    /// The operation exceeded a time limit.
    Timeout,
    /// The connection is closed or was lost mid-operation.
    ConnectionClosed,
    /// The server refused to establish or keep the connection.
    ConnectFailed,
    /// The server is up but cannot service the operation.
    Unavailable,
    /// The server is too busy to service the operation.
    Busy,
    /// A referral was received where the policy forbids one.
    Referral,
    /// Request or response bytes could not be encoded.
    Encoding,
    /// Response bytes could not be decoded.
    Decoding,
    /// A failure on the client side with no server involvement.
    Local,
    /// The server reported a code with its own meaning; carried verbatim.
    Server(ResultCode),
}

impl ErrorKind {
    /// Returns the logical result code for this failure category.
    #[must_use]
    pub const fn result_code(self) -> ResultCode {
        match self {
            Self::Authentication => ResultCode::InvalidCredentials,
            Self::NoSuchEntry => ResultCode::NoSuchObject,
            Self::InvalidFilter => ResultCode::FilterError,
            Self::Timeout => ResultCode::LdapTimeout,
            Self::ConnectionClosed => ResultCode::ServerDown,
            Self::ConnectFailed => ResultCode::ConnectError,
            Self::Unavailable => ResultCode::Unavailable,
            Self::Busy => ResultCode::Busy,
            Self::Referral => ResultCode::Referral,
            Self::Encoding => ResultCode::EncodingError,
            Self::Decoding => ResultCode::DecodingError,
            Self::Local => ResultCode::LocalError,
            Self::Server(code) => code,
        }
    }
}

/// The detail of a failed operation.
///
/// Carries everything the server reported, including response controls and
/// referral URLs; the failure path loses nothing the success path keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    /// Translated result code.
    pub result_code: ResultCode,
    /// Diagnostic message.
    pub message: String,
    /// Matched DN reported by the server, if any.
    pub matched_dn: Option<String>,
    /// Response controls received with the failure.
    pub controls: Vec<ResponseControl>,
    /// Referral URLs received with the failure.
    pub referral_urls: Vec<String>,
}

impl OperationFailure {
    /// Creates a failure with a code and message.
    #[must_use]
    pub fn new(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            result_code,
            message: message.into(),
            matched_dn: None,
            controls: Vec::new(),
            referral_urls: Vec::new(),
        }
    }

    /// Creates a failure from a failure category.
    #[must_use]
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind.result_code(), message)
    }

    /// Attaches response controls.
    #[must_use]
    pub fn with_controls(mut self, controls: Vec<ResponseControl>) -> Self {
        self.controls = controls;
        self
    }

    /// Attaches referral URLs.
    #[must_use]
    pub fn with_referrals(mut self, referral_urls: Vec<String>) -> Self {
        self.referral_urls = referral_urls;
        self
    }

    /// Attaches the matched DN.
    #[must_use]
    pub fn with_matched_dn(mut self, matched_dn: impl Into<String>) -> Self {
        self.matched_dn = Some(matched_dn.into());
        self
    }

    /// Classifies this failure against a retry code set.
    ///
    /// Codes in the set produce [`ProviderError::Retry`]; everything else is
    /// terminal.
    #[must_use]
    pub fn into_error(self, retry_codes: &[ResultCode]) -> ProviderError {
        if retry_codes.contains(&self.result_code) {
            ProviderError::Retry(self)
        } else {
            ProviderError::Operation(self)
        }
    }
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result_code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Error raised by provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The operation failed and retrying it cannot help.
    #[error("operation failed: {0}")]
    Operation(OperationFailure),

    /// The operation failed with a code in the configured retry set; a fresh
    /// connection may succeed.
    #[error("operation failed (retryable): {0}")]
    Retry(OperationFailure),

    /// The request or component configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A request control no registered handler can encode.
    #[error("unsupported request control: {0}")]
    UnsupportedControl(String),

    /// A SASL mechanism this backend does not implement.
    #[error("unsupported SASL mechanism: {0}")]
    UnsupportedMechanism(Mechanism),
}

impl ProviderError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this error invites a retry on a fresh connection.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }

    /// Returns the operation failure detail, when there is one.
    #[must_use]
    pub const fn failure(&self) -> Option<&OperationFailure> {
        match self {
            Self::Operation(failure) | Self::Retry(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns the translated result code, when there is one.
    #[must_use]
    pub fn result_code(&self) -> Option<ResultCode> {
        self.failure().map(|f| f.result_code)
    }
}

/// How many times, and how patiently, callers retry a [`ProviderError::Retry`].
///
/// The retry itself is performed by whichever component owns connection
/// acquisition; it reopens a fresh connection per attempt. Backends only
/// classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. 1 disables retry.
    pub attempts: u32,
    /// Delay before each retry attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self { attempts: 1, backoff: Duration::ZERO }
    }

    /// Delay before the given retry attempt (1-based), linear backoff.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, backoff: Duration::from_millis(100) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_table_is_stable() {
        assert_eq!(ErrorKind::Authentication.result_code(), ResultCode::InvalidCredentials);
        assert_eq!(ErrorKind::ConnectionClosed.result_code(), ResultCode::ServerDown);
        assert_eq!(ErrorKind::Timeout.result_code(), ResultCode::LdapTimeout);
        assert_eq!(
            ErrorKind::Server(ResultCode::UnwillingToPerform).result_code(),
            ResultCode::UnwillingToPerform
        );
    }

    #[test]
    fn retry_split_follows_the_code_set() {
        let retry_codes = [ResultCode::Busy, ResultCode::Unavailable];

        let busy = OperationFailure::from_kind(ErrorKind::Busy, "server busy");
        assert!(busy.into_error(&retry_codes).is_retry());

        let auth = OperationFailure::from_kind(ErrorKind::Authentication, "bad password");
        let err = auth.into_error(&retry_codes);
        assert!(!err.is_retry());
        assert_eq!(err.result_code(), Some(ResultCode::InvalidCredentials));
    }

    #[test]
    fn failure_keeps_server_detail() {
        let failure = OperationFailure::new(ResultCode::NoSuchObject, "no such object")
            .with_matched_dn("dc=example,dc=org")
            .with_referrals(vec!["ldap://other.example.org".into()]);
        assert_eq!(failure.matched_dn.as_deref(), Some("dc=example,dc=org"));
        assert_eq!(failure.referral_urls.len(), 1);
        assert_eq!(failure.to_string(), "NoSuchObject(32): no such object");
    }

    #[test]
    fn retry_policy_backoff_is_linear() {
        let policy = RetryPolicy { attempts: 3, backoff: Duration::from_millis(50) };
        assert_eq!(policy.delay(1), Duration::from_millis(50));
        assert_eq!(policy.delay(2), Duration::from_millis(100));
        assert_eq!(RetryPolicy::none().attempts, 1);
    }
}
