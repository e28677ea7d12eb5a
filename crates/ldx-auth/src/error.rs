//! Authentication error types.

use ldx_provider::error::ProviderError;

/// Result type of authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Error raised by the authentication subsystem.
///
/// Expected negative outcomes (wrong credential, unknown user) are values in
/// [`AuthenticationResponse`](crate::types::AuthenticationResponse), never
/// errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// A directory operation failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// DN resolution matched more than one entry where one was required.
    #[error("ambiguous DN: user {0} matched more than one entry")]
    AmbiguousDn(String),

    /// An authorization handler denied the authenticated identity.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Component configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A persistent resolver was used outside its
    /// `initialize`/`close` window.
    #[error("resolver is not initialized")]
    NotInitialized,
}

impl AuthError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this error invites a retry on a fresh connection.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Provider(err) if err.is_retry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldx_model::result_code::ResultCode;
    use ldx_provider::error::{ErrorKind, OperationFailure};

    #[test]
    fn retry_classification_passes_through() {
        let failure = OperationFailure::from_kind(ErrorKind::Busy, "busy");
        let retry: AuthError = failure.into_error(&[ResultCode::Busy]).into();
        assert!(retry.is_retry());

        assert!(!AuthError::AmbiguousDn("jdoe".into()).is_retry());
        assert!(!AuthError::configuration("bad template").is_retry());
    }
}
