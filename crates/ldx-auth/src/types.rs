//! Authentication request and response types.

use ldx_model::credential::Credential;
use ldx_model::entry::LdapEntry;
use ldx_model::result_code::ResultCode;
use ldx_provider::connection::Connection;
use serde::{Deserialize, Serialize};

/// What a caller submits to an [`Authenticator`](crate::Authenticator): a
/// user identifier and the credential to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationRequest {
    /// User identifier, resolved to a DN before authentication.
    pub user: String,
    /// Credential to verify.
    pub credential: Credential,
}

impl AuthenticationRequest {
    /// Creates an authentication request.
    #[must_use]
    pub fn new(user: impl Into<String>, credential: Credential) -> Self {
        Self { user: user.into(), credential }
    }
}

/// A resolved identity handed to an
/// [`AuthenticationHandler`](crate::AuthenticationHandler): the DN the user
/// resolved to, plus the credential from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationCriteria {
    /// Resolved DN.
    pub dn: String,
    /// Credential to verify.
    pub credential: Credential,
}

impl AuthenticationCriteria {
    /// Creates authentication criteria.
    #[must_use]
    pub fn new(dn: impl Into<String>, credential: Credential) -> Self {
        Self { dn: dn.into(), credential }
    }
}

/// Final outcome of an authentication attempt.
///
/// `success` is the single source of truth; the result code and message
/// explain a negative outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    /// Whether the user authenticated and passed all authorization handlers.
    pub success: bool,
    /// Result code explaining the outcome.
    pub result_code: ResultCode,
    /// Diagnostic message, empty when there is nothing to explain.
    pub diagnostic_message: String,
    /// DN the user resolved to, when resolution succeeded.
    pub dn: Option<String>,
    /// Entry of the authenticated user, when entry resolution ran.
    pub entry: Option<LdapEntry>,
}

impl AuthenticationResponse {
    /// Creates a negative response with no DN and no entry.
    #[must_use]
    pub fn negative(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result_code,
            diagnostic_message: message.into(),
            dn: None,
            entry: None,
        }
    }
}

/// Outcome of an [`AuthenticationHandler`](crate::AuthenticationHandler),
/// carrying the connection the credential was verified on.
///
/// The connection stays open so authorization handlers and entry resolvers
/// can reuse the authenticated context. The authenticator closes it.
pub struct AuthenticationHandlerResponse<C: Connection> {
    /// Whether the credential was accepted.
    pub success: bool,
    /// Result code reported by the directory.
    pub result_code: ResultCode,
    /// Diagnostic message from the directory.
    pub diagnostic_message: String,
    /// The connection the verification was performed on.
    pub connection: C,
}

impl<C: Connection> std::fmt::Debug for AuthenticationHandlerResponse<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationHandlerResponse")
            .field("success", &self.success)
            .field("result_code", &self.result_code)
            .field("diagnostic_message", &self.diagnostic_message)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_response_carries_the_reason() {
        let response =
            AuthenticationResponse::negative(ResultCode::InvalidCredentials, "rejected");
        assert!(!response.success);
        assert_eq!(response.result_code, ResultCode::InvalidCredentials);
        assert_eq!(response.diagnostic_message, "rejected");
        assert!(response.dn.is_none());
        assert!(response.entry.is_none());
    }

    #[test]
    fn request_never_serializes_the_credential() {
        let request = AuthenticationRequest::new("jdoe", Credential::from("s3cret"));
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(json.contains("***"));
    }
}
