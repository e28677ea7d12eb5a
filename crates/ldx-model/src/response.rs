//! The generic operation response envelope.

use serde::{Deserialize, Serialize};

use crate::control::ResponseControl;
use crate::result_code::ResultCode;

/// Outcome of a directory operation.
///
/// Constructed once by the backend and never mutated afterwards. Response
/// controls and referral URLs are carried on failures exactly as on
/// successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<T> {
    /// Operation result value, when the operation produces one.
    pub result: Option<T>,
    /// Protocol result code.
    pub result_code: ResultCode,
    /// Server diagnostic message, empty when the server sent none.
    pub diagnostic_message: String,
    /// Matched DN reported by the server, if any.
    pub matched_dn: Option<String>,
    /// Response controls.
    pub controls: Vec<ResponseControl>,
    /// Referral URLs.
    pub referral_urls: Vec<String>,
}

impl<T> Response<T> {
    /// Creates a response with just a result and code.
    #[must_use]
    pub fn new(result: Option<T>, result_code: ResultCode) -> Self {
        Self {
            result,
            result_code,
            diagnostic_message: String::new(),
            matched_dn: None,
            controls: Vec::new(),
            referral_urls: Vec::new(),
        }
    }

    /// Creates a success response carrying a result value.
    #[must_use]
    pub fn success(result: T) -> Self {
        Self::new(Some(result), ResultCode::Success)
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

    /// Attaches a diagnostic message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.diagnostic_message = message.into();
        self
    }

    /// Whether the result code reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }

    /// Maps the result value, keeping everything else.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            result: self.result.map(f),
            result_code: self.result_code,
            diagnostic_message: self.diagnostic_message,
            matched_dn: self.matched_dn,
            controls: self.controls,
            referral_urls: self.referral_urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{PagedResultsControl, ResponseControl};

    #[test]
    fn success_response() {
        let response = Response::success(true);
        assert!(response.is_success());
        assert_eq!(response.result, Some(true));
        assert!(response.controls.is_empty());
    }

    #[test]
    fn map_preserves_envelope() {
        let response = Response::new(Some(3), ResultCode::SizeLimitExceeded)
            .with_message("size limit exceeded")
            .with_controls(vec![ResponseControl::PagedResults(PagedResultsControl::new(5))]);
        let mapped = response.map(|n| n * 2);
        assert_eq!(mapped.result, Some(6));
        assert_eq!(mapped.result_code, ResultCode::SizeLimitExceeded);
        assert_eq!(mapped.diagnostic_message, "size limit exceeded");
        assert_eq!(mapped.controls.len(), 1);
    }
}
