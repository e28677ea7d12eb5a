//! Backend configuration.

use std::time::Duration;

use ldx_model::result_code::ResultCode;
use ldx_provider::error::{ProviderError, ProviderResult};
use serde::{Deserialize, Serialize};

/// Configuration of the ldap3 backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ldap3Config {
    /// Directory URL, `ldap://` or `ldaps://`.
    pub url: String,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Negotiate STARTTLS after connecting. Only valid with `ldap://`.
    pub starttls: bool,
    /// Skip TLS certificate verification. Test environments only.
    pub no_tls_verify: bool,
    /// Result codes classified as retryable.
    pub retry_codes: Vec<ResultCode>,
    /// Benign result codes that terminate a search instead of failing it.
    pub ignore_search_codes: Vec<ResultCode>,
}

impl Ldap3Config {
    /// Starts building a config for the given URL.
    #[must_use]
    pub fn builder(url: impl Into<String>) -> Ldap3ConfigBuilder {
        Ldap3ConfigBuilder { config: Self { url: url.into(), ..Self::default() } }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// On an unsupported URL scheme or STARTTLS over `ldaps://`.
    pub fn validate(&self) -> ProviderResult<()> {
        let secure = self.url.starts_with("ldaps://");
        if !secure && !self.url.starts_with("ldap://") {
            return Err(ProviderError::configuration(format!(
                "directory URL must start with ldap:// or ldaps://, got {}",
                self.url
            )));
        }
        if self.starttls && secure {
            return Err(ProviderError::configuration(
                "STARTTLS cannot be combined with an ldaps:// URL",
            ));
        }
        Ok(())
    }
}

impl Default for Ldap3Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            starttls: false,
            no_tls_verify: false,
            retry_codes: vec![
                ResultCode::Busy,
                ResultCode::Unavailable,
                ResultCode::ServerDown,
                ResultCode::ConnectError,
            ],
            ignore_search_codes: vec![
                ResultCode::SizeLimitExceeded,
                ResultCode::TimeLimitExceeded,
            ],
        }
    }
}

/// Builder for [`Ldap3Config`].
#[derive(Debug, Clone)]
pub struct Ldap3ConfigBuilder {
    config: Ldap3Config,
}

impl Ldap3ConfigBuilder {
    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Enables STARTTLS negotiation.
    #[must_use]
    pub fn starttls(mut self, starttls: bool) -> Self {
        self.config.starttls = starttls;
        self
    }

    /// Disables TLS certificate verification.
    #[must_use]
    pub fn danger_no_tls_verify(mut self) -> Self {
        self.config.no_tls_verify = true;
        self
    }

    /// Replaces the retryable result code set.
    #[must_use]
    pub fn retry_codes(mut self, codes: Vec<ResultCode>) -> Self {
        self.config.retry_codes = codes;
        self
    }

    /// Replaces the benign search termination code set.
    #[must_use]
    pub fn ignore_search_codes(mut self, codes: Vec<ResultCode>) -> Self {
        self.config.ignore_search_codes = codes;
        self
    }

    /// Validates and returns the config.
    ///
    /// # Errors
    ///
    /// See [`Ldap3Config::validate`].
    pub fn build(self) -> ProviderResult<Ldap3Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
