//! Post-authentication authorization checks.

use ldx_model::filter::SearchFilter;
use ldx_model::request::{CompareRequest, ReturnAttributes, SearchRequest};
use ldx_provider::connection::Connection;
use ldx_provider::search::SearchResults;

use crate::error::{AuthError, AuthResult};

/// Decides whether an authenticated DN may proceed.
///
/// Runs on the connection the credential was verified on. Denial is
/// [`AuthError::NotAuthorized`]; every other error is a fault.
#[allow(async_fn_in_trait)]
pub trait AuthorizationHandler<C: Connection>: Send + Sync {
    /// Authorizes `dn`.
    async fn authorize(&self, dn: &str, connection: &mut C) -> AuthResult<()>;
}

/// Authorizes when the authenticated entry carries an attribute value.
#[derive(Debug, Clone)]
pub struct CompareAuthorizationHandler {
    attribute: String,
    value: String,
}

impl CompareAuthorizationHandler {
    /// Creates a handler requiring `attribute` to hold `value`.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), value: value.into() }
    }
}

impl<C: Connection> AuthorizationHandler<C> for CompareAuthorizationHandler {
    async fn authorize(&self, dn: &str, connection: &mut C) -> AuthResult<()> {
        let request = CompareRequest::new(dn, &self.attribute, &self.value);
        let response = connection.compare(&request).await?;
        if response.result == Some(true) {
            Ok(())
        } else {
            Err(AuthError::NotAuthorized(format!(
                "{dn} does not have {}={}",
                self.attribute, self.value
            )))
        }
    }
}

/// Authorizes when a search filter matches at least one entry.
///
/// `{0}` in the filter template is replaced with the authenticated DN.
#[derive(Debug, Clone)]
pub struct FilterAuthorizationHandler {
    base_dn: String,
    filter: String,
}

impl FilterAuthorizationHandler {
    /// Creates a handler searching `base_dn` with the filter template.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, filter: impl Into<String>) -> Self {
        Self { base_dn: base_dn.into(), filter: filter.into() }
    }
}

impl<C: Connection> AuthorizationHandler<C> for FilterAuthorizationHandler {
    async fn authorize(&self, dn: &str, connection: &mut C) -> AuthResult<()> {
        let request =
            SearchRequest::new(&self.base_dn, SearchFilter::new(&self.filter).parameter(dn))
                .return_attributes(ReturnAttributes::None);
        let mut results = connection.search(&request).await?;
        if results.has_next().await? {
            Ok(())
        } else {
            Err(AuthError::NotAuthorized(format!("no entry matches the authorization filter for {dn}")))
        }
    }
}

/// The built-in authorization handlers as one type, so a single
/// authenticator can run a mixed list of them.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// Attribute value check on the authenticated entry.
    Compare(CompareAuthorizationHandler),
    /// Filter match anywhere in the directory.
    Filter(FilterAuthorizationHandler),
}

impl<C: Connection> AuthorizationHandler<C> for Authorization {
    async fn authorize(&self, dn: &str, connection: &mut C) -> AuthResult<()> {
        match self {
            Self::Compare(handler) => handler.authorize(dn, connection).await,
            Self::Filter(handler) => handler.authorize(dn, connection).await,
        }
    }
}
