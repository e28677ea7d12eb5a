//! DN resolution: mapping a user identifier to a distinguished name.

use ldx_model::filter::SearchFilter;
use ldx_model::request::{BindRequest, ReturnAttributes, SearchRequest, SearchScope};
use ldx_provider::connection::{Connection, ConnectionFactory};
use ldx_provider::error::RetryPolicy;
use ldx_provider::search::SearchResults;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::handler::close_quietly;

/// Maps a user identifier to the DN to authenticate as.
///
/// Returns `Ok(None)` when the user does not exist; errors are reserved for
/// faults.
#[allow(async_fn_in_trait)]
pub trait DnResolver: Send + Sync {
    /// Resolves `user` to a DN.
    async fn resolve(&self, user: &str) -> AuthResult<Option<String>>;
}

/// Builds the DN from a fixed attribute and base, `attribute=user,base_dn`.
///
/// No directory round trip; the DN is assumed to exist. The bind itself
/// reveals whether it does.
#[derive(Debug, Clone)]
pub struct ConstructDnResolver {
    attribute: String,
    base_dn: String,
}

impl ConstructDnResolver {
    /// Creates a resolver producing `attribute=user,base_dn`.
    #[must_use]
    pub fn new(attribute: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), base_dn: base_dn.into() }
    }
}

impl DnResolver for ConstructDnResolver {
    async fn resolve(&self, user: &str) -> AuthResult<Option<String>> {
        if user.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("{}={},{}", self.attribute, user, self.base_dn)))
    }
}

/// Builds the DN from a format template.
///
/// `{0}` is replaced with the user identifier, `{1}` and up with the
/// configured arguments.
#[derive(Debug, Clone)]
pub struct FormatDnResolver {
    format: String,
    arguments: Vec<String>,
}

impl FormatDnResolver {
    /// Creates a resolver from a template such as `uid={0},ou={1},dc=org`.
    #[must_use]
    pub fn new(format: impl Into<String>) -> Self {
        Self { format: format.into(), arguments: Vec::new() }
    }

    /// Adds a positional argument, bound to `{1}` and up in order.
    #[must_use]
    pub fn argument(mut self, value: impl Into<String>) -> Self {
        self.arguments.push(value.into());
        self
    }
}

impl DnResolver for FormatDnResolver {
    async fn resolve(&self, user: &str) -> AuthResult<Option<String>> {
        if user.is_empty() {
            return Ok(None);
        }
        let mut dn = self.format.replace("{0}", user);
        for (i, argument) in self.arguments.iter().enumerate() {
            dn = dn.replace(&format!("{{{}}}", i + 1), argument);
        }
        Ok(Some(dn))
    }
}

/// Resolves the DN by searching the directory.
///
/// Opens a fresh connection per resolution, binds with the configured
/// service identity, and searches for the user. Retryable failures reopen
/// and try again per the retry policy.
pub struct SearchDnResolver<F: ConnectionFactory> {
    factory: F,
    bind: BindRequest,
    base_dn: String,
    user_filter: String,
    subtree: bool,
    allow_multiple_dns: bool,
    retry: RetryPolicy,
}

impl<F: ConnectionFactory> std::fmt::Debug for SearchDnResolver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchDnResolver")
            .field("base_dn", &self.base_dn)
            .field("user_filter", &self.user_filter)
            .field("subtree", &self.subtree)
            .field("allow_multiple_dns", &self.allow_multiple_dns)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> SearchDnResolver<F> {
    /// Creates a subtree resolver that binds anonymously.
    ///
    /// `user_filter` is a filter template where `{0}` is the user, for
    /// example `(uid={0})`.
    #[must_use]
    pub fn new(factory: F, base_dn: impl Into<String>, user_filter: impl Into<String>) -> Self {
        Self {
            factory,
            bind: BindRequest::anonymous(),
            base_dn: base_dn.into(),
            user_filter: user_filter.into(),
            subtree: true,
            allow_multiple_dns: false,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the service bind used for resolution searches.
    #[must_use]
    pub fn bind(mut self, bind: BindRequest) -> Self {
        self.bind = bind;
        self
    }

    /// Restricts the search to immediate children of the base DN.
    #[must_use]
    pub fn one_level(mut self) -> Self {
        self.subtree = false;
        self
    }

    /// Accepts multiple matches, resolving to the first entry returned.
    #[must_use]
    pub fn allow_multiple_dns(mut self) -> Self {
        self.allow_multiple_dns = true;
        self
    }

    /// Sets the retry policy for resolution attempts.
    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn search_request(&self, user: &str) -> SearchRequest {
        let scope = if self.subtree { SearchScope::Subtree } else { SearchScope::OneLevel };
        SearchRequest::new(&self.base_dn, SearchFilter::new(&self.user_filter).parameter(user))
            .scope(scope)
            .return_attributes(ReturnAttributes::None)
    }

    pub(crate) async fn search_for_dn<C: Connection>(
        &self,
        connection: &mut C,
        user: &str,
    ) -> AuthResult<Option<String>> {
        let request = self.search_request(user);
        let mut results = connection.search(&request).await?;
        let mut found: Option<String> = None;
        while results.has_next().await? {
            let Some(entry) = results.next_entry() else { break };
            match &found {
                None => found = Some(entry.dn),
                Some(first) => {
                    if self.allow_multiple_dns {
                        debug!(user, dn = %first, "multiple matches, keeping the first");
                        break;
                    }
                    return Err(AuthError::AmbiguousDn(user.to_string()));
                }
            }
        }
        Ok(found)
    }

    async fn attempt(&self, user: &str) -> AuthResult<Option<String>> {
        let mut connection = self.factory.connection().await?;
        let outcome = match open_service_bind(&mut connection, &self.bind).await {
            Ok(()) => self.search_for_dn(&mut connection, user).await,
            Err(err) => Err(err),
        };
        close_quietly(&mut connection).await;
        outcome
    }
}

impl<F: ConnectionFactory> DnResolver for SearchDnResolver<F> {
    async fn resolve(&self, user: &str) -> AuthResult<Option<String>> {
        if user.is_empty() {
            return Ok(None);
        }
        let mut attempt = 1;
        loop {
            match self.attempt(user).await {
                Ok(dn) => return Ok(dn),
                Err(err) if err.is_retry() && attempt < self.retry.attempts => {
                    debug!(user, attempt, error = %err, "retrying DN resolution");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A [`SearchDnResolver`] that keeps one bound connection open across
/// resolutions instead of opening one per call.
///
/// Must be initialized before use and closed when done. Resolution failures
/// do not reconnect; callers reinitialize after a connection loss.
pub struct PersistentSearchDnResolver<F: ConnectionFactory> {
    inner: SearchDnResolver<F>,
    connection: tokio::sync::Mutex<Option<F::Conn>>,
}

impl<F: ConnectionFactory> std::fmt::Debug for PersistentSearchDnResolver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSearchDnResolver").field("inner", &self.inner).finish()
    }
}

impl<F: ConnectionFactory> PersistentSearchDnResolver<F> {
    /// Wraps a search resolver.
    #[must_use]
    pub fn new(inner: SearchDnResolver<F>) -> Self {
        Self { inner, connection: tokio::sync::Mutex::new(None) }
    }

    /// Opens and binds the shared connection.
    ///
    /// # Errors
    ///
    /// Connection establishment errors; a rejected service bind surfaces as
    /// an operation error.
    pub async fn initialize(&self) -> AuthResult<()> {
        let mut connection = self.inner.factory.connection().await?;
        if let Err(err) = open_service_bind(&mut connection, &self.inner.bind).await {
            close_quietly(&mut connection).await;
            return Err(err);
        }
        *self.connection.lock().await = Some(connection);
        Ok(())
    }

    /// Closes the shared connection. Safe to call when never initialized.
    pub async fn close(&self) {
        if let Some(mut connection) = self.connection.lock().await.take() {
            close_quietly(&mut connection).await;
        }
    }
}

impl<F: ConnectionFactory> DnResolver for PersistentSearchDnResolver<F> {
    async fn resolve(&self, user: &str) -> AuthResult<Option<String>> {
        if user.is_empty() {
            return Ok(None);
        }
        let mut guard = self.connection.lock().await;
        let connection = guard.as_mut().ok_or(AuthError::NotInitialized)?;
        self.inner.search_for_dn(connection, user).await
    }
}

/// Binds `connection` with the given service identity, treating a rejected
/// bind as an error.
pub(crate) async fn open_service_bind<C: Connection>(
    connection: &mut C,
    bind: &BindRequest,
) -> AuthResult<()> {
    use ldx_provider::error::OperationFailure;

    let response = connection.open(bind).await?;
    if response.is_success() {
        Ok(())
    } else {
        let message = if response.diagnostic_message.is_empty() {
            "service bind rejected".to_string()
        } else {
            response.diagnostic_message
        };
        Err(OperationFailure::new(response.result_code, message).into_error(&[]).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn construct_resolver_builds_the_dn() {
        let resolver = ConstructDnResolver::new("uid", "ou=people,dc=example,dc=org");
        assert_eq!(
            resolver.resolve("jdoe").await.unwrap().as_deref(),
            Some("uid=jdoe,ou=people,dc=example,dc=org")
        );
        assert_eq!(resolver.resolve("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn format_resolver_substitutes_all_positions() {
        let resolver = FormatDnResolver::new("uid={0},ou={1},dc=example,dc=org").argument("people");
        assert_eq!(
            resolver.resolve("jdoe").await.unwrap().as_deref(),
            Some("uid=jdoe,ou=people,dc=example,dc=org")
        );
    }

    #[test]
    fn search_request_is_dn_only() {
        use ldx_provider_mem::{Directory, MemConnectionFactory};

        let factory = MemConnectionFactory::new(Directory::new());
        let resolver =
            SearchDnResolver::new(factory, "ou=people,dc=example,dc=org", "(uid={0})").one_level();
        let request = resolver.search_request("jdoe");
        assert_eq!(request.base_dn, "ou=people,dc=example,dc=org");
        assert_eq!(request.scope, SearchScope::OneLevel);
        assert_eq!(request.return_attributes, ReturnAttributes::None);
        assert_eq!(request.filter.format(), "(uid=jdoe)");
    }
}
