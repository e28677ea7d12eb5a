//! Credential verification against the directory.

use ldx_model::request::{BindRequest, CompareRequest};
use ldx_model::sasl::SaslConfig;
use ldx_provider::connection::{Connection, ConnectionFactory};
use ldx_provider::pool::ConnectionPool;
use tracing::debug;

use crate::digest::{hash_credential, DigestScheme};
use crate::error::AuthResult;
use crate::resolver::open_service_bind;
use crate::types::{AuthenticationCriteria, AuthenticationHandlerResponse};

/// Verifies a credential, producing the connection it was verified on.
///
/// A rejected credential is a negative
/// [`AuthenticationHandlerResponse`], not an error; the returned
/// connection is open either way and the caller closes it.
#[allow(async_fn_in_trait)]
pub trait AuthenticationHandler: Send + Sync {
    /// Connection type the handler verifies on.
    type Conn: Connection;

    /// Verifies the criteria.
    async fn authenticate(
        &self,
        criteria: &AuthenticationCriteria,
    ) -> AuthResult<AuthenticationHandlerResponse<Self::Conn>>;
}

/// Closes a connection, logging instead of propagating close errors.
pub(crate) async fn close_quietly<C: Connection>(connection: &mut C) {
    if let Err(error) = connection.close().await {
        debug!(%error, "error closing connection");
    }
}

/// Binds `connection` as the resolved identity and wraps the outcome.
pub(crate) async fn bind_on<C: Connection>(
    mut connection: C,
    criteria: &AuthenticationCriteria,
    sasl: Option<&SaslConfig>,
) -> AuthResult<AuthenticationHandlerResponse<C>> {
    let request = match sasl {
        Some(config) => BindRequest::sasl(config.clone()),
        None => BindRequest::simple(&criteria.dn, criteria.credential.clone()),
    };
    match connection.open(&request).await {
        Ok(response) => Ok(AuthenticationHandlerResponse {
            success: response.is_success(),
            result_code: response.result_code,
            diagnostic_message: response.diagnostic_message,
            connection,
        }),
        Err(err) => {
            close_quietly(&mut connection).await;
            Err(err.into())
        }
    }
}

/// Compares the hashed credential against `attribute` on the resolved entry.
pub(crate) async fn compare_on<C: Connection>(
    mut connection: C,
    criteria: &AuthenticationCriteria,
    scheme: DigestScheme,
    attribute: &str,
) -> AuthResult<AuthenticationHandlerResponse<C>> {
    let hashed = hash_credential(scheme, &criteria.credential);
    let request = CompareRequest::new(&criteria.dn, attribute, hashed);
    match connection.compare(&request).await {
        Ok(response) => Ok(AuthenticationHandlerResponse {
            success: response.result == Some(true),
            result_code: response.result_code,
            diagnostic_message: response.diagnostic_message,
            connection,
        }),
        Err(err) => {
            close_quietly(&mut connection).await;
            Err(err.into())
        }
    }
}

/// Verifies the credential by binding as the resolved DN on a fresh
/// connection.
pub struct BindAuthenticationHandler<F: ConnectionFactory> {
    factory: F,
    sasl: Option<SaslConfig>,
}

impl<F: ConnectionFactory> std::fmt::Debug for BindAuthenticationHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindAuthenticationHandler").field("sasl", &self.sasl).finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> BindAuthenticationHandler<F> {
    /// Creates a simple-bind handler.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self { factory, sasl: None }
    }

    /// Binds via SASL instead of a simple bind.
    #[must_use]
    pub fn sasl(mut self, config: SaslConfig) -> Self {
        self.sasl = Some(config);
        self
    }
}

impl<F: ConnectionFactory> AuthenticationHandler for BindAuthenticationHandler<F> {
    type Conn = F::Conn;

    async fn authenticate(
        &self,
        criteria: &AuthenticationCriteria,
    ) -> AuthResult<AuthenticationHandlerResponse<Self::Conn>> {
        let connection = self.factory.connection().await?;
        bind_on(connection, criteria, self.sasl.as_ref()).await
    }
}

/// Verifies the credential with a compare against a password digest
/// attribute, under a service bind.
///
/// Never binds as the user, so the user's password policy state is not
/// touched.
pub struct CompareAuthenticationHandler<F: ConnectionFactory> {
    factory: F,
    bind: BindRequest,
    scheme: DigestScheme,
    attribute: String,
}

impl<F: ConnectionFactory> std::fmt::Debug for CompareAuthenticationHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompareAuthenticationHandler")
            .field("scheme", &self.scheme)
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> CompareAuthenticationHandler<F> {
    /// Creates a compare handler against `userPassword` with `{SHA}` digests
    /// and an anonymous service bind.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            bind: BindRequest::anonymous(),
            scheme: DigestScheme::default(),
            attribute: "userPassword".into(),
        }
    }

    /// Sets the service bind used for the compare.
    #[must_use]
    pub fn bind(mut self, bind: BindRequest) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the digest scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: DigestScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the attribute holding the digest.
    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }
}

impl<F: ConnectionFactory> AuthenticationHandler for CompareAuthenticationHandler<F> {
    type Conn = F::Conn;

    async fn authenticate(
        &self,
        criteria: &AuthenticationCriteria,
    ) -> AuthResult<AuthenticationHandlerResponse<Self::Conn>> {
        let mut connection = self.factory.connection().await?;
        if let Err(err) = open_service_bind(&mut connection, &self.bind).await {
            close_quietly(&mut connection).await;
            return Err(err);
        }
        compare_on(connection, criteria, self.scheme, &self.attribute).await
    }
}

/// A [`BindAuthenticationHandler`] drawing connections from a pool.
///
/// The user bind rebinds the connection, so it is detached from the pool
/// rather than returned to it; the caller closes it like any other handler
/// connection.
pub struct PooledBindAuthenticationHandler<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
    sasl: Option<SaslConfig>,
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledBindAuthenticationHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBindAuthenticationHandler")
            .field("sasl", &self.sasl)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> PooledBindAuthenticationHandler<F> {
    /// Creates a pooled simple-bind handler.
    #[must_use]
    pub fn new(pool: ConnectionPool<F>) -> Self {
        Self { pool, sasl: None }
    }

    /// Binds via SASL instead of a simple bind.
    #[must_use]
    pub fn sasl(mut self, config: SaslConfig) -> Self {
        self.sasl = Some(config);
        self
    }
}

impl<F: ConnectionFactory> AuthenticationHandler for PooledBindAuthenticationHandler<F> {
    type Conn = F::Conn;

    async fn authenticate(
        &self,
        criteria: &AuthenticationCriteria,
    ) -> AuthResult<AuthenticationHandlerResponse<Self::Conn>> {
        let connection = self.pool.checkout().await?.detach();
        bind_on(connection, criteria, self.sasl.as_ref()).await
    }
}

/// A [`CompareAuthenticationHandler`] drawing service-bound connections from
/// a pool.
///
/// The compare does not rebind, but ownership still transfers to the
/// response so the whole pipeline has one connection lifecycle.
pub struct PooledCompareAuthenticationHandler<F: ConnectionFactory> {
    pool: ConnectionPool<F>,
    scheme: DigestScheme,
    attribute: String,
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledCompareAuthenticationHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledCompareAuthenticationHandler")
            .field("scheme", &self.scheme)
            .field("attribute", &self.attribute)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> PooledCompareAuthenticationHandler<F> {
    /// Creates a pooled compare handler against `userPassword` with `{SHA}`
    /// digests.
    #[must_use]
    pub fn new(pool: ConnectionPool<F>) -> Self {
        Self { pool, scheme: DigestScheme::default(), attribute: "userPassword".into() }
    }

    /// Sets the digest scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: DigestScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the attribute holding the digest.
    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }
}

impl<F: ConnectionFactory> AuthenticationHandler for PooledCompareAuthenticationHandler<F> {
    type Conn = F::Conn;

    async fn authenticate(
        &self,
        criteria: &AuthenticationCriteria,
    ) -> AuthResult<AuthenticationHandlerResponse<Self::Conn>> {
        let connection = self.pool.checkout().await?.detach();
        compare_on(connection, criteria, self.scheme, &self.attribute).await
    }
}
