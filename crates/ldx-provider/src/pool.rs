//! Connection pooling over any [`ConnectionFactory`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use ldx_model::request::BindRequest;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{OperationFailure, ProviderError, ProviderResult};

/// Pool sizing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of connections checked out at once.
    pub max_size: usize,
}

impl PoolConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// When `max_size` is zero.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.max_size == 0 {
            return Err(ProviderError::configuration("pool max_size must be at least 1"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 10 }
    }
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    bind: BindRequest,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<F::Conn>>,
}

/// A bounded pool of connections, all bound with the same service identity.
///
/// Checkout is gated by a semaphore; when no idle connection is available a
/// new one is established and bound. Checked-in connections are reused as-is,
/// so a caller that rebinds a pooled connection must
/// [`detach`](PooledConnection::detach) or [`discard`](PooledConnection::discard)
/// it instead of releasing it.
pub struct ConnectionPool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Creates a pool that binds new connections with `bind`.
    ///
    /// # Errors
    ///
    /// When `config` is invalid.
    pub fn new(factory: F, bind: BindRequest, config: PoolConfig) -> ProviderResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                bind,
                permits: Arc::new(Semaphore::new(config.max_size)),
                idle: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Checks out a connection, establishing and binding a new one when no
    /// idle connection is available.
    ///
    /// # Errors
    ///
    /// Connection establishment errors; a rejected service bind surfaces as
    /// an operation error.
    pub async fn checkout(&self) -> ProviderResult<PooledConnection<F>> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::configuration("connection pool is closed"))?;

        let conn = match self.inner.idle.lock().pop() {
            Some(conn) => conn,
            None => self.open_fresh().await?,
        };

        Ok(PooledConnection { conn: Some(conn), inner: Arc::clone(&self.inner), _permit: permit })
    }

    /// Number of idle connections currently held.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    async fn open_fresh(&self) -> ProviderResult<F::Conn> {
        let mut conn = self.inner.factory.connection().await?;
        let response = conn.open(&self.inner.bind).await?;
        if !response.is_success() {
            let _ = conn.close().await;
            return Err(ProviderError::Operation(
                OperationFailure::new(response.result_code, response.diagnostic_message)
                    .with_controls(response.controls)
                    .with_referrals(response.referral_urls),
            ));
        }
        debug!(idle = self.idle_count(), "pool opened fresh connection");
        Ok(conn)
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool").field("idle", &self.idle_count()).finish()
    }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dereferences to the underlying connection. Return it with
/// [`release`](Self::release), remove it from service with
/// [`discard`](Self::discard), or take ownership with
/// [`detach`](Self::detach). Dropping the guard without any of these drops
/// the connection and frees its pool slot.
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Conn>,
    inner: Arc<PoolInner<F>>,
    _permit: OwnedSemaphorePermit,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Returns the connection to the pool for reuse.
    ///
    /// A connection that is no longer open is dropped instead.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            if conn.is_open() {
                self.inner.idle.lock().push(conn);
            }
        }
    }

    /// Closes the connection and removes it from the pool.
    pub async fn discard(mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(error) = conn.close().await {
                warn!(%error, "error closing discarded pool connection");
            }
        }
    }

    /// Detaches the connection from the pool, transferring ownership.
    ///
    /// The pool slot is freed; the caller is now responsible for closing.
    #[must_use]
    pub fn detach(mut self) -> F::Conn {
        self.conn.take().unwrap_or_else(|| unreachable!("connection taken only by consuming methods"))
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken only by consuming methods"))
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken only by consuming methods"))
    }
}
