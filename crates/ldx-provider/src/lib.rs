//! # ldx-provider
//!
//! The provider abstraction: contracts every backend implements
//! ([`Connection`], [`ConnectionFactory`], [`SearchResults`]), the generic
//! control processor, the error taxonomy with retry classification, a
//! connection pool and the connection listener registry.
//!
//! Code built on these contracts works identically over any backend;
//! backend-native types never cross this boundary.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod connection;
pub mod control;
pub mod error;
pub mod listener;
pub mod pool;
pub mod search;

pub use connection::{Connection, ConnectionFactory, ExtendedResult};
pub use control::{ControlProcessor, RequestControlHandler, ResponseControlHandler};
pub use error::{ErrorKind, OperationFailure, ProviderError, ProviderResult, RetryPolicy};
pub use listener::{ConnectionListener, ListenerRegistry};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use search::{AsyncSearchHandle, CollectingListener, SearchListener, SearchResults};
