//! # ldx-auth
//!
//! Authentication on top of the `ldx-provider` abstraction: DN resolution,
//! credential verification by bind or compare, authorization checks and
//! entry resolution, composed into one pipeline by [`Authenticator`].
//!
//! Every component is generic over the backend, so the same pipeline runs
//! against any provider implementation.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod authenticator;
pub mod authorization;
pub mod digest;
pub mod entry;
pub mod error;
pub mod handler;
pub mod resolver;
pub mod types;

pub use authenticator::{
    AuthenticationResponseHandler, AuthenticationResultHandler, Authenticator,
};
pub use authorization::{
    Authorization, AuthorizationHandler, CompareAuthorizationHandler, FilterAuthorizationHandler,
};
pub use digest::{hash_credential, DigestScheme};
pub use entry::{EntryResolver, NoOpEntryResolver, SearchEntryResolver};
pub use error::{AuthError, AuthResult};
pub use handler::{
    AuthenticationHandler, BindAuthenticationHandler, CompareAuthenticationHandler,
    PooledBindAuthenticationHandler, PooledCompareAuthenticationHandler,
};
pub use resolver::{
    ConstructDnResolver, DnResolver, FormatDnResolver, PersistentSearchDnResolver,
    SearchDnResolver,
};
pub use types::{
    AuthenticationCriteria, AuthenticationHandlerResponse, AuthenticationRequest,
    AuthenticationResponse,
};
