//! # ldx-provider-mem
//!
//! An in-memory directory backend implementing the `ldx-provider` contracts.
//!
//! The backend evaluates RFC 4515 filters, serves paged results with opaque
//! cookies, honors referral policies and validates binds against
//! `userPassword`, so everything built on the provider abstraction can be
//! exercised without a server.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod connection;
pub mod directory;
mod filter;

pub use connection::{MemConnection, MemConnectionFactory, MemControl};
pub use directory::Directory;
