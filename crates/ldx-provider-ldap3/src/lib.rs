//! # ldx-provider-ldap3
//!
//! Network backend over the [`ldap3`] crate: async connections, BER control
//! encoding, native error translation and streaming searches with paging
//! reissue.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod controls;
mod error;
pub mod search;

pub use config::{Ldap3Config, Ldap3ConfigBuilder};
pub use connection::{Ldap3Connection, Ldap3ConnectionFactory};
pub use search::{Ldap3AsyncSearch, Ldap3SearchResults};
