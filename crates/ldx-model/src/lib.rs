//! # ldx-model
//!
//! Protocol data model for the ldx directory client: result codes, controls,
//! requests and responses, entries, search filters and SASL configuration.
//!
//! Everything in this crate is backend-independent. Backend-native types never
//! appear here; translation to and from them is the job of the provider crates.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod control;
pub mod credential;
pub mod entry;
pub mod filter;
pub mod request;
pub mod response;
pub mod result_code;
pub mod sasl;

pub use control::{
    PagedResultsControl, RawControl, RequestControl, ResponseControl, SortKey, SortRequestControl,
    SortResponseControl,
};
pub use credential::Credential;
pub use entry::{LdapAttribute, LdapEntry};
pub use filter::SearchFilter;
pub use request::{
    AddRequest, AttributeModification, BindRequest, CompareRequest, DeleteRequest, DerefAliases,
    ExtendedRequest, ModificationType, ModifyDnRequest, ModifyRequest, ReferralBehavior,
    ReturnAttributes, SearchRequest, SearchScope,
};
pub use response::Response;
pub use result_code::ResultCode;
pub use sasl::{Mechanism, QualityOfProtection, SaslConfig};

/// Identifier of an in-flight protocol message, used to abandon operations.
pub type MessageId = i32;
