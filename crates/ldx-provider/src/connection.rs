//! Backend connection contracts.

use std::sync::Arc;

use ldx_model::request::{
    AddRequest, BindRequest, CompareRequest, DeleteRequest, ExtendedRequest, ModifyDnRequest,
    ModifyRequest, SearchRequest,
};
use ldx_model::response::Response;
use ldx_model::MessageId;

use crate::error::ProviderResult;
use crate::search::{AsyncSearchHandle, SearchListener, SearchResults};

/// Result value of an extended operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedResult {
    /// Response OID, when the server sent one.
    pub oid: Option<String>,
    /// Response value, when the server sent one.
    pub value: Option<Vec<u8>>,
}

/// A single connection to a directory server.
///
/// Connections have exactly one owner at a time; components that borrow a
/// connection (authorization handlers, entry resolvers) never close it.
/// `close` is idempotent and every other method requires a prior successful
/// [`open`](Connection::open).
#[allow(async_fn_in_trait)]
pub trait Connection: Send {
    /// Blocking search cursor type.
    type Search: SearchResults;
    /// Callback-style search handle type.
    type AsyncSearch: AsyncSearchHandle;

    /// Binds this connection: anonymous, simple or SASL per the request.
    ///
    /// An authentication rejection is a negative [`Response`], not an error.
    async fn open(&mut self, request: &BindRequest) -> ProviderResult<Response<()>>;

    /// Adds an entry.
    async fn add(&mut self, request: &AddRequest) -> ProviderResult<Response<()>>;

    /// Compares an attribute value; the result is `true` on compareTrue.
    async fn compare(&mut self, request: &CompareRequest) -> ProviderResult<Response<bool>>;

    /// Deletes an entry.
    async fn delete(&mut self, request: &DeleteRequest) -> ProviderResult<Response<()>>;

    /// Modifies an entry's attributes.
    async fn modify(&mut self, request: &ModifyRequest) -> ProviderResult<Response<()>>;

    /// Renames an entry.
    async fn modify_dn(&mut self, request: &ModifyDnRequest) -> ProviderResult<Response<()>>;

    /// Performs an extended operation.
    async fn extended(
        &mut self,
        request: &ExtendedRequest,
    ) -> ProviderResult<Response<ExtendedResult>>;

    /// Executes a search and returns a cursor over its results.
    async fn search(&mut self, request: &SearchRequest) -> ProviderResult<Self::Search>;

    /// Executes a search delivering results to `listener` as they arrive.
    async fn search_async(
        &mut self,
        request: &SearchRequest,
        listener: Arc<dyn SearchListener>,
    ) -> ProviderResult<Self::AsyncSearch>;

    /// Abandons an in-flight operation. No response follows an abandon.
    async fn abandon(&mut self, message_id: MessageId) -> ProviderResult<()>;

    /// Closes the connection. Safe to call any number of times.
    async fn close(&mut self) -> ProviderResult<()>;

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;
}

/// Produces connections to a directory.
///
/// The factory establishes the transport; the caller binds via
/// [`Connection::open`].
#[allow(async_fn_in_trait)]
pub trait ConnectionFactory: Send + Sync {
    /// Connection type this factory produces.
    type Conn: Connection;

    /// Establishes a new, unbound connection.
    async fn connection(&self) -> ProviderResult<Self::Conn>;
}
