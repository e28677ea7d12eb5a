//! The in-memory backend's connection, factory and search cursor.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use ldx_model::control::{
    PagedResultsControl, RawControl, RequestControl, ResponseControl, MANAGE_DSA_IT_OID,
    PAGED_RESULTS_OID,
};
use ldx_model::request::{
    AddRequest, BindRequest, CompareRequest, DeleteRequest, ExtendedRequest, ModifyDnRequest,
    ModifyRequest, ReferralBehavior, SearchRequest,
};
use ldx_model::response::Response;
use ldx_model::result_code::ResultCode;
use ldx_model::MessageId;
use ldx_provider::connection::{Connection, ConnectionFactory, ExtendedResult};
use ldx_provider::control::{ControlProcessor, RequestControlHandler, ResponseControlHandler};
use ldx_provider::error::{ErrorKind, OperationFailure, ProviderError, ProviderResult};
use ldx_provider::listener::ListenerRegistry;
use ldx_provider::search::{AsyncSearchHandle, SearchListener, SearchResults};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::directory::{Directory, SearchParams};

/// OID of the "Who am I?" extended operation (RFC 4532).
pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// The backend-native control representation of the in-memory directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemControl {
    /// Control OID.
    pub oid: String,
    /// Control criticality.
    pub criticality: bool,
    /// Paged results payload, for the paging control.
    pub paged: Option<PagedResultsControl>,
}

struct PagedHandler;

impl RequestControlHandler<MemControl> for PagedHandler {
    fn oid(&self) -> &str {
        PAGED_RESULTS_OID
    }

    fn encode(&self, control: &RequestControl) -> ProviderResult<MemControl> {
        match control {
            RequestControl::PagedResults(paged) => Ok(MemControl {
                oid: PAGED_RESULTS_OID.into(),
                criticality: paged.criticality,
                paged: Some(paged.clone()),
            }),
            other => Err(ProviderError::UnsupportedControl(other.oid().to_string())),
        }
    }
}

impl ResponseControlHandler<MemControl> for PagedHandler {
    fn oid(&self) -> &str {
        PAGED_RESULTS_OID
    }

    fn decode(&self, native: &MemControl) -> ProviderResult<ResponseControl> {
        native.paged.clone().map(ResponseControl::PagedResults).ok_or_else(|| {
            ProviderError::Operation(OperationFailure::from_kind(
                ErrorKind::Decoding,
                "paged results control without payload",
            ))
        })
    }
}

struct ManageDsaItHandler;

impl RequestControlHandler<MemControl> for ManageDsaItHandler {
    fn oid(&self) -> &str {
        MANAGE_DSA_IT_OID
    }

    fn encode(&self, control: &RequestControl) -> ProviderResult<MemControl> {
        Ok(MemControl {
            oid: MANAGE_DSA_IT_OID.into(),
            criticality: control.criticality(),
            paged: None,
        })
    }
}

fn default_processor() -> ControlProcessor<MemControl> {
    ControlProcessor::new(|native: &MemControl| {
        ResponseControl::Raw(RawControl {
            oid: native.oid.clone(),
            criticality: native.criticality,
            value: None,
        })
    })
    .request_handler(PagedHandler)
    .request_handler(ManageDsaItHandler)
    .response_handler(PagedHandler)
}

/// Produces [`MemConnection`]s over a shared [`Directory`].
#[derive(Clone)]
pub struct MemConnectionFactory {
    directory: Directory,
    listeners: ListenerRegistry,
    processor: Arc<ControlProcessor<MemControl>>,
    retry_codes: Arc<Vec<ResultCode>>,
}

impl MemConnectionFactory {
    /// Creates a factory with the default retry code set.
    #[must_use]
    pub fn new(directory: Directory) -> Self {
        Self {
            directory,
            listeners: ListenerRegistry::new(),
            processor: Arc::new(default_processor()),
            retry_codes: Arc::new(vec![
                ResultCode::Busy,
                ResultCode::Unavailable,
                ResultCode::ServerDown,
                ResultCode::ConnectError,
            ]),
        }
    }

    /// Replaces the retry code set.
    #[must_use]
    pub fn retry_codes(mut self, codes: Vec<ResultCode>) -> Self {
        self.retry_codes = Arc::new(codes);
        self
    }

    /// The connection listener registry of this factory.
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

impl std::fmt::Debug for MemConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemConnectionFactory").field("directory", &self.directory).finish()
    }
}

impl ConnectionFactory for MemConnectionFactory {
    type Conn = MemConnection;

    async fn connection(&self) -> ProviderResult<MemConnection> {
        self.listeners.notify_opened();
        Ok(MemConnection {
            directory: self.directory.clone(),
            listeners: self.listeners.clone(),
            processor: Arc::clone(&self.processor),
            retry_codes: Arc::clone(&self.retry_codes),
            open: true,
            bound_dn: None,
            next_message_id: 1,
            abandoned: Arc::new(Mutex::new(HashSet::new())),
        })
    }
}

/// A connection to the in-memory directory.
pub struct MemConnection {
    directory: Directory,
    listeners: ListenerRegistry,
    processor: Arc<ControlProcessor<MemControl>>,
    retry_codes: Arc<Vec<ResultCode>>,
    open: bool,
    bound_dn: Option<String>,
    next_message_id: MessageId,
    abandoned: Arc<Mutex<HashSet<MessageId>>>,
}

impl MemConnection {
    fn ensure_open(&self) -> ProviderResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(OperationFailure::from_kind(ErrorKind::ConnectionClosed, "connection is closed")
                .into_error(&self.retry_codes))
        }
    }

    fn next_id(&mut self) -> MessageId {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    fn fail(&self, failure: OperationFailure) -> ProviderError {
        failure.into_error(&self.retry_codes)
    }
}

impl std::fmt::Debug for MemConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemConnection")
            .field("open", &self.open)
            .field("bound_dn", &self.bound_dn)
            .finish()
    }
}

impl Connection for MemConnection {
    type Search = MemSearchResults;
    type AsyncSearch = MemAsyncSearch;

    async fn open(&mut self, request: &BindRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;

        if let Some(sasl) = &request.sasl {
            return Err(ProviderError::UnsupportedMechanism(sasl.mechanism));
        }
        if request.is_anonymous() {
            self.bound_dn = None;
            return Ok(Response::success(()));
        }

        let Some(dn) = &request.dn else {
            return Err(ProviderError::configuration("simple bind requires a DN"));
        };
        let password = request.credential.as_ref().map(|c| c.as_bytes()).unwrap_or_default();
        if password.is_empty() {
            return Ok(Response::new(None, ResultCode::UnwillingToPerform)
                .with_message("unauthenticated bind disallowed"));
        }

        let code = self.directory.bind(dn, password);
        debug!(dn = %dn, code = %code, "bind");
        if code == ResultCode::Success {
            self.bound_dn = Some(dn.clone());
            Ok(Response::success(()))
        } else {
            self.bound_dn = None;
            Ok(Response::new(None, code).with_message("invalid credentials"))
        }
    }

    async fn add(&mut self, request: &AddRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;
        let mut entry = ldx_model::entry::LdapEntry::new(request.dn.clone());
        for attribute in &request.attributes {
            entry
                .attributes
                .entry(attribute.name.clone())
                .or_default()
                .extend(attribute.values.iter().cloned());
        }
        self.directory.add(entry).map_err(|f| self.fail(f))?;
        Ok(Response::success(()))
    }

    async fn compare(&mut self, request: &CompareRequest) -> ProviderResult<Response<bool>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;
        match self.directory.compare(&request.dn, &request.attribute, &request.value) {
            Some(true) => Ok(Response::new(Some(true), ResultCode::CompareTrue)),
            Some(false) => Ok(Response::new(Some(false), ResultCode::CompareFalse)),
            None => Err(self
                .fail(OperationFailure::from_kind(ErrorKind::NoSuchEntry, request.dn.clone()))),
        }
    }

    async fn delete(&mut self, request: &DeleteRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;
        self.directory.delete(&request.dn).map_err(|f| self.fail(f))?;
        Ok(Response::success(()))
    }

    async fn modify(&mut self, request: &ModifyRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;
        self.directory.modify(&request.dn, &request.modifications).map_err(|f| self.fail(f))?;
        Ok(Response::success(()))
    }

    async fn modify_dn(&mut self, request: &ModifyDnRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;
        self.directory
            .modify_dn(&request.dn, &request.new_rdn, request.new_superior.as_deref())
            .map_err(|f| self.fail(f))?;
        Ok(Response::success(()))
    }

    async fn extended(
        &mut self,
        request: &ExtendedRequest,
    ) -> ProviderResult<Response<ExtendedResult>> {
        self.ensure_open()?;
        self.processor.process_request(&request.controls)?;
        if request.oid == WHOAMI_OID {
            let authz = match &self.bound_dn {
                Some(dn) => format!("dn:{dn}"),
                None => String::new(),
            };
            return Ok(Response::success(ExtendedResult {
                oid: None,
                value: Some(authz.into_bytes()),
            }));
        }
        Err(self.fail(OperationFailure::from_kind(
            ErrorKind::Server(ResultCode::ProtocolError),
            format!("unsupported extended operation {}", request.oid),
        )))
    }

    async fn search(&mut self, request: &SearchRequest) -> ProviderResult<MemSearchResults> {
        self.ensure_open()?;
        if request.referral_behavior == ReferralBehavior::Follow {
            return Err(ProviderError::configuration(
                "referral following is not supported by this backend",
            ));
        }
        let native = self.processor.process_request(&request.controls)?;
        let page = native.iter().find_map(|c| c.paged.as_ref()).map(|p| (p.size, p.cookie.clone()));
        let manage_dsa_it = native.iter().any(|c| c.oid == MANAGE_DSA_IT_OID);

        Ok(MemSearchResults {
            directory: self.directory.clone(),
            request: request.clone(),
            processor: Arc::clone(&self.processor),
            retry_codes: Arc::clone(&self.retry_codes),
            abandoned: Arc::clone(&self.abandoned),
            message_id: self.next_id(),
            page_size: page.as_ref().map(|(size, _)| *size),
            cookie: page.map(|(_, cookie)| cookie).unwrap_or_default(),
            manage_dsa_it,
            queue: VecDeque::new(),
            referral_error: None,
            started: false,
            last_code: ResultCode::Success,
            last_controls: Vec::new(),
            response: None,
        })
    }

    async fn search_async(
        &mut self,
        request: &SearchRequest,
        listener: Arc<dyn SearchListener>,
    ) -> ProviderResult<MemAsyncSearch> {
        let mut results = self.search(request).await?;
        let message_id = results.message_id;
        let abandoned = Arc::clone(&self.abandoned);
        let task = tokio::spawn(async move {
            loop {
                match results.has_next().await {
                    Ok(true) => {
                        if let Some(entry) = results.next_entry() {
                            listener.entry_received(entry).await;
                        }
                    }
                    Ok(false) => {
                        if let Some(response) = results.response() {
                            listener.search_complete(response.clone()).await;
                        }
                        break;
                    }
                    Err(error) => {
                        let response = match error.failure() {
                            Some(failure) => Response::new(None, failure.result_code)
                                .with_message(failure.message.clone())
                                .with_referrals(failure.referral_urls.clone()),
                            None => Response::new(None, ResultCode::LocalError)
                                .with_message(error.to_string()),
                        };
                        listener.search_complete(response).await;
                        break;
                    }
                }
            }
        });
        Ok(MemAsyncSearch { message_id, abandoned, task })
    }

    async fn abandon(&mut self, message_id: MessageId) -> ProviderResult<()> {
        self.ensure_open()?;
        self.abandoned.lock().insert(message_id);
        Ok(())
    }

    async fn close(&mut self) -> ProviderResult<()> {
        if self.open {
            self.open = false;
            self.bound_dn = None;
            self.listeners.notify_closed();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Cursor over an in-memory search.
#[derive(Debug)]
pub struct MemSearchResults {
    directory: Directory,
    request: SearchRequest,
    processor: Arc<ControlProcessor<MemControl>>,
    retry_codes: Arc<Vec<ResultCode>>,
    abandoned: Arc<Mutex<HashSet<MessageId>>>,
    message_id: MessageId,
    page_size: Option<u32>,
    cookie: Vec<u8>,
    manage_dsa_it: bool,
    queue: VecDeque<ldx_model::entry::LdapEntry>,
    referral_error: Option<Vec<String>>,
    started: bool,
    last_code: ResultCode,
    last_controls: Vec<ResponseControl>,
    response: Option<Response<()>>,
}

impl MemSearchResults {
    fn execute_page(&mut self) -> ProviderResult<()> {
        let params = SearchParams {
            page: self.page_size.map(|size| (size, std::mem::take(&mut self.cookie))),
            manage_dsa_it: self.manage_dsa_it,
        };
        let outcome = self
            .directory
            .execute_search(&self.request, &params)
            .map_err(|f| f.into_error(&self.retry_codes))?;

        self.queue.extend(outcome.entries);
        if !outcome.referrals.is_empty()
            && self.request.referral_behavior == ReferralBehavior::Throw
        {
            self.referral_error = Some(outcome.referrals);
        }
        self.last_code = outcome.result_code;
        self.last_controls.clear();
        if let Some(paged) = outcome.paged {
            self.cookie = paged.cookie.clone();
            self.last_controls.push(ResponseControl::PagedResults(paged));
        }
        self.started = true;
        Ok(())
    }
}

impl SearchResults for MemSearchResults {
    async fn has_next(&mut self) -> ProviderResult<bool> {
        loop {
            if self.abandoned.lock().contains(&self.message_id) {
                self.queue.clear();
                return Ok(false);
            }
            if let Some(urls) = self.referral_error.take() {
                return Err(
                    OperationFailure::from_kind(ErrorKind::Referral, "referral received")
                        .with_referrals(urls)
                        .into_error(&self.retry_codes),
                );
            }
            if !self.queue.is_empty() {
                return Ok(true);
            }
            if self.response.is_some() {
                return Ok(false);
            }
            if !self.started {
                self.execute_page()?;
                continue;
            }
            if self.processor.search_again(&self.last_controls) {
                self.execute_page()?;
                continue;
            }
            self.response = Some(
                Response::new(None, self.last_code)
                    .with_controls(std::mem::take(&mut self.last_controls)),
            );
            return Ok(false);
        }
    }

    fn next_entry(&mut self) -> Option<ldx_model::entry::LdapEntry> {
        self.queue.pop_front()
    }

    fn response(&self) -> Option<&Response<()>> {
        self.response.as_ref()
    }

    fn message_id(&self) -> MessageId {
        self.message_id
    }
}

/// Handle on a callback-style in-memory search.
#[derive(Debug)]
pub struct MemAsyncSearch {
    message_id: MessageId,
    abandoned: Arc<Mutex<HashSet<MessageId>>>,
    task: JoinHandle<()>,
}

impl AsyncSearchHandle for MemAsyncSearch {
    fn message_id(&self) -> MessageId {
        self.message_id
    }

    async fn abandon(self) -> ProviderResult<()> {
        self.abandoned.lock().insert(self.message_id);
        let _ = self.task.await;
        Ok(())
    }
}
