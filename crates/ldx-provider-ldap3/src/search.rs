//! Streaming search cursors over `ldap3`.
//!
//! A cursor owns its own protocol handle, so paging reissue never contends
//! with the connection that created it.

use std::collections::VecDeque;
use std::sync::Arc;

use ldap3::controls::RawControl;
use ldap3::{
    parse_refs, DerefAliases as NativeDeref, Ldap, ResultEntry, Scope, SearchEntry, SearchOptions,
    SearchStream,
};
use ldx_model::control::{find_paged_results, RequestControl};
use ldx_model::entry::LdapEntry;
use ldx_model::request::{DerefAliases, ReferralBehavior, ReturnAttributes, SearchRequest, SearchScope};
use ldx_model::response::Response;
use ldx_model::result_code::ResultCode;
use ldx_model::MessageId;
use ldx_provider::control::ControlProcessor;
use ldx_provider::error::{ErrorKind, OperationFailure, ProviderError, ProviderResult};
use ldx_provider::search::{AsyncSearchHandle, SearchListener, SearchResults};
use tokio::task::JoinHandle;

use crate::error;

type Stream = SearchStream<'static, String, Vec<String>>;

pub(crate) fn scope_of(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Object => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

pub(crate) fn attribute_selection(request: &SearchRequest) -> Vec<String> {
    match &request.return_attributes {
        ReturnAttributes::All => Vec::new(),
        ReturnAttributes::None => vec!["1.1".to_owned()],
        ReturnAttributes::Named(names) => names.clone(),
    }
}

fn options_for(request: &SearchRequest) -> SearchOptions {
    SearchOptions::new()
        .deref(match request.deref_aliases {
            DerefAliases::Never => NativeDeref::Never,
            DerefAliases::Searching => NativeDeref::Searching,
            DerefAliases::Finding => NativeDeref::Finding,
            DerefAliases::Always => NativeDeref::Always,
        })
        .typesonly(request.types_only)
        .sizelimit(i32::try_from(request.size_limit).unwrap_or(i32::MAX))
        .timelimit(request.time_limit.map_or(0, |t| i32::try_from(t.as_secs()).unwrap_or(i32::MAX)))
}

/// Rebuilds the request control list for the next page, carrying the cookie
/// the server returned.
fn next_page_controls(request: &SearchRequest, cookie: &[u8]) -> Vec<RequestControl> {
    request
        .controls
        .iter()
        .cloned()
        .map(|control| match control {
            RequestControl::PagedResults(mut paged) => {
                paged.cookie = cookie.to_vec();
                RequestControl::PagedResults(paged)
            }
            other => other,
        })
        .collect()
}

fn entry_from(native: ResultEntry) -> LdapEntry {
    let parsed = SearchEntry::construct(native);
    LdapEntry {
        dn: parsed.dn,
        attributes: parsed.attrs,
        binary_attributes: parsed.bin_attrs,
    }
}

/// Issues a streaming search with the given controls, applying the search
/// options and timeout the request carries.
pub(crate) async fn issue_stream(
    ldap: &mut Ldap,
    request: &SearchRequest,
    controls: &[RequestControl],
    processor: &ControlProcessor<RawControl>,
    retry_codes: &[ResultCode],
) -> ProviderResult<Stream> {
    let native = processor.process_request(controls)?;
    if !native.is_empty() {
        ldap.with_controls(native);
    }
    ldap.with_search_options(options_for(request));
    if let Some(limit) = request.time_limit {
        ldap.with_timeout(limit);
    }
    ldap.streaming_search(
        &request.base_dn,
        scope_of(request.scope),
        &request.filter.format(),
        attribute_selection(request),
    )
    .await
    .map_err(|err| error::translate(err, processor).into_error(retry_codes))
}

/// Cursor over a streaming search, with transparent paging reissue.
pub struct Ldap3SearchResults {
    ldap: Ldap,
    stream: Option<Stream>,
    request: SearchRequest,
    processor: Arc<ControlProcessor<RawControl>>,
    retry_codes: Arc<Vec<ResultCode>>,
    ignore_codes: Arc<Vec<ResultCode>>,
    queue: VecDeque<LdapEntry>,
    referrals: Vec<String>,
    response: Option<Response<()>>,
    message_id: MessageId,
}

impl Ldap3SearchResults {
    pub(crate) fn new(
        ldap: Ldap,
        mut stream: Stream,
        request: SearchRequest,
        processor: Arc<ControlProcessor<RawControl>>,
        retry_codes: Arc<Vec<ResultCode>>,
        ignore_codes: Arc<Vec<ResultCode>>,
    ) -> Self {
        let message_id = stream.ldap_handle().last_id();
        Self {
            ldap,
            stream: Some(stream),
            request,
            processor,
            retry_codes,
            ignore_codes,
            queue: VecDeque::new(),
            referrals: Vec::new(),
            response: None,
            message_id,
        }
    }

    /// Finalizes the current page: either reissues the search for the next
    /// page or records the terminal response.
    async fn finish_page(&mut self) -> ProviderResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let result = stream.finish().await;
        let code = ResultCode::from_value_lossy(result.rc);
        if !code.is_success() && !self.ignore_codes.contains(&code) {
            return Err(error::failure_from_result(result, &self.processor)
                .into_error(&self.retry_codes));
        }

        let raws: Vec<RawControl> = result.ctrls.into_iter().map(|c| c.1).collect();
        let controls = error::decode_controls(&self.processor, &raws);
        self.referrals.extend(result.refs);

        if code == ResultCode::Success && self.processor.search_again(&controls) {
            let cookie = find_paged_results(&controls)
                .map(|paged| paged.cookie.clone())
                .unwrap_or_default();
            let next = next_page_controls(&self.request, &cookie);
            let mut stream = issue_stream(
                &mut self.ldap,
                &self.request,
                &next,
                &self.processor,
                &self.retry_codes,
            )
            .await?;
            self.message_id = stream.ldap_handle().last_id();
            self.stream = Some(stream);
            return Ok(());
        }

        let mut response = Response::new(None, code)
            .with_controls(controls)
            .with_referrals(std::mem::take(&mut self.referrals));
        if !result.text.is_empty() {
            response = response.with_message(result.text);
        }
        if !result.matched.is_empty() {
            response.matched_dn = Some(result.matched);
        }
        self.response = Some(response);
        Ok(())
    }
}

impl SearchResults for Ldap3SearchResults {
    async fn has_next(&mut self) -> ProviderResult<bool> {
        loop {
            if self.response.is_some() {
                return Ok(false);
            }
            if !self.queue.is_empty() {
                return Ok(true);
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(false);
            };
            match stream.next().await {
                Ok(Some(native)) => {
                    if native.is_ref() {
                        let urls = parse_refs(native.0);
                        self.referrals.extend(urls.iter().cloned());
                        if self.request.referral_behavior == ReferralBehavior::Throw {
                            self.stream = None;
                            return Err(ProviderError::Operation(
                                OperationFailure::from_kind(
                                    ErrorKind::Referral,
                                    "search referral received",
                                )
                                .with_referrals(urls),
                            ));
                        }
                    } else if !native.is_intermediate() {
                        self.queue.push_back(entry_from(native));
                    }
                }
                Ok(None) => self.finish_page().await?,
                Err(err) => {
                    self.stream = None;
                    return Err(error::translate(err, &self.processor)
                        .into_error(&self.retry_codes));
                }
            }
        }
    }

    fn next_entry(&mut self) -> Option<LdapEntry> {
        self.queue.pop_front()
    }

    fn response(&self) -> Option<&Response<()>> {
        self.response.as_ref()
    }

    fn message_id(&self) -> MessageId {
        self.message_id
    }
}

/// Handle on a callback-style search running in a background task.
pub struct Ldap3AsyncSearch {
    ldap: Ldap,
    message_id: MessageId,
    task: JoinHandle<()>,
}

impl Ldap3AsyncSearch {
    pub(crate) fn spawn(results: Ldap3SearchResults, listener: Arc<dyn SearchListener>) -> Self {
        let ldap = results.ldap.clone();
        let message_id = results.message_id;
        let task = tokio::spawn(pump(results, listener));
        Self { ldap, message_id, task }
    }
}

async fn pump(mut results: Ldap3SearchResults, listener: Arc<dyn SearchListener>) {
    let mut delivered = 0usize;
    loop {
        match results.has_next().await {
            Ok(true) => {
                deliver_referrals(&results.referrals, &mut delivered, &listener).await;
                if let Some(entry) = results.next_entry() {
                    listener.entry_received(entry).await;
                }
            }
            Ok(false) => {
                if let Some(response) = results.response.take() {
                    deliver_referrals(&response.referral_urls, &mut delivered, &listener).await;
                    listener.search_complete(response).await;
                }
                return;
            }
            Err(err) => {
                let response = match err.failure() {
                    Some(failure) => Response::new(None, failure.result_code)
                        .with_message(failure.message.clone())
                        .with_controls(failure.controls.clone())
                        .with_referrals(failure.referral_urls.clone()),
                    None => {
                        Response::new(None, ResultCode::LocalError).with_message(err.to_string())
                    }
                };
                listener.search_complete(response).await;
                return;
            }
        }
    }
}

async fn deliver_referrals(
    referrals: &[String],
    delivered: &mut usize,
    listener: &Arc<dyn SearchListener>,
) {
    if referrals.len() > *delivered {
        listener.referral_received(referrals[*delivered..].to_vec()).await;
        *delivered = referrals.len();
    }
}

impl AsyncSearchHandle for Ldap3AsyncSearch {
    fn message_id(&self) -> MessageId {
        self.message_id
    }

    async fn abandon(mut self) -> ProviderResult<()> {
        // Stop delivery first so the listener sees nothing after this point.
        self.task.abort();
        self.ldap.abandon(self.message_id).await.map_err(|err| {
            ProviderError::Operation(OperationFailure::from_kind(
                error::classify(&err),
                err.to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldx_model::control::PagedResultsControl;
    use ldx_model::filter::SearchFilter;

    fn request() -> SearchRequest {
        SearchRequest::new("dc=example,dc=org", SearchFilter::new("(objectClass=person)"))
    }

    #[test]
    fn attribute_selection_maps_the_protocol_forms() {
        assert!(attribute_selection(&request()).is_empty());

        let none = request().return_attributes(ReturnAttributes::None);
        assert_eq!(attribute_selection(&none), vec!["1.1".to_string()]);

        let named = request().return_attributes(ReturnAttributes::named(["cn", "mail"]));
        assert_eq!(attribute_selection(&named), vec!["cn".to_string(), "mail".to_string()]);
    }

    #[test]
    fn scope_mapping() {
        assert!(matches!(scope_of(SearchScope::Object), Scope::Base));
        assert!(matches!(scope_of(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(scope_of(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn next_page_controls_replace_only_the_cookie() {
        let request = request()
            .control(RequestControl::ManageDsaIt { criticality: false })
            .control(RequestControl::PagedResults(PagedResultsControl::new(25)));
        let next = next_page_controls(&request, &[7, 8, 9]);
        assert_eq!(next.len(), 2);
        assert!(matches!(&next[0], RequestControl::ManageDsaIt { .. }));
        match &next[1] {
            RequestControl::PagedResults(paged) => {
                assert_eq!(paged.size, 25);
                assert_eq!(paged.cookie, vec![7, 8, 9]);
            }
            other => panic!("unexpected control {other:?}"),
        }
    }
}
