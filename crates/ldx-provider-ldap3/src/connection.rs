//! The network backend's connection and factory.

use std::collections::HashSet;
use std::sync::Arc;

use ldap3::controls::RawControl;
use ldap3::exop::Exop;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod};
use ldx_model::control::RequestControl;
use ldx_model::request::{
    AddRequest, BindRequest, CompareRequest, DeleteRequest, ExtendedRequest, ModificationType,
    ModifyDnRequest, ModifyRequest, ReferralBehavior, SearchRequest,
};
use ldx_model::response::Response;
use ldx_model::result_code::ResultCode;
use ldx_model::sasl::Mechanism;
use ldx_model::MessageId;
use ldx_provider::connection::{Connection, ConnectionFactory, ExtendedResult};
use ldx_provider::control::ControlProcessor;
use ldx_provider::error::{ErrorKind, OperationFailure, ProviderError, ProviderResult};
use ldx_provider::listener::ListenerRegistry;
use ldx_provider::search::SearchListener;
use tracing::{debug, warn};

use crate::config::Ldap3Config;
use crate::controls::default_processor;
use crate::error;
use crate::search::{issue_stream, Ldap3AsyncSearch, Ldap3SearchResults};

/// Bind outcomes reported as a negative response instead of an error.
const NEGATIVE_BIND_CODES: [ResultCode; 2] =
    [ResultCode::InvalidCredentials, ResultCode::UnwillingToPerform];

/// Produces [`Ldap3Connection`]s to the configured directory.
pub struct Ldap3ConnectionFactory {
    config: Ldap3Config,
    listeners: ListenerRegistry,
    processor: Arc<ControlProcessor<RawControl>>,
    retry_codes: Arc<Vec<ResultCode>>,
    ignore_codes: Arc<Vec<ResultCode>>,
}

impl Ldap3ConnectionFactory {
    /// Creates a factory for the given configuration.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Configuration`] when the configuration is invalid.
    pub fn new(config: Ldap3Config) -> ProviderResult<Self> {
        config.validate()?;
        let retry_codes = Arc::new(config.retry_codes.clone());
        let ignore_codes = Arc::new(config.ignore_search_codes.clone());
        Ok(Self {
            config,
            listeners: ListenerRegistry::new(),
            processor: Arc::new(default_processor()),
            retry_codes,
            ignore_codes,
        })
    }

    /// The connection listener registry of this factory.
    #[must_use]
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

impl std::fmt::Debug for Ldap3ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ldap3ConnectionFactory").field("url", &self.config.url).finish()
    }
}

impl ConnectionFactory for Ldap3ConnectionFactory {
    type Conn = Ldap3Connection;

    async fn connection(&self) -> ProviderResult<Ldap3Connection> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connect_timeout)
            .set_starttls(self.config.starttls)
            .set_no_tls_verify(self.config.no_tls_verify);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|err| error::translate(err, &self.processor).into_error(&self.retry_codes))?;

        // The driver task owns the socket; it ends when the connection does.
        let listeners = self.listeners.clone();
        let url = self.config.url.clone();
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(url = %url, error = %err, "connection driver terminated");
            }
            listeners.notify_closed();
        });
        self.listeners.notify_opened();
        debug!(url = %self.config.url, "connection established");

        Ok(Ldap3Connection {
            ldap,
            processor: Arc::clone(&self.processor),
            retry_codes: Arc::clone(&self.retry_codes),
            ignore_codes: Arc::clone(&self.ignore_codes),
            open: true,
        })
    }
}

/// A connection to a directory server over `ldap3`.
pub struct Ldap3Connection {
    ldap: Ldap,
    processor: Arc<ControlProcessor<RawControl>>,
    retry_codes: Arc<Vec<ResultCode>>,
    ignore_codes: Arc<Vec<ResultCode>>,
    open: bool,
}

impl Ldap3Connection {
    fn ensure_open(&self) -> ProviderResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(OperationFailure::from_kind(ErrorKind::ConnectionClosed, "connection is closed")
                .into_error(&self.retry_codes))
        }
    }

    fn native_err(&self, err: LdapError) -> ProviderError {
        error::translate(err, &self.processor).into_error(&self.retry_codes)
    }

    /// Encodes request controls and stages them for the next operation.
    fn apply_controls(&mut self, controls: &[RequestControl]) -> ProviderResult<()> {
        let native = self.processor.process_request(controls)?;
        if !native.is_empty() {
            self.ldap.with_controls(native);
        }
        Ok(())
    }

    /// Turns a protocol result into a response. Codes outside the success and
    /// `negative` sets become errors classified against the retry set.
    fn translate_result<T>(
        &self,
        result: LdapResult,
        success_value: impl FnOnce(ResultCode) -> Option<T>,
        negative: &[ResultCode],
    ) -> ProviderResult<Response<T>> {
        let code = ResultCode::from_value_lossy(result.rc);
        if !code.is_success() && !negative.contains(&code) {
            return Err(error::failure_from_result(result, &self.processor)
                .into_error(&self.retry_codes));
        }
        let raws: Vec<RawControl> = result.ctrls.into_iter().map(|c| c.1).collect();
        let controls = error::decode_controls(&self.processor, &raws);
        let mut response = Response::new(success_value(code), code)
            .with_controls(controls)
            .with_referrals(result.refs);
        if !result.text.is_empty() {
            response = response.with_message(result.text);
        }
        if !result.matched.is_empty() {
            response.matched_dn = Some(result.matched);
        }
        Ok(response)
    }
}

impl std::fmt::Debug for Ldap3Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ldap3Connection").field("open", &self.open).finish()
    }
}

impl Connection for Ldap3Connection {
    type Search = Ldap3SearchResults;
    type AsyncSearch = Ldap3AsyncSearch;

    async fn open(&mut self, request: &BindRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;

        if let Some(sasl) = &request.sasl {
            if sasl.mechanism != Mechanism::External {
                return Err(ProviderError::UnsupportedMechanism(sasl.mechanism));
            }
            let result =
                self.ldap.sasl_external_bind().await.map_err(|e| self.native_err(e))?;
            return self.translate_result(
                result,
                |code| code.is_success().then_some(()),
                &NEGATIVE_BIND_CODES,
            );
        }

        if request.is_anonymous() {
            let result = self.ldap.simple_bind("", "").await.map_err(|e| self.native_err(e))?;
            return self.translate_result(
                result,
                |code| code.is_success().then_some(()),
                &NEGATIVE_BIND_CODES,
            );
        }

        let Some(dn) = &request.dn else {
            return Err(ProviderError::configuration("simple bind requires a DN"));
        };
        let password = request
            .credential
            .as_ref()
            .and_then(|c| c.as_str())
            .ok_or_else(|| ProviderError::configuration("simple bind requires a UTF-8 credential"))?;
        let result = self.ldap.simple_bind(dn, password).await.map_err(|e| self.native_err(e))?;
        debug!(dn = %dn, rc = result.rc, "bind");
        self.translate_result(result, |code| code.is_success().then_some(()), &NEGATIVE_BIND_CODES)
    }

    async fn add(&mut self, request: &AddRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;
        let attrs: Vec<(String, HashSet<String>)> = request
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.values.iter().cloned().collect()))
            .collect();
        let result = self.ldap.add(&request.dn, attrs).await.map_err(|e| self.native_err(e))?;
        self.translate_result(result, |code| code.is_success().then_some(()), &[])
    }

    async fn compare(&mut self, request: &CompareRequest) -> ProviderResult<Response<bool>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;
        let result = self
            .ldap
            .compare(&request.dn, &request.attribute, request.value.as_bytes())
            .await
            .map_err(|e| self.native_err(e))?;
        self.translate_result(
            result.0,
            |code| match code {
                ResultCode::CompareTrue => Some(true),
                ResultCode::CompareFalse => Some(false),
                _ => None,
            },
            &[],
        )
    }

    async fn delete(&mut self, request: &DeleteRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;
        let result = self.ldap.delete(&request.dn).await.map_err(|e| self.native_err(e))?;
        self.translate_result(result, |code| code.is_success().then_some(()), &[])
    }

    async fn modify(&mut self, request: &ModifyRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;
        let mods: Vec<Mod<String>> = request
            .modifications
            .iter()
            .map(|m| {
                let name = m.attribute.name.clone();
                let values: HashSet<String> = m.attribute.values.iter().cloned().collect();
                match m.modification {
                    ModificationType::Add => Mod::Add(name, values),
                    ModificationType::Delete => Mod::Delete(name, values),
                    ModificationType::Replace => Mod::Replace(name, values),
                }
            })
            .collect();
        let result = self.ldap.modify(&request.dn, mods).await.map_err(|e| self.native_err(e))?;
        self.translate_result(result, |code| code.is_success().then_some(()), &[])
    }

    async fn modify_dn(&mut self, request: &ModifyDnRequest) -> ProviderResult<Response<()>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;
        let result = self
            .ldap
            .modifydn(
                &request.dn,
                &request.new_rdn,
                request.delete_old_rdn,
                request.new_superior.as_deref(),
            )
            .await
            .map_err(|e| self.native_err(e))?;
        self.translate_result(result, |code| code.is_success().then_some(()), &[])
    }

    async fn extended(
        &mut self,
        request: &ExtendedRequest,
    ) -> ProviderResult<Response<ExtendedResult>> {
        self.ensure_open()?;
        self.apply_controls(&request.controls)?;
        let exop = Exop { name: Some(request.oid.clone()), val: request.value.clone() };
        let result = self.ldap.extended(exop).await.map_err(|e| self.native_err(e))?;
        let value = ExtendedResult { oid: result.0.name, value: result.0.val };
        self.translate_result(result.1, move |code| code.is_success().then_some(value), &[])
    }

    async fn search(&mut self, request: &SearchRequest) -> ProviderResult<Ldap3SearchResults> {
        self.ensure_open()?;
        if request.referral_behavior == ReferralBehavior::Follow {
            return Err(ProviderError::configuration("this backend does not chase referrals"));
        }
        // The cursor gets its own handle so paging reissue does not disturb
        // controls staged on this connection.
        let mut ldap = self.ldap.clone();
        let stream = issue_stream(
            &mut ldap,
            request,
            &request.controls,
            &self.processor,
            &self.retry_codes,
        )
        .await?;
        Ok(Ldap3SearchResults::new(
            ldap,
            stream,
            request.clone(),
            Arc::clone(&self.processor),
            Arc::clone(&self.retry_codes),
            Arc::clone(&self.ignore_codes),
        ))
    }

    async fn search_async(
        &mut self,
        request: &SearchRequest,
        listener: Arc<dyn SearchListener>,
    ) -> ProviderResult<Ldap3AsyncSearch> {
        let results = self.search(request).await?;
        Ok(Ldap3AsyncSearch::spawn(results, listener))
    }

    async fn abandon(&mut self, message_id: MessageId) -> ProviderResult<()> {
        self.ensure_open()?;
        self.ldap.abandon(message_id).await.map_err(|e| self.native_err(e))
    }

    async fn close(&mut self) -> ProviderResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        if let Err(err) = self.ldap.unbind().await {
            debug!(error = %err, "unbind on close failed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
