//! The authentication pipeline.

use std::sync::Arc;

use ldx_model::result_code::ResultCode;
use tracing::debug;

use crate::authorization::{Authorization, AuthorizationHandler};
use crate::entry::{EntryResolver, NoOpEntryResolver};
use crate::error::{AuthError, AuthResult};
use crate::handler::{close_quietly, AuthenticationHandler};
use crate::resolver::DnResolver;
use crate::types::{AuthenticationCriteria, AuthenticationRequest, AuthenticationResponse};

/// Observes authentication outcomes.
///
/// Called once per attempt that reached credential verification, with the
/// resolved criteria and the final success flag. Account lockout counters
/// hook in here.
pub trait AuthenticationResultHandler: Send + Sync {
    /// Records the outcome.
    fn handle(&self, criteria: &AuthenticationCriteria, success: bool);
}

/// Post-processes every response before it is returned to the caller.
pub trait AuthenticationResponseHandler: Send + Sync {
    /// Adjusts the response in place.
    fn handle(&self, response: &mut AuthenticationResponse);
}

/// Drives the authentication pipeline: resolve the DN, verify the
/// credential, authorize, resolve the entry.
///
/// The handler's connection is reused for authorization and entry
/// resolution and closed exactly once, here. A user that does not resolve
/// produces a negative response without contacting the handler, so no
/// directory bind distinguishes unknown users from wrong credentials.
pub struct Authenticator<R, H, E = NoOpEntryResolver, A = Authorization> {
    resolver: R,
    handler: H,
    entry_resolver: E,
    authorization_handlers: Vec<A>,
    result_handlers: Vec<Arc<dyn AuthenticationResultHandler>>,
    response_handlers: Vec<Arc<dyn AuthenticationResponseHandler>>,
}

impl<R: DnResolver, H: AuthenticationHandler> Authenticator<R, H> {
    /// Creates an authenticator that attaches DN-only entries.
    #[must_use]
    pub fn new(resolver: R, handler: H) -> Self {
        Self {
            resolver,
            handler,
            entry_resolver: NoOpEntryResolver,
            authorization_handlers: Vec::new(),
            result_handlers: Vec::new(),
            response_handlers: Vec::new(),
        }
    }
}

impl<R, H, E, A> Authenticator<R, H, E, A>
where
    R: DnResolver,
    H: AuthenticationHandler,
    E: EntryResolver<H::Conn>,
    A: AuthorizationHandler<H::Conn>,
{
    /// Replaces the entry resolver.
    #[must_use]
    pub fn entry_resolver<E2: EntryResolver<H::Conn>>(
        self,
        entry_resolver: E2,
    ) -> Authenticator<R, H, E2, A> {
        Authenticator {
            resolver: self.resolver,
            handler: self.handler,
            entry_resolver,
            authorization_handlers: self.authorization_handlers,
            result_handlers: self.result_handlers,
            response_handlers: self.response_handlers,
        }
    }

    /// Adds an authorization handler. Handlers run in registration order.
    #[must_use]
    pub fn authorization_handler(mut self, handler: A) -> Self {
        self.authorization_handlers.push(handler);
        self
    }

    /// Adds a result handler.
    #[must_use]
    pub fn result_handler(mut self, handler: Arc<dyn AuthenticationResultHandler>) -> Self {
        self.result_handlers.push(handler);
        self
    }

    /// Adds a response handler.
    #[must_use]
    pub fn response_handler(mut self, handler: Arc<dyn AuthenticationResponseHandler>) -> Self {
        self.response_handlers.push(handler);
        self
    }

    /// Authenticates a user.
    ///
    /// Negative outcomes (unknown user, rejected credential, denied
    /// authorization) come back as unsuccessful responses.
    ///
    /// # Errors
    ///
    /// Directory faults, ambiguous DN resolution, and failures in
    /// authorization or entry resolution other than a denial.
    pub async fn authenticate(
        &self,
        request: &AuthenticationRequest,
    ) -> AuthResult<AuthenticationResponse> {
        if request.credential.is_empty() {
            return Ok(self.finish(AuthenticationResponse::negative(
                ResultCode::InvalidCredentials,
                "empty credential",
            )));
        }

        let Some(dn) = self.resolver.resolve(&request.user).await? else {
            debug!(user = %request.user, "user did not resolve to a DN");
            return Ok(self.finish(AuthenticationResponse::negative(
                ResultCode::NoSuchObject,
                "user did not resolve to a DN",
            )));
        };
        debug!(user = %request.user, dn = %dn, "resolved DN");

        let criteria = AuthenticationCriteria::new(dn, request.credential.clone());
        let handler_response = self.handler.authenticate(&criteria).await?;
        let mut connection = handler_response.connection;
        let mut response = AuthenticationResponse {
            success: handler_response.success,
            result_code: handler_response.result_code,
            diagnostic_message: handler_response.diagnostic_message,
            dn: Some(criteria.dn.clone()),
            entry: None,
        };

        if response.success {
            for handler in &self.authorization_handlers {
                match handler.authorize(&criteria.dn, &mut connection).await {
                    Ok(()) => {}
                    Err(AuthError::NotAuthorized(reason)) => {
                        response.success = false;
                        response.result_code = ResultCode::InsufficientAccessRights;
                        response.diagnostic_message = reason;
                        break;
                    }
                    Err(err) => {
                        close_quietly(&mut connection).await;
                        return Err(err);
                    }
                }
            }
        }

        if response.success {
            match self.entry_resolver.resolve_entry(&criteria.dn, &mut connection).await {
                Ok(entry) => response.entry = Some(entry),
                Err(err) => {
                    close_quietly(&mut connection).await;
                    return Err(err);
                }
            }
        }

        close_quietly(&mut connection).await;

        for handler in &self.result_handlers {
            handler.handle(&criteria, response.success);
        }
        debug!(
            dn = %criteria.dn,
            success = response.success,
            code = ?response.result_code,
            "authentication complete"
        );
        Ok(self.finish(response))
    }

    fn finish(&self, mut response: AuthenticationResponse) -> AuthenticationResponse {
        for handler in &self.response_handlers {
            handler.handle(&mut response);
        }
        response
    }
}
