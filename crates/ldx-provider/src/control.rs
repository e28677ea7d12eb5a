//! Generic control processing.
//!
//! A [`ControlProcessor`] is parameterized over the backend's native control
//! type `T`. Backends register one handler per control OID in each
//! direction; the processor dispatches by OID.

use ldx_model::control::{find_paged_results, RequestControl, ResponseControl};

use crate::error::{ProviderError, ProviderResult};

/// Encodes one logical request control into the backend-native form.
pub trait RequestControlHandler<T>: Send + Sync {
    /// OID this handler encodes.
    fn oid(&self) -> &str;

    /// Encodes the control. Called only with controls matching [`oid`](Self::oid).
    fn encode(&self, control: &RequestControl) -> ProviderResult<T>;
}

/// Decodes one backend-native response control into the logical form.
pub trait ResponseControlHandler<T>: Send + Sync {
    /// OID this handler decodes.
    fn oid(&self) -> &str;

    /// Decodes the control. Called only with controls matching [`oid`](Self::oid).
    fn decode(&self, native: &T) -> ProviderResult<ResponseControl>;
}

/// Translates controls between the logical model and a backend's native type.
///
/// An unknown request control is a configuration problem and fails fast. An
/// unknown response control is preserved verbatim through the raw decoder;
/// response controls are never dropped.
pub struct ControlProcessor<T> {
    request_handlers: Vec<Box<dyn RequestControlHandler<T>>>,
    response_handlers: Vec<Box<dyn ResponseControlHandler<T>>>,
    raw_decoder: Box<dyn Fn(&T) -> ResponseControl + Send + Sync>,
}

impl<T> ControlProcessor<T> {
    /// Creates a processor with no handlers.
    ///
    /// `raw_decoder` converts any native response control into
    /// [`ResponseControl::Raw`]; it is the fallback for OIDs no registered
    /// handler covers.
    #[must_use]
    pub fn new(raw_decoder: impl Fn(&T) -> ResponseControl + Send + Sync + 'static) -> Self {
        Self {
            request_handlers: Vec::new(),
            response_handlers: Vec::new(),
            raw_decoder: Box::new(raw_decoder),
        }
    }

    /// Registers a request control handler.
    #[must_use]
    pub fn request_handler(mut self, handler: impl RequestControlHandler<T> + 'static) -> Self {
        self.request_handlers.push(Box::new(handler));
        self
    }

    /// Registers a response control handler.
    #[must_use]
    pub fn response_handler(mut self, handler: impl ResponseControlHandler<T> + 'static) -> Self {
        self.response_handlers.push(Box::new(handler));
        self
    }

    /// Encodes request controls to the native form.
    ///
    /// # Errors
    ///
    /// [`ProviderError::UnsupportedControl`] when a control's OID has no
    /// registered handler; encoding failures from the handler itself.
    pub fn process_request(&self, controls: &[RequestControl]) -> ProviderResult<Vec<T>> {
        controls
            .iter()
            .map(|control| {
                self.request_handlers
                    .iter()
                    .find(|h| h.oid() == control.oid())
                    .ok_or_else(|| ProviderError::UnsupportedControl(control.oid().to_string()))?
                    .encode(control)
            })
            .collect()
    }

    /// Decodes native response controls, preserving unknown ones verbatim.
    ///
    /// # Errors
    ///
    /// Decoding failures from a matching handler. `native_oid` extracts the
    /// OID used for dispatch.
    pub fn process_response(
        &self,
        controls: &[T],
        native_oid: impl Fn(&T) -> &str,
    ) -> ProviderResult<Vec<ResponseControl>> {
        controls
            .iter()
            .map(|native| {
                match self.response_handlers.iter().find(|h| h.oid() == native_oid(native)) {
                    Some(handler) => handler.decode(native),
                    None => Ok((self.raw_decoder)(native)),
                }
            })
            .collect()
    }

    /// Whether a search must be reissued to fetch the next page.
    ///
    /// True exactly when the response carries a paged results control with a
    /// non-empty cookie.
    #[must_use]
    pub fn search_again(&self, controls: &[ResponseControl]) -> bool {
        find_paged_results(controls).is_some_and(|paged| paged.has_more())
    }
}

impl<T> std::fmt::Debug for ControlProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlProcessor")
            .field("request_handlers", &self.request_handlers.len())
            .field("response_handlers", &self.response_handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldx_model::control::{PagedResultsControl, RawControl, PAGED_RESULTS_OID};

    /// Toy native control: just an OID and a byte payload.
    #[derive(Debug, Clone, PartialEq)]
    struct Native {
        oid: String,
        payload: Vec<u8>,
    }

    struct PagedHandler;

    impl RequestControlHandler<Native> for PagedHandler {
        fn oid(&self) -> &str {
            PAGED_RESULTS_OID
        }

        fn encode(&self, control: &RequestControl) -> ProviderResult<Native> {
            match control {
                RequestControl::PagedResults(paged) => Ok(Native {
                    oid: PAGED_RESULTS_OID.into(),
                    payload: paged.cookie.clone(),
                }),
                _ => unreachable!("dispatched by oid"),
            }
        }
    }

    impl ResponseControlHandler<Native> for PagedHandler {
        fn oid(&self) -> &str {
            PAGED_RESULTS_OID
        }

        fn decode(&self, native: &Native) -> ProviderResult<ResponseControl> {
            Ok(ResponseControl::PagedResults(PagedResultsControl {
                size: 0,
                cookie: native.payload.clone(),
                criticality: false,
            }))
        }
    }

    fn processor() -> ControlProcessor<Native> {
        ControlProcessor::new(|native: &Native| {
            ResponseControl::Raw(RawControl {
                oid: native.oid.clone(),
                criticality: false,
                value: Some(native.payload.clone()),
            })
        })
        .request_handler(PagedHandler)
        .response_handler(PagedHandler)
    }

    #[test]
    fn unknown_request_control_fails_fast() {
        let err = processor()
            .process_request(&[RequestControl::ManageDsaIt { criticality: false }])
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedControl(oid) if oid == "2.16.840.1.113730.3.4.2"));
    }

    #[test]
    fn known_request_control_is_encoded() {
        let native = processor()
            .process_request(&[RequestControl::PagedResults(PagedResultsControl::new(10))])
            .unwrap();
        assert_eq!(native.len(), 1);
        assert_eq!(native[0].oid, PAGED_RESULTS_OID);
    }

    #[test]
    fn unknown_response_control_is_preserved_raw() {
        let decoded = processor()
            .process_response(
                &[Native { oid: "1.2.3.4".into(), payload: vec![9] }],
                |n| &n.oid,
            )
            .unwrap();
        assert_eq!(
            decoded,
            vec![ResponseControl::Raw(RawControl {
                oid: "1.2.3.4".into(),
                criticality: false,
                value: Some(vec![9]),
            })]
        );
    }

    #[test]
    fn search_again_requires_a_nonempty_cookie() {
        let processor = processor();

        let more = vec![ResponseControl::PagedResults(PagedResultsControl {
            size: 0,
            cookie: vec![1, 2, 3],
            criticality: false,
        })];
        assert!(processor.search_again(&more));

        let done = vec![ResponseControl::PagedResults(PagedResultsControl {
            size: 0,
            cookie: Vec::new(),
            criticality: false,
        })];
        assert!(!processor.search_again(&done));

        assert!(!processor.search_again(&[]));
    }
}
