//! Control translation between the logical model and `ldap3`'s wire form.
//!
//! Paged results piggybacks on the codec `ldap3` ships; the server-side sort
//! controls are BER-encoded and decoded here via `ldap3::asn1`.

use bytes::BytesMut;
use ldap3::asn1::{
    parse_tag, parse_uint, write, ASNTag, Boolean, OctetString, Sequence, Tag, TagClass, Types,
};
use ldap3::controls::{MakeCritical, PagedResults as NativePagedResults, RawControl};
use ldx_model::control::{
    PagedResultsControl, RawControl as ModelRawControl, RequestControl, ResponseControl,
    SortKey, SortResponseControl, MANAGE_DSA_IT_OID, PAGED_RESULTS_OID, SORT_REQUEST_OID,
    SORT_RESPONSE_OID,
};
use ldx_model::result_code::ResultCode;
use ldx_provider::control::{ControlProcessor, RequestControlHandler, ResponseControlHandler};
use ldx_provider::error::{ErrorKind, OperationFailure, ProviderError, ProviderResult};

/// Builds the control processor with every handler this backend supports.
#[must_use]
pub fn default_processor() -> ControlProcessor<RawControl> {
    ControlProcessor::new(|native: &RawControl| {
        ResponseControl::Raw(ModelRawControl {
            oid: native.ctype.clone(),
            criticality: native.crit,
            value: native.val.clone(),
        })
    })
    .request_handler(PagedResultsHandler)
    .request_handler(SortRequestHandler)
    .request_handler(ManageDsaItHandler)
    .response_handler(PagedResultsHandler)
    .response_handler(SortResponseHandler)
}

fn encoding_error(message: impl Into<String>) -> ProviderError {
    ProviderError::Operation(OperationFailure::from_kind(ErrorKind::Encoding, message))
}

fn decoding_error(message: impl Into<String>) -> ProviderError {
    ProviderError::Operation(OperationFailure::from_kind(ErrorKind::Decoding, message))
}

/// Simple paged results (RFC 2696), via the codec `ldap3` provides.
struct PagedResultsHandler;

impl RequestControlHandler<RawControl> for PagedResultsHandler {
    fn oid(&self) -> &str {
        PAGED_RESULTS_OID
    }

    fn encode(&self, control: &RequestControl) -> ProviderResult<RawControl> {
        let RequestControl::PagedResults(paged) = control else {
            return Err(ProviderError::UnsupportedControl(control.oid().to_string()));
        };
        let size = i32::try_from(paged.size)
            .map_err(|_| encoding_error("paged results size exceeds the protocol range"))?;
        let native = NativePagedResults { size, cookie: paged.cookie.clone() };
        Ok(if paged.criticality { native.critical().into() } else { native.into() })
    }
}

impl ResponseControlHandler<RawControl> for PagedResultsHandler {
    fn oid(&self) -> &str {
        PAGED_RESULTS_OID
    }

    fn decode(&self, native: &RawControl) -> ProviderResult<ResponseControl> {
        let parsed: NativePagedResults = native.parse();
        Ok(ResponseControl::PagedResults(PagedResultsControl {
            size: u32::try_from(parsed.size).unwrap_or(0),
            cookie: parsed.cookie,
            criticality: native.crit,
        }))
    }
}

/// Server-side sort request (RFC 2891).
struct SortRequestHandler;

impl RequestControlHandler<RawControl> for SortRequestHandler {
    fn oid(&self) -> &str {
        SORT_REQUEST_OID
    }

    fn encode(&self, control: &RequestControl) -> ProviderResult<RawControl> {
        let RequestControl::SortRequest(sort) = control else {
            return Err(ProviderError::UnsupportedControl(control.oid().to_string()));
        };
        if sort.keys.is_empty() {
            return Err(ProviderError::configuration("sort request control needs sort keys"));
        }
        let tagged = Tag::Sequence(Sequence {
            inner: sort.keys.iter().map(sort_key_tag).collect(),
            ..Default::default()
        })
        .into_structure();

        let mut buffer = BytesMut::new();
        write::encode_into(&mut buffer, tagged)
            .map_err(|e| encoding_error(format!("sort control encoding failed: {e}")))?;
        Ok(RawControl {
            ctype: SORT_REQUEST_OID.to_owned(),
            crit: sort.criticality,
            val: Some(buffer.to_vec()),
        })
    }
}

// SortKeyList ::= SEQUENCE OF SEQUENCE {
//   attributeType  AttributeDescription,
//   orderingRule   [0] MatchingRuleId OPTIONAL,
//   reverseOrder   [1] BOOLEAN DEFAULT FALSE }
fn sort_key_tag(key: &SortKey) -> Tag {
    let mut inner = vec![Tag::OctetString(OctetString {
        inner: key.attribute.clone().into_bytes(),
        ..Default::default()
    })];
    if let Some(rule) = &key.matching_rule {
        inner.push(Tag::OctetString(OctetString {
            id: 0,
            class: TagClass::Context,
            inner: rule.clone().into_bytes(),
        }));
    }
    if key.reverse {
        inner.push(Tag::Boolean(Boolean { id: 1, class: TagClass::Context, inner: true }));
    }
    Tag::Sequence(Sequence { inner, ..Default::default() })
}

/// Server-side sort response (RFC 2891).
struct SortResponseHandler;

impl ResponseControlHandler<RawControl> for SortResponseHandler {
    fn oid(&self) -> &str {
        SORT_RESPONSE_OID
    }

    fn decode(&self, native: &RawControl) -> ProviderResult<ResponseControl> {
        let val = native
            .val
            .as_deref()
            .ok_or_else(|| decoding_error("sort response control has no value"))?;
        let (_, tag) =
            parse_tag(val).map_err(|_| decoding_error("malformed sort response control"))?;
        let mut parts = tag
            .expect_constructed()
            .ok_or_else(|| decoding_error("sort response control is not a sequence"))?
            .into_iter();

        let result_bytes = parts
            .next()
            .and_then(|t| t.match_class(TagClass::Universal))
            .and_then(|t| t.match_id(Types::Enumerated as u64))
            .and_then(|t| t.expect_primitive())
            .ok_or_else(|| decoding_error("sort response control lacks a sortResult"))?;
        let (_, value) = parse_uint(result_bytes.as_slice())
            .map_err(|_| decoding_error("sort response sortResult is not an integer"))?;
        let result =
            ResultCode::from_value_lossy(u32::try_from(value).unwrap_or(ResultCode::Other.value()));

        let attribute = parts
            .next()
            .and_then(|t| t.match_class(TagClass::Context))
            .and_then(|t| t.match_id(0))
            .and_then(|t| t.expect_primitive())
            .map(String::from_utf8)
            .transpose()
            .map_err(|_| decoding_error("sort response attribute is not valid UTF-8"))?;

        Ok(ResponseControl::SortResponse(SortResponseControl {
            result,
            attribute,
            criticality: native.crit,
        }))
    }
}

/// Manage-DSA-IT (RFC 3296): no value, pure passthrough.
struct ManageDsaItHandler;

impl RequestControlHandler<RawControl> for ManageDsaItHandler {
    fn oid(&self) -> &str {
        MANAGE_DSA_IT_OID
    }

    fn encode(&self, control: &RequestControl) -> ProviderResult<RawControl> {
        Ok(RawControl {
            ctype: MANAGE_DSA_IT_OID.to_owned(),
            crit: control.criticality(),
            val: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldx_model::control::SortRequestControl;

    #[test]
    fn paged_results_round_trips_through_ber() {
        let processor = default_processor();
        let request = RequestControl::PagedResults(PagedResultsControl {
            size: 5,
            cookie: vec![0xca, 0xfe],
            criticality: false,
        });
        let native = processor.process_request(std::slice::from_ref(&request)).unwrap();
        assert_eq!(native[0].ctype, PAGED_RESULTS_OID);

        let decoded =
            processor.process_response(&native, |c| c.ctype.as_str()).unwrap();
        match &decoded[0] {
            ResponseControl::PagedResults(paged) => {
                assert_eq!(paged.size, 5);
                assert_eq!(paged.cookie, vec![0xca, 0xfe]);
            }
            other => panic!("unexpected control {other:?}"),
        }
    }

    #[test]
    fn sort_request_encodes_the_rfc_2891_key_list() {
        let processor = default_processor();
        let request = RequestControl::SortRequest(SortRequestControl::new(vec![SortKey::new(
            "cn",
        )]));
        let native = processor.process_request(&[request]).unwrap();
        assert_eq!(native[0].ctype, SORT_REQUEST_OID);
        // SEQUENCE { SEQUENCE { OCTET STRING "cn" } }
        assert_eq!(
            native[0].val.as_deref().unwrap(),
            &[0x30, 0x06, 0x30, 0x04, 0x04, 0x02, b'c', b'n']
        );
    }

    #[test]
    fn sort_request_marks_reverse_keys() {
        let processor = default_processor();
        let request =
            RequestControl::SortRequest(SortRequestControl::new(vec![SortKey::reverse("cn")]));
        let native = processor.process_request(&[request]).unwrap();
        // reverseOrder [1] BOOLEAN TRUE appended to the key sequence
        assert_eq!(
            native[0].val.as_deref().unwrap(),
            &[0x30, 0x09, 0x30, 0x07, 0x04, 0x02, b'c', b'n', 0x81, 0x01, 0xff]
        );
    }

    #[test]
    fn empty_sort_key_list_is_a_configuration_error() {
        let processor = default_processor();
        let request = RequestControl::SortRequest(SortRequestControl::new(Vec::new()));
        assert!(matches!(
            processor.process_request(&[request]),
            Err(ProviderError::Configuration(_))
        ));
    }

    #[test]
    fn sort_response_decodes_success() {
        let processor = default_processor();
        let native = RawControl {
            ctype: SORT_RESPONSE_OID.to_owned(),
            crit: false,
            // SEQUENCE { ENUMERATED 0 }
            val: Some(vec![0x30, 0x03, 0x0a, 0x01, 0x00]),
        };
        let decoded = processor.process_response(&[native], |c| c.ctype.as_str()).unwrap();
        match &decoded[0] {
            ResponseControl::SortResponse(sort) => {
                assert_eq!(sort.result, ResultCode::Success);
                assert_eq!(sort.attribute, None);
            }
            other => panic!("unexpected control {other:?}"),
        }
    }

    #[test]
    fn sort_response_decodes_failure_with_attribute() {
        let processor = default_processor();
        let native = RawControl {
            ctype: SORT_RESPONSE_OID.to_owned(),
            crit: false,
            // SEQUENCE { ENUMERATED 16, [0] "foo" }
            val: Some(vec![0x30, 0x08, 0x0a, 0x01, 0x10, 0x80, 0x03, b'f', b'o', b'o']),
        };
        let decoded = processor.process_response(&[native], |c| c.ctype.as_str()).unwrap();
        match &decoded[0] {
            ResponseControl::SortResponse(sort) => {
                assert_eq!(sort.result, ResultCode::NoSuchAttribute);
                assert_eq!(sort.attribute.as_deref(), Some("foo"));
            }
            other => panic!("unexpected control {other:?}"),
        }
    }

    #[test]
    fn unknown_response_control_is_kept_raw() {
        let processor = default_processor();
        let native = RawControl {
            ctype: "1.3.6.1.4.1.42.2.27.8.5.1".to_owned(),
            crit: false,
            val: Some(vec![0x01]),
        };
        let decoded = processor.process_response(&[native], |c| c.ctype.as_str()).unwrap();
        assert!(matches!(&decoded[0], ResponseControl::Raw(raw)
            if raw.oid == "1.3.6.1.4.1.42.2.27.8.5.1" && raw.value == Some(vec![0x01])));
    }
}
