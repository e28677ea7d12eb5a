//! Translation of `ldap3` failures into the provider taxonomy.

use ldap3::controls::RawControl;
use ldap3::{LdapError, LdapResult};
use ldx_model::control::{RawControl as ModelRawControl, ResponseControl};
use ldx_model::result_code::ResultCode;
use ldx_provider::control::ControlProcessor;
use ldx_provider::error::{ErrorKind, OperationFailure};

/// Maps a native error to a failure category.
///
/// `LdapResult` carries the server's own code; everything else is a client
/// side condition. Variants this backend has no sharper category for fall
/// back to [`ErrorKind::Local`].
pub(crate) fn classify(err: &LdapError) -> ErrorKind {
    match err {
        LdapError::LdapResult { result } => {
            ErrorKind::Server(ResultCode::from_value_lossy(result.rc))
        }
        LdapError::Io { .. } | LdapError::EndOfStream { .. } => ErrorKind::ConnectionClosed,
        LdapError::Timeout { .. } => ErrorKind::Timeout,
        LdapError::FilterParsing { .. } => ErrorKind::InvalidFilter,
        LdapError::DecodingUTF8 { .. } => ErrorKind::Decoding,
        LdapError::UrlParsing { .. } | LdapError::UnknownScheme { .. } => ErrorKind::ConnectFailed,
        _ => ErrorKind::Local,
    }
}

/// Converts a native error into an [`OperationFailure`], keeping everything
/// the server reported when the error wraps a protocol result.
pub(crate) fn translate(
    err: LdapError,
    processor: &ControlProcessor<RawControl>,
) -> OperationFailure {
    match err {
        LdapError::LdapResult { result } => failure_from_result(result, processor),
        other => OperationFailure::from_kind(classify(&other), other.to_string()),
    }
}

/// Builds an [`OperationFailure`] from a non-success protocol result.
pub(crate) fn failure_from_result(
    result: LdapResult,
    processor: &ControlProcessor<RawControl>,
) -> OperationFailure {
    let code = ResultCode::from_value_lossy(result.rc);
    let raws: Vec<RawControl> = result.ctrls.into_iter().map(|c| c.1).collect();
    let controls = decode_controls(processor, &raws);
    let mut failure = OperationFailure::new(code, result.text)
        .with_controls(controls)
        .with_referrals(result.refs);
    if !result.matched.is_empty() {
        failure = failure.with_matched_dn(result.matched);
    }
    failure
}

/// Decodes native response controls; a control list that fails to decode is
/// preserved verbatim rather than dropped.
pub(crate) fn decode_controls(
    processor: &ControlProcessor<RawControl>,
    raws: &[RawControl],
) -> Vec<ResponseControl> {
    processor.process_response(raws, |c| c.ctype.as_str()).unwrap_or_else(|_| {
        raws.iter()
            .map(|raw| {
                ResponseControl::Raw(ModelRawControl {
                    oid: raw.ctype.clone(),
                    criticality: raw.crit,
                    value: raw.val.clone(),
                })
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::default_processor;

    #[test]
    fn protocol_results_keep_the_server_code() {
        let err = LdapError::LdapResult {
            result: LdapResult {
                rc: 49,
                matched: String::new(),
                text: "invalid credentials".into(),
                refs: Vec::new(),
                ctrls: Vec::new(),
            },
        };
        assert_eq!(classify(&err), ErrorKind::Server(ResultCode::InvalidCredentials));

        let failure = translate(err, &default_processor());
        assert_eq!(failure.result_code, ResultCode::InvalidCredentials);
        assert_eq!(failure.message, "invalid credentials");
    }

    #[test]
    fn matched_dn_and_referrals_survive_translation() {
        let err = LdapError::LdapResult {
            result: LdapResult {
                rc: 32,
                matched: "dc=example,dc=org".into(),
                text: String::new(),
                refs: vec!["ldap://other.example.org/".into()],
                ctrls: Vec::new(),
            },
        };
        let failure = translate(err, &default_processor());
        assert_eq!(failure.result_code, ResultCode::NoSuchObject);
        assert_eq!(failure.matched_dn.as_deref(), Some("dc=example,dc=org"));
        assert_eq!(failure.referral_urls, vec!["ldap://other.example.org/".to_string()]);
    }

    #[test]
    fn stream_loss_is_a_closed_connection() {
        assert_eq!(classify(&LdapError::EndOfStream), ErrorKind::ConnectionClosed);
        assert_eq!(classify(&LdapError::FilterParsing), ErrorKind::InvalidFilter);
    }
}
