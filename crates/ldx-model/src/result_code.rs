//! LDAP result codes.

use serde::{Deserialize, Serialize};

/// Result code of a directory operation.
///
/// Covers the RFC 4511 protocol codes plus the client-side codes from the
/// LDAP C API draft (`serverDown`, `localError`, `ldapTimeout`,
/// `connectError`) that backends use when a failure never reached the server.
///
/// Native codes with no variant here are carried as [`ResultCode::Other`];
/// they are never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    CompareFalse,
    CompareTrue,
    AuthMethodNotSupported,
    StrongAuthRequired,
    PartialResults,
    Referral,
    AdminLimitExceeded,
    UnavailableCriticalExtension,
    ConfidentialityRequired,
    SaslBindInProgress,
    NoSuchAttribute,
    UndefinedAttributeType,
    InappropriateMatching,
    ConstraintViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    AliasProblem,
    InvalidDnSyntax,
    IsLeaf,
    AliasDereferencingProblem,
    InappropriateAuthentication,
    InvalidCredentials,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    LoopDetect,
    NamingViolation,
    ObjectClassViolation,
    NotAllowedOnNonleaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    ObjectClassModsProhibited,
    AffectsMultipleDsas,
    Other,
    ServerDown,
    LocalError,
    EncodingError,
    DecodingError,
    LdapTimeout,
    AuthUnknown,
    FilterError,
    UserCancelled,
    ParamError,
    NoMemory,
    ConnectError,
    LdapNotSupported,
    ControlNotFound,
    NoResultsReturned,
    MoreResultsToReturn,
    ClientLoop,
    ReferralLimitExceeded,
}

impl ResultCode {
    /// Returns the numeric protocol value of this code.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::TimeLimitExceeded => 3,
            Self::SizeLimitExceeded => 4,
            Self::CompareFalse => 5,
            Self::CompareTrue => 6,
            Self::AuthMethodNotSupported => 7,
            Self::StrongAuthRequired => 8,
            Self::PartialResults => 9,
            Self::Referral => 10,
            Self::AdminLimitExceeded => 11,
            Self::UnavailableCriticalExtension => 12,
            Self::ConfidentialityRequired => 13,
            Self::SaslBindInProgress => 14,
            Self::NoSuchAttribute => 16,
            Self::UndefinedAttributeType => 17,
            Self::InappropriateMatching => 18,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::InvalidAttributeSyntax => 21,
            Self::NoSuchObject => 32,
            Self::AliasProblem => 33,
            Self::InvalidDnSyntax => 34,
            Self::IsLeaf => 35,
            Self::AliasDereferencingProblem => 36,
            Self::InappropriateAuthentication => 48,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::LoopDetect => 54,
            Self::NamingViolation => 64,
            Self::ObjectClassViolation => 65,
            Self::NotAllowedOnNonleaf => 66,
            Self::NotAllowedOnRdn => 67,
            Self::EntryAlreadyExists => 68,
            Self::ObjectClassModsProhibited => 69,
            Self::AffectsMultipleDsas => 71,
            Self::Other => 80,
            Self::ServerDown => 81,
            Self::LocalError => 82,
            Self::EncodingError => 83,
            Self::DecodingError => 84,
            Self::LdapTimeout => 85,
            Self::AuthUnknown => 86,
            Self::FilterError => 87,
            Self::UserCancelled => 88,
            Self::ParamError => 89,
            Self::NoMemory => 90,
            Self::ConnectError => 91,
            Self::LdapNotSupported => 92,
            Self::ControlNotFound => 93,
            Self::NoResultsReturned => 94,
            Self::MoreResultsToReturn => 95,
            Self::ClientLoop => 96,
            Self::ReferralLimitExceeded => 97,
        }
    }

    /// Looks up the code for a numeric protocol value.
    #[must_use]
    pub const fn from_value(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Success,
            1 => Self::OperationsError,
            2 => Self::ProtocolError,
            3 => Self::TimeLimitExceeded,
            4 => Self::SizeLimitExceeded,
            5 => Self::CompareFalse,
            6 => Self::CompareTrue,
            7 => Self::AuthMethodNotSupported,
            8 => Self::StrongAuthRequired,
            9 => Self::PartialResults,
            10 => Self::Referral,
            11 => Self::AdminLimitExceeded,
            12 => Self::UnavailableCriticalExtension,
            13 => Self::ConfidentialityRequired,
            14 => Self::SaslBindInProgress,
            16 => Self::NoSuchAttribute,
            17 => Self::UndefinedAttributeType,
            18 => Self::InappropriateMatching,
            19 => Self::ConstraintViolation,
            20 => Self::AttributeOrValueExists,
            21 => Self::InvalidAttributeSyntax,
            32 => Self::NoSuchObject,
            33 => Self::AliasProblem,
            34 => Self::InvalidDnSyntax,
            35 => Self::IsLeaf,
            36 => Self::AliasDereferencingProblem,
            48 => Self::InappropriateAuthentication,
            49 => Self::InvalidCredentials,
            50 => Self::InsufficientAccessRights,
            51 => Self::Busy,
            52 => Self::Unavailable,
            53 => Self::UnwillingToPerform,
            54 => Self::LoopDetect,
            64 => Self::NamingViolation,
            65 => Self::ObjectClassViolation,
            66 => Self::NotAllowedOnNonleaf,
            67 => Self::NotAllowedOnRdn,
            68 => Self::EntryAlreadyExists,
            69 => Self::ObjectClassModsProhibited,
            71 => Self::AffectsMultipleDsas,
            80 => Self::Other,
            81 => Self::ServerDown,
            82 => Self::LocalError,
            83 => Self::EncodingError,
            84 => Self::DecodingError,
            85 => Self::LdapTimeout,
            86 => Self::AuthUnknown,
            87 => Self::FilterError,
            88 => Self::UserCancelled,
            89 => Self::ParamError,
            90 => Self::NoMemory,
            91 => Self::ConnectError,
            92 => Self::LdapNotSupported,
            93 => Self::ControlNotFound,
            94 => Self::NoResultsReturned,
            95 => Self::MoreResultsToReturn,
            96 => Self::ClientLoop,
            97 => Self::ReferralLimitExceeded,
            _ => return None,
        })
    }

    /// Maps a numeric value to a code, falling back to [`ResultCode::Other`]
    /// for values outside the known space.
    #[must_use]
    pub fn from_value_lossy(value: u32) -> Self {
        Self::from_value(value).unwrap_or(Self::Other)
    }

    /// Whether this code reports a successful operation.
    ///
    /// `compareTrue` and `compareFalse` both count: a compare that ran to
    /// completion succeeded regardless of the comparison outcome.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::CompareTrue | Self::CompareFalse)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({})", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_round_trips() {
        for v in 0..=97 {
            if let Some(code) = ResultCode::from_value(v) {
                assert_eq!(code.value(), v);
            }
        }
    }

    #[test]
    fn gaps_in_code_space_are_none() {
        assert_eq!(ResultCode::from_value(15), None);
        assert_eq!(ResultCode::from_value(70), None);
        assert_eq!(ResultCode::from_value(200), None);
    }

    #[test]
    fn lossy_mapping_falls_back_to_other() {
        assert_eq!(ResultCode::from_value_lossy(49), ResultCode::InvalidCredentials);
        assert_eq!(ResultCode::from_value_lossy(4242), ResultCode::Other);
    }

    #[test]
    fn compare_outcomes_are_successful() {
        assert!(ResultCode::CompareTrue.is_success());
        assert!(ResultCode::CompareFalse.is_success());
        assert!(!ResultCode::InvalidCredentials.is_success());
    }

    #[test]
    fn display_includes_numeric_value() {
        assert_eq!(ResultCode::InvalidCredentials.to_string(), "InvalidCredentials(49)");
    }
}
