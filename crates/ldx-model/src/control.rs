//! Logical request and response controls.
//!
//! Controls here are protocol-level descriptions only. Encoding a request
//! control to a backend-native control, and decoding a native response
//! control back, is done by the control handlers each backend registers with
//! its `ControlProcessor`.

use serde::{Deserialize, Serialize};

use crate::result_code::ResultCode;

/// OID of the simple paged results control (RFC 2696).
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// OID of the server-side sort request control (RFC 2891).
pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";

/// OID of the server-side sort response control (RFC 2891).
pub const SORT_RESPONSE_OID: &str = "1.2.840.113556.1.4.474";

/// OID of the manage-DSA-IT request control (RFC 3296).
pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";

/// Simple paged results control (RFC 2696).
///
/// Sent on a search request with the page size and the cookie from the
/// previous page (empty on the first request); returned on the search
/// response with the next cookie. An empty response cookie means the result
/// set is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResultsControl {
    /// Requested page size on a request; the server's estimate of the total
    /// result size on a response (0 if the server does not provide one).
    pub size: u32,
    /// Opaque paging cookie.
    pub cookie: Vec<u8>,
    /// Control criticality.
    pub criticality: bool,
}

impl PagedResultsControl {
    /// Creates a control for the first page of a paged search.
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self { size, cookie: Vec::new(), criticality: false }
    }

    /// Whether the paging cookie indicates more pages remain.
    #[must_use]
    pub fn has_more(&self) -> bool {
        !self.cookie.is_empty()
    }
}

/// A single sort key of a server-side sort request (RFC 2891).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Attribute to sort on.
    pub attribute: String,
    /// Optional matching rule OID.
    pub matching_rule: Option<String>,
    /// Sort in reverse order.
    pub reverse: bool,
}

impl SortKey {
    /// Creates an ascending sort key with the default matching rule.
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), matching_rule: None, reverse: false }
    }

    /// Creates a descending sort key with the default matching rule.
    #[must_use]
    pub fn reverse(attribute: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), matching_rule: None, reverse: true }
    }
}

/// Server-side sort request control (RFC 2891).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequestControl {
    /// Sort keys in order of precedence. Must not be empty.
    pub keys: Vec<SortKey>,
    /// Control criticality.
    pub criticality: bool,
}

impl SortRequestControl {
    /// Creates a non-critical sort request control.
    #[must_use]
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self { keys, criticality: false }
    }
}

/// Server-side sort response control (RFC 2891).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortResponseControl {
    /// Outcome of the sort.
    pub result: ResultCode,
    /// Attribute the server could not sort on, when the sort failed.
    pub attribute: Option<String>,
    /// Control criticality.
    pub criticality: bool,
}

/// A control carried verbatim, with no logical interpretation.
///
/// Response controls whose OID no registered handler recognizes are
/// preserved in this form; they are never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawControl {
    /// Control OID.
    pub oid: String,
    /// Control criticality.
    pub criticality: bool,
    /// BER-encoded control value, if any.
    pub value: Option<Vec<u8>>,
}

/// A control attached to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestControl {
    /// Simple paged results (RFC 2696).
    PagedResults(PagedResultsControl),
    /// Server-side sort (RFC 2891).
    SortRequest(SortRequestControl),
    /// Manage-DSA-IT: treat referral entries as ordinary entries (RFC 3296).
    ManageDsaIt {
        /// Control criticality.
        criticality: bool,
    },
    /// A control this library has no logical model for.
    Raw(RawControl),
}

impl RequestControl {
    /// Returns the OID of this control.
    #[must_use]
    pub fn oid(&self) -> &str {
        match self {
            Self::PagedResults(_) => PAGED_RESULTS_OID,
            Self::SortRequest(_) => SORT_REQUEST_OID,
            Self::ManageDsaIt { .. } => MANAGE_DSA_IT_OID,
            Self::Raw(raw) => &raw.oid,
        }
    }

    /// Returns the criticality of this control.
    #[must_use]
    pub fn criticality(&self) -> bool {
        match self {
            Self::PagedResults(c) => c.criticality,
            Self::SortRequest(c) => c.criticality,
            Self::ManageDsaIt { criticality } => *criticality,
            Self::Raw(raw) => raw.criticality,
        }
    }
}

/// A control received on a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseControl {
    /// Simple paged results (RFC 2696).
    PagedResults(PagedResultsControl),
    /// Server-side sort result (RFC 2891).
    SortResponse(SortResponseControl),
    /// A control no registered handler recognized, carried verbatim.
    Raw(RawControl),
}

impl ResponseControl {
    /// Returns the OID of this control.
    #[must_use]
    pub fn oid(&self) -> &str {
        match self {
            Self::PagedResults(_) => PAGED_RESULTS_OID,
            Self::SortResponse(_) => SORT_RESPONSE_OID,
            Self::Raw(raw) => &raw.oid,
        }
    }

    /// Returns the paged results control, if that is what this is.
    #[must_use]
    pub fn as_paged_results(&self) -> Option<&PagedResultsControl> {
        match self {
            Self::PagedResults(c) => Some(c),
            _ => None,
        }
    }
}

/// Finds the paged results control in a response control list.
#[must_use]
pub fn find_paged_results(controls: &[ResponseControl]) -> Option<&PagedResultsControl> {
    controls.iter().find_map(ResponseControl::as_paged_results)
}
