//! Operation requests.
//!
//! One struct per protocol operation. Requests are built up front and are
//! not mutated once submitted to a connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::RequestControl;
use crate::credential::Credential;
use crate::entry::LdapAttribute;
use crate::filter::SearchFilter;
use crate::sasl::SaslConfig;

/// What to do with referrals encountered during a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralBehavior {
    /// Chase the referral. Backends that cannot chase referrals reject the
    /// request before executing it.
    Follow,
    /// Fail the search when a referral is received.
    Throw,
    /// Drop referrals and continue.
    #[default]
    Ignore,
}

/// Alias dereferencing policy for searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DerefAliases {
    /// Never dereference aliases.
    #[default]
    Never,
    /// Dereference aliases in subordinates of the base object.
    Searching,
    /// Dereference aliases when locating the base object.
    Finding,
    /// Always dereference aliases.
    Always,
}

/// Scope of a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// The base object only.
    Object,
    /// Immediate children of the base object.
    OneLevel,
    /// The base object and all its subordinates.
    #[default]
    Subtree,
}

/// Which attributes a search returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnAttributes {
    /// All user attributes.
    #[default]
    All,
    /// No attributes (the `1.1` selector); entries come back DN-only.
    None,
    /// The named attributes.
    Named(Vec<String>),
}

impl ReturnAttributes {
    /// Creates a selection from attribute names.
    #[must_use]
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }
}

/// A bind request: anonymous, simple, or SASL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    /// DN to bind as; `None` for anonymous and some SASL binds.
    pub dn: Option<String>,
    /// Credential; `None` for anonymous and EXTERNAL binds.
    pub credential: Option<Credential>,
    /// SASL configuration; `None` for anonymous and simple binds.
    pub sasl: Option<SaslConfig>,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl BindRequest {
    /// Creates an anonymous bind request.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { dn: None, credential: None, sasl: None, controls: Vec::new() }
    }

    /// Creates a simple bind request.
    #[must_use]
    pub fn simple(dn: impl Into<String>, credential: Credential) -> Self {
        Self { dn: Some(dn.into()), credential: Some(credential), sasl: None, controls: Vec::new() }
    }

    /// Creates a SASL bind request.
    #[must_use]
    pub fn sasl(config: SaslConfig) -> Self {
        Self { dn: None, credential: None, sasl: Some(config), controls: Vec::new() }
    }

    /// Whether this is an anonymous bind.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.dn.is_none() && self.credential.is_none() && self.sasl.is_none()
    }
}

/// An add request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    /// DN of the entry to create.
    pub dn: String,
    /// Attributes of the new entry.
    pub attributes: Vec<LdapAttribute>,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl AddRequest {
    /// Creates an add request.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: Vec<LdapAttribute>) -> Self {
        Self { dn: dn.into(), attributes, controls: Vec::new() }
    }
}

/// A compare request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareRequest {
    /// DN of the entry to compare against.
    pub dn: String,
    /// Attribute to compare.
    pub attribute: String,
    /// Assertion value.
    pub value: String,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl CompareRequest {
    /// Creates a compare request.
    #[must_use]
    pub fn new(
        dn: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            dn: dn.into(),
            attribute: attribute.into(),
            value: value.into(),
            controls: Vec::new(),
        }
    }
}

/// A delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// DN of the entry to delete.
    pub dn: String,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl DeleteRequest {
    /// Creates a delete request.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self { dn: dn.into(), controls: Vec::new() }
    }
}

/// Kind of change a modification applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModificationType {
    /// Add the given values to the attribute.
    Add,
    /// Delete the given values, or the whole attribute when no values given.
    Delete,
    /// Replace the attribute values.
    Replace,
}

/// A single attribute modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeModification {
    /// Kind of change.
    pub modification: ModificationType,
    /// Attribute and values the change applies to.
    pub attribute: LdapAttribute,
}

/// A modify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRequest {
    /// DN of the entry to modify.
    pub dn: String,
    /// Modifications, applied in order.
    pub modifications: Vec<AttributeModification>,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl ModifyRequest {
    /// Creates a modify request.
    #[must_use]
    pub fn new(dn: impl Into<String>, modifications: Vec<AttributeModification>) -> Self {
        Self { dn: dn.into(), modifications, controls: Vec::new() }
    }
}

/// A modify-DN (rename) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyDnRequest {
    /// DN of the entry to rename.
    pub dn: String,
    /// New RDN.
    pub new_rdn: String,
    /// Whether to remove the old RDN attribute value.
    pub delete_old_rdn: bool,
    /// New superior DN, when the entry moves in the tree.
    pub new_superior: Option<String>,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl ModifyDnRequest {
    /// Creates a rename request that keeps the entry under its current parent.
    #[must_use]
    pub fn new(dn: impl Into<String>, new_rdn: impl Into<String>, delete_old_rdn: bool) -> Self {
        Self {
            dn: dn.into(),
            new_rdn: new_rdn.into(),
            delete_old_rdn,
            new_superior: None,
            controls: Vec::new(),
        }
    }
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Base DN of the search.
    pub base_dn: String,
    /// Search filter.
    pub filter: SearchFilter,
    /// Search scope.
    pub scope: SearchScope,
    /// Alias dereferencing policy.
    pub deref_aliases: DerefAliases,
    /// Attributes to return.
    pub return_attributes: ReturnAttributes,
    /// Maximum number of entries, 0 for no client-requested limit.
    pub size_limit: u32,
    /// Server-side time limit, `None` for no client-requested limit.
    pub time_limit: Option<Duration>,
    /// Return attribute names only, without values.
    pub types_only: bool,
    /// What to do with referrals.
    pub referral_behavior: ReferralBehavior,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl SearchRequest {
    /// Creates a subtree search with default limits and policies.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, filter: SearchFilter) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter,
            scope: SearchScope::default(),
            deref_aliases: DerefAliases::default(),
            return_attributes: ReturnAttributes::default(),
            size_limit: 0,
            time_limit: None,
            types_only: false,
            referral_behavior: ReferralBehavior::default(),
            controls: Vec::new(),
        }
    }

    /// Sets the search scope.
    #[must_use]
    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the attributes to return.
    #[must_use]
    pub fn return_attributes(mut self, attrs: ReturnAttributes) -> Self {
        self.return_attributes = attrs;
        self
    }

    /// Sets the size limit.
    #[must_use]
    pub fn size_limit(mut self, limit: u32) -> Self {
        self.size_limit = limit;
        self
    }

    /// Sets the time limit.
    #[must_use]
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Sets the referral behavior.
    #[must_use]
    pub fn referral_behavior(mut self, behavior: ReferralBehavior) -> Self {
        self.referral_behavior = behavior;
        self
    }

    /// Adds a request control.
    #[must_use]
    pub fn control(mut self, control: RequestControl) -> Self {
        self.controls.push(control);
        self
    }
}

/// An extended operation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedRequest {
    /// OID of the extended operation.
    pub oid: String,
    /// Request value, if the operation takes one.
    pub value: Option<Vec<u8>>,
    /// Controls to attach.
    pub controls: Vec<RequestControl>,
}

impl ExtendedRequest {
    /// Creates an extended request.
    #[must_use]
    pub fn new(oid: impl Into<String>, value: Option<Vec<u8>>) -> Self {
        Self { oid: oid.into(), value, controls: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_bind_has_no_identity() {
        let request = BindRequest::anonymous();
        assert!(request.is_anonymous());
        let simple = BindRequest::simple("cn=admin", Credential::from("pw"));
        assert!(!simple.is_anonymous());
    }

    #[test]
    fn search_defaults() {
        let request = SearchRequest::new("dc=example,dc=org", SearchFilter::new("(uid=jdoe)"));
        assert_eq!(request.scope, SearchScope::Subtree);
        assert_eq!(request.deref_aliases, DerefAliases::Never);
        assert_eq!(request.referral_behavior, ReferralBehavior::Ignore);
        assert_eq!(request.return_attributes, ReturnAttributes::All);
        assert_eq!(request.size_limit, 0);
        assert!(!request.types_only);
    }

    #[test]
    fn search_builder_applies_settings() {
        let request = SearchRequest::new("ou=people,dc=example,dc=org", SearchFilter::new("(x=y)"))
            .scope(SearchScope::OneLevel)
            .size_limit(10)
            .return_attributes(ReturnAttributes::named(["cn", "mail"]))
            .referral_behavior(ReferralBehavior::Throw);
        assert_eq!(request.scope, SearchScope::OneLevel);
        assert_eq!(request.size_limit, 10);
        assert_eq!(
            request.return_attributes,
            ReturnAttributes::Named(vec!["cn".into(), "mail".into()])
        );
        assert_eq!(request.referral_behavior, ReferralBehavior::Throw);
    }

    #[test]
    fn bind_request_never_serializes_the_credential() {
        let request = BindRequest::simple("cn=admin,dc=example,dc=org", Credential::from("pw"));
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("pw"));
        assert!(json.contains("***"));
    }
}
