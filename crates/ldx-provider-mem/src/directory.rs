//! The shared in-memory entry store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use aws_lc_rs::digest;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ldx_model::control::PagedResultsControl;
use ldx_model::entry::LdapEntry;
use ldx_model::request::{
    AttributeModification, ModificationType, ReturnAttributes, SearchRequest, SearchScope,
};
use ldx_model::result_code::ResultCode;
use ldx_provider::error::{ErrorKind, OperationFailure};
use parking_lot::RwLock;
use tracing::debug;

use crate::filter::Filter;

/// Page and control parameters of one search execution.
#[derive(Debug, Default)]
pub(crate) struct SearchParams {
    /// Requested page size and cookie, when the request carried paging.
    pub page: Option<(u32, Vec<u8>)>,
    /// Whether referral entries are returned as ordinary entries.
    pub manage_dsa_it: bool,
}

/// Result of one search execution against the store.
#[derive(Debug)]
pub(crate) struct SearchOutcome {
    pub entries: Vec<LdapEntry>,
    pub referrals: Vec<String>,
    pub result_code: ResultCode,
    pub paged: Option<PagedResultsControl>,
}

#[derive(Default)]
struct Store {
    entries: BTreeMap<String, LdapEntry>,
    referrals: BTreeMap<String, Vec<String>>,
    size_limit: Option<usize>,
    search_count: u64,
    failures: VecDeque<ResultCode>,
}

/// A shared in-memory directory.
///
/// Clones share the same store. Entry DNs are normalized, so lookups are
/// case- and whitespace-insensitive the way directory servers treat DNs.
#[derive(Clone, Default)]
pub struct Directory {
    store: Arc<RwLock<Store>>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn add_entry(&self, entry: LdapEntry) {
        self.store.write().entries.insert(normalize_dn(&entry.dn), entry);
    }

    /// Adds a referral at the given DN; searches crossing it produce the URLs.
    pub fn add_referral(&self, dn: impl Into<String>, urls: Vec<String>) {
        self.store.write().referrals.insert(normalize_dn(&dn.into()), urls);
    }

    /// Caps the number of entries any single search returns, mimicking a
    /// server-side administrative limit.
    pub fn set_size_limit(&self, limit: usize) {
        self.store.write().size_limit = Some(limit);
    }

    /// Queues result codes that the next searches fail with, in order.
    pub fn fail_searches(&self, codes: impl IntoIterator<Item = ResultCode>) {
        self.store.write().failures.extend(codes);
    }

    /// Number of search requests served, including failed ones.
    ///
    /// A paged search counts once per page request.
    #[must_use]
    pub fn search_count(&self) -> u64 {
        self.store.read().search_count
    }

    /// Looks up an entry by DN.
    #[must_use]
    pub fn entry(&self, dn: &str) -> Option<LdapEntry> {
        self.store.read().entries.get(&normalize_dn(dn)).cloned()
    }

    /// Number of entries in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().entries.is_empty()
    }

    pub(crate) fn execute_search(
        &self,
        request: &SearchRequest,
        params: &SearchParams,
    ) -> Result<SearchOutcome, OperationFailure> {
        let mut store = self.store.write();
        store.search_count += 1;

        if let Some(code) = store.failures.pop_front() {
            return Err(OperationFailure::new(code, "injected failure"));
        }

        let filter = Filter::parse(&request.filter.format())
            .map_err(|e| OperationFailure::from_kind(ErrorKind::InvalidFilter, e))?;

        let base = normalize_dn(&request.base_dn);
        let mut matched: Vec<LdapEntry> = store
            .entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, request.scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| project(entry, &request.return_attributes))
            .collect();

        let referrals: Vec<String> = if params.manage_dsa_it {
            // Referral objects become plain entries under manage-DSA-IT.
            for (dn, urls) in &store.referrals {
                if in_scope(dn, &base, request.scope) {
                    let mut entry = LdapEntry::new(dn.clone());
                    for url in urls {
                        entry.add_attribute("ref", url.clone());
                    }
                    matched.push(entry);
                }
            }
            Vec::new()
        } else {
            store
                .referrals
                .iter()
                .filter(|(dn, _)| in_scope(dn, &base, request.scope))
                .flat_map(|(_, urls)| urls.iter().cloned())
                .collect()
        };

        let mut result_code = ResultCode::Success;
        let mut limit = store.size_limit.unwrap_or(usize::MAX);
        if request.size_limit > 0 {
            limit = limit.min(request.size_limit as usize);
        }
        if matched.len() > limit {
            matched.truncate(limit);
            result_code = ResultCode::SizeLimitExceeded;
        }

        let paged = match &params.page {
            Some((size, cookie)) => {
                let offset = decode_cookie(cookie)?;
                let total = matched.len();
                let end = total.min(offset.saturating_add(*size as usize));
                let page: Vec<LdapEntry> =
                    matched.drain(..).skip(offset).take(end.saturating_sub(offset)).collect();
                matched = page;
                let next = if end < total { encode_cookie(end) } else { Vec::new() };
                Some(PagedResultsControl {
                    size: u32::try_from(total).unwrap_or(u32::MAX),
                    cookie: next,
                    criticality: false,
                })
            }
            None => None,
        };

        debug!(
            base = %request.base_dn,
            entries = matched.len(),
            referrals = referrals.len(),
            code = %result_code,
            "served search"
        );
        Ok(SearchOutcome { entries: matched, referrals, result_code, paged })
    }

    /// Validates a simple bind. Unknown DNs and wrong passwords both report
    /// invalidCredentials, like a real server.
    pub(crate) fn bind(&self, dn: &str, password: &[u8]) -> ResultCode {
        let store = self.store.read();
        let Some(entry) = store.entries.get(&normalize_dn(dn)) else {
            return ResultCode::InvalidCredentials;
        };
        let ok = entry
            .get_attrs("userPassword")
            .into_iter()
            .flatten()
            .any(|stored| password_matches(stored, password));
        if ok {
            ResultCode::Success
        } else {
            ResultCode::InvalidCredentials
        }
    }

    pub(crate) fn compare(&self, dn: &str, attribute: &str, value: &str) -> Option<bool> {
        let entry = self.entry(dn)?;
        let matched = entry
            .attributes
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .flat_map(|(_, values)| values)
            .any(|stored| {
                // Hashed values compare exactly; plain values case-insensitively.
                if stored.starts_with('{') {
                    stored == value
                } else {
                    stored.eq_ignore_ascii_case(value)
                }
            });
        Some(matched)
    }

    pub(crate) fn add(&self, entry: LdapEntry) -> Result<(), OperationFailure> {
        let mut store = self.store.write();
        let key = normalize_dn(&entry.dn);
        if store.entries.contains_key(&key) {
            return Err(OperationFailure::new(ResultCode::EntryAlreadyExists, entry.dn));
        }
        store.entries.insert(key, entry);
        Ok(())
    }

    pub(crate) fn delete(&self, dn: &str) -> Result<(), OperationFailure> {
        let mut store = self.store.write();
        match store.entries.remove(&normalize_dn(dn)) {
            Some(_) => Ok(()),
            None => Err(no_such_object(dn)),
        }
    }

    pub(crate) fn modify(
        &self,
        dn: &str,
        modifications: &[AttributeModification],
    ) -> Result<(), OperationFailure> {
        let mut store = self.store.write();
        let entry = store.entries.get_mut(&normalize_dn(dn)).ok_or_else(|| no_such_object(dn))?;
        for m in modifications {
            let name = &m.attribute.name;
            match m.modification {
                ModificationType::Add => {
                    entry
                        .attributes
                        .entry(name.clone())
                        .or_default()
                        .extend(m.attribute.values.iter().cloned());
                }
                ModificationType::Delete => {
                    if m.attribute.values.is_empty() {
                        entry.attributes.remove(name);
                    } else if let Some(values) = entry.attributes.get_mut(name) {
                        values.retain(|v| !m.attribute.values.contains(v));
                        if values.is_empty() {
                            entry.attributes.remove(name);
                        }
                    }
                }
                ModificationType::Replace => {
                    if m.attribute.values.is_empty() {
                        entry.attributes.remove(name);
                    } else {
                        entry.attributes.insert(name.clone(), m.attribute.values.clone());
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> Result<(), OperationFailure> {
        let mut store = self.store.write();
        let mut entry =
            store.entries.remove(&normalize_dn(dn)).ok_or_else(|| no_such_object(dn))?;
        let parent = match new_superior {
            Some(superior) => superior.to_owned(),
            None => parent_dn(&entry.dn).unwrap_or_default(),
        };
        let new_dn =
            if parent.is_empty() { new_rdn.to_owned() } else { format!("{new_rdn},{parent}") };
        entry.dn = new_dn.clone();
        store.entries.insert(normalize_dn(&new_dn), entry);
        Ok(())
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory").field("entries", &self.len()).finish()
    }
}

fn no_such_object(dn: &str) -> OperationFailure {
    OperationFailure::from_kind(ErrorKind::NoSuchEntry, dn.to_owned())
}

/// Normalizes a DN for use as a lookup key.
fn normalize_dn(dn: &str) -> String {
    dn.split(',').map(|rdn| rdn.trim().to_ascii_lowercase()).collect::<Vec<_>>().join(",")
}

fn parent_dn(dn: &str) -> Option<String> {
    dn.split_once(',').map(|(_, parent)| parent.trim().to_owned())
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Object => dn == base,
        SearchScope::OneLevel => {
            dn.split_once(',').is_some_and(|(_, parent)| normalize_dn(parent) == *base)
        }
        SearchScope::Subtree => {
            dn == base || (base.is_empty() || dn.ends_with(&format!(",{base}")))
        }
    }
}

fn project(entry: &LdapEntry, selection: &ReturnAttributes) -> LdapEntry {
    match selection {
        ReturnAttributes::All => entry.clone(),
        ReturnAttributes::None => LdapEntry::new(entry.dn.clone()),
        ReturnAttributes::Named(names) => {
            let mut projected = LdapEntry::new(entry.dn.clone());
            for (name, values) in &entry.attributes {
                if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    projected.attributes.insert(name.clone(), values.clone());
                }
            }
            for (name, values) in &entry.binary_attributes {
                if names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    projected.binary_attributes.insert(name.clone(), values.clone());
                }
            }
            projected
        }
    }
}

fn encode_cookie(offset: usize) -> Vec<u8> {
    (offset as u64).to_be_bytes().to_vec()
}

fn decode_cookie(cookie: &[u8]) -> Result<usize, OperationFailure> {
    if cookie.is_empty() {
        return Ok(0);
    }
    let bytes: [u8; 8] = cookie
        .try_into()
        .map_err(|_| OperationFailure::from_kind(ErrorKind::Decoding, "malformed paging cookie"))?;
    Ok(u64::from_be_bytes(bytes) as usize)
}

/// Checks a presented password against a stored `userPassword` value,
/// either plaintext or `{SCHEME}base64(digest)`.
fn password_matches(stored: &str, presented: &[u8]) -> bool {
    let Some(rest) = stored.strip_prefix('{') else {
        return stored.as_bytes() == presented;
    };
    let Some((scheme, b64)) = rest.split_once('}') else {
        return stored.as_bytes() == presented;
    };
    let algorithm = match scheme.to_ascii_uppercase().as_str() {
        "SHA" | "SHA1" => &digest::SHA1_FOR_LEGACY_USE_ONLY,
        "SHA256" => &digest::SHA256,
        "SHA512" => &digest::SHA512,
        _ => return false,
    };
    BASE64.encode(digest::digest(algorithm, presented).as_ref()) == b64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldx_model::filter::SearchFilter;

    fn people() -> Directory {
        let dir = Directory::new();
        dir.add_entry(LdapEntry::new("ou=people,dc=example,dc=org").with_attribute(
            "objectClass",
            "organizationalUnit",
        ));
        for uid in ["adoe", "bdoe", "cdoe"] {
            dir.add_entry(
                LdapEntry::new(format!("uid={uid},ou=people,dc=example,dc=org"))
                    .with_attribute("objectClass", "person")
                    .with_attribute("uid", uid),
            );
        }
        dir
    }

    fn search(dir: &Directory, request: &SearchRequest, params: &SearchParams) -> SearchOutcome {
        dir.execute_search(request, params).unwrap()
    }

    #[test]
    fn scope_limits_matches() {
        let dir = people();
        let subtree = SearchRequest::new("dc=example,dc=org", SearchFilter::new("(uid=*)"));
        assert_eq!(search(&dir, &subtree, &SearchParams::default()).entries.len(), 3);

        let one_level = SearchRequest::new("ou=people,dc=example,dc=org", SearchFilter::new("(objectClass=*)"))
            .scope(SearchScope::OneLevel);
        assert_eq!(search(&dir, &one_level, &SearchParams::default()).entries.len(), 3);

        let object = SearchRequest::new("uid=adoe,ou=people,dc=example,dc=org", SearchFilter::new("(objectClass=person)"))
            .scope(SearchScope::Object);
        assert_eq!(search(&dir, &object, &SearchParams::default()).entries.len(), 1);
    }

    #[test]
    fn paging_slices_with_cookies() {
        let dir = people();
        let request = SearchRequest::new("ou=people,dc=example,dc=org", SearchFilter::new("(uid=*)"));

        let first = search(&dir, &request, &SearchParams { page: Some((2, Vec::new())), manage_dsa_it: false });
        assert_eq!(first.entries.len(), 2);
        let control = first.paged.unwrap();
        assert!(control.has_more());
        assert_eq!(control.size, 3);

        let second = search(
            &dir,
            &request,
            &SearchParams { page: Some((2, control.cookie)), manage_dsa_it: false },
        );
        assert_eq!(second.entries.len(), 1);
        assert!(!second.paged.unwrap().has_more());
        assert_eq!(dir.search_count(), 2);
    }

    #[test]
    fn size_limit_truncates_with_code() {
        let dir = people();
        dir.set_size_limit(2);
        let request = SearchRequest::new("ou=people,dc=example,dc=org", SearchFilter::new("(uid=*)"));
        let outcome = search(&dir, &request, &SearchParams::default());
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.result_code, ResultCode::SizeLimitExceeded);
    }

    #[test]
    fn referrals_surface_unless_managed() {
        let dir = people();
        dir.add_referral("ou=remote,dc=example,dc=org", vec!["ldap://other.example.org/ou=remote".into()]);
        let request = SearchRequest::new("dc=example,dc=org", SearchFilter::new("(objectClass=*)"));

        let plain = search(&dir, &request, &SearchParams::default());
        assert_eq!(plain.referrals.len(), 1);

        let managed = search(&dir, &request, &SearchParams { page: None, manage_dsa_it: true });
        assert!(managed.referrals.is_empty());
        assert!(managed.entries.iter().any(|e| e.has_attr("ref")));
    }

    #[test]
    fn bind_accepts_plaintext_and_digests() {
        let dir = Directory::new();
        // {SHA}base64(sha1("password"))
        dir.add_entry(
            LdapEntry::new("uid=jdoe,ou=people,dc=example,dc=org")
                .with_attribute("userPassword", "{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g=")
                .with_attribute("userPassword", "plain"),
        );
        let dn = "uid=jdoe,ou=people,dc=example,dc=org";
        assert_eq!(dir.bind(dn, b"password"), ResultCode::Success);
        assert_eq!(dir.bind(dn, b"plain"), ResultCode::Success);
        assert_eq!(dir.bind(dn, b"wrong"), ResultCode::InvalidCredentials);
        assert_eq!(dir.bind("uid=ghost,dc=example,dc=org", b"x"), ResultCode::InvalidCredentials);
    }

    #[test]
    fn modify_applies_in_order() {
        let dir = people();
        let dn = "uid=adoe,ou=people,dc=example,dc=org";
        dir.modify(
            dn,
            &[
                AttributeModification {
                    modification: ModificationType::Add,
                    attribute: ldx_model::entry::LdapAttribute::new("mail", "adoe@example.org"),
                },
                AttributeModification {
                    modification: ModificationType::Replace,
                    attribute: ldx_model::entry::LdapAttribute::new("uid", "adoe2"),
                },
            ],
        )
        .unwrap();
        let entry = dir.entry(dn).unwrap();
        assert_eq!(entry.get_attr("mail"), Some("adoe@example.org"));
        assert_eq!(entry.get_attr("uid"), Some("adoe2"));
    }

    #[test]
    fn injected_failures_pop_in_order() {
        let dir = people();
        dir.fail_searches([ResultCode::Busy]);
        let request = SearchRequest::new("dc=example,dc=org", SearchFilter::new("(uid=*)"));
        let err = dir.execute_search(&request, &SearchParams::default()).unwrap_err();
        assert_eq!(err.result_code, ResultCode::Busy);
        assert!(dir.execute_search(&request, &SearchParams::default()).is_ok());
    }
}
