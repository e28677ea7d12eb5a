//! Resolution of the authenticated user's entry.

use ldx_model::entry::LdapEntry;
use ldx_model::filter::SearchFilter;
use ldx_model::request::{ReturnAttributes, SearchRequest, SearchScope};
use ldx_provider::connection::Connection;
use ldx_provider::search::SearchResults;

use crate::error::AuthResult;

/// Produces the entry attached to a successful
/// [`AuthenticationResponse`](crate::types::AuthenticationResponse).
#[allow(async_fn_in_trait)]
pub trait EntryResolver<C: Connection>: Send + Sync {
    /// Resolves the entry for the authenticated DN.
    async fn resolve_entry(&self, dn: &str, connection: &mut C) -> AuthResult<LdapEntry>;
}

/// Returns a DN-only entry without touching the directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEntryResolver;

impl<C: Connection> EntryResolver<C> for NoOpEntryResolver {
    async fn resolve_entry(&self, dn: &str, _connection: &mut C) -> AuthResult<LdapEntry> {
        Ok(LdapEntry::new(dn))
    }
}

/// Reads the authenticated entry with an object-scope search on the
/// authenticated connection.
#[derive(Debug, Clone, Default)]
pub struct SearchEntryResolver {
    return_attributes: ReturnAttributes,
}

impl SearchEntryResolver {
    /// Creates a resolver returning all user attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the attributes fetched.
    #[must_use]
    pub fn return_attributes(mut self, attrs: ReturnAttributes) -> Self {
        self.return_attributes = attrs;
        self
    }
}

impl<C: Connection> EntryResolver<C> for SearchEntryResolver {
    async fn resolve_entry(&self, dn: &str, connection: &mut C) -> AuthResult<LdapEntry> {
        let request = SearchRequest::new(dn, SearchFilter::new("(objectClass=*)"))
            .scope(SearchScope::Object)
            .return_attributes(self.return_attributes.clone());
        let mut results = connection.search(&request).await?;
        let mut found: Option<LdapEntry> = None;
        // Drive the cursor to its terminal response even after the entry
        // arrives, so the search always reaches its done message.
        while results.has_next().await? {
            if let Some(entry) = results.next_entry() {
                found.get_or_insert(entry);
            }
        }
        // The entry authenticated moments ago; a miss here means it was
        // removed or is no longer visible. Fall back to DN-only.
        Ok(found.unwrap_or_else(|| LdapEntry::new(dn)))
    }
}
