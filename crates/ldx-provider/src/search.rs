//! Search result contracts.

use async_trait::async_trait;
use ldx_model::entry::LdapEntry;
use ldx_model::response::Response;
use ldx_model::MessageId;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::ProviderResult;

/// Cursor over the results of a blocking search.
///
/// [`has_next`](SearchResults::has_next) drives every state transition: it
/// refills the entry queue, applies the referral policy, reissues the search
/// when a paging cookie indicates another page, and records the terminal
/// response. [`next_entry`](SearchResults::next_entry) only dequeues.
///
/// Once [`response`](SearchResults::response) returns `Some`, `has_next`
/// stays false and performs no further I/O.
#[allow(async_fn_in_trait)]
pub trait SearchResults: Send {
    /// Advances the cursor; true when another entry is available.
    async fn has_next(&mut self) -> ProviderResult<bool>;

    /// Dequeues the next entry. `None` when `has_next` was not true.
    fn next_entry(&mut self) -> Option<LdapEntry>;

    /// The terminal search response; `None` until the search completes.
    fn response(&self) -> Option<&Response<()>>;

    /// Protocol message id of the underlying search.
    fn message_id(&self) -> MessageId;
}

/// Handle on a callback-style search.
#[allow(async_fn_in_trait)]
pub trait AsyncSearchHandle: Send {
    /// Protocol message id of the underlying search.
    fn message_id(&self) -> MessageId;

    /// Abandons the search. The listener receives no further entries and no
    /// error.
    async fn abandon(self) -> ProviderResult<()>;
}

/// Receives the results of a callback-style search as they are produced.
#[async_trait]
pub trait SearchListener: Send + Sync {
    /// Called once per result entry.
    async fn entry_received(&self, entry: LdapEntry);

    /// Called once per search referral. Default: ignore.
    async fn referral_received(&self, _urls: Vec<String>) {}

    /// Called exactly once when the search terminates normally.
    ///
    /// Not called after an abandon.
    async fn search_complete(&self, response: Response<()>);
}

/// A [`SearchListener`] that collects everything, for callers that only want
/// the full result set and for tests.
#[derive(Debug)]
pub struct CollectingListener {
    entries: Mutex<Vec<LdapEntry>>,
    referrals: Mutex<Vec<String>>,
    response: Mutex<Option<Response<()>>>,
    complete: Semaphore,
}

impl Default for CollectingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectingListener {
    /// Creates an empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            referrals: Mutex::new(Vec::new()),
            response: Mutex::new(None),
            // Zero permits: wait() can only proceed once search_complete
            // adds the single completion permit.
            complete: Semaphore::new(0),
        }
    }

    /// Waits until the search completes, then returns the collected entries
    /// and the terminal response.
    pub async fn wait(&self) -> (Vec<LdapEntry>, Response<()>) {
        // The permit is added exactly once, by search_complete.
        let permit = self.complete.acquire().await.unwrap_or_else(|_| unreachable!());
        permit.forget();
        let entries = std::mem::take(&mut *self.entries.lock());
        let response = self.response.lock().take().unwrap_or_else(|| {
            unreachable!("completion permit is only added after the response is stored")
        });
        (entries, response)
    }

    /// Returns the referral URLs received so far.
    #[must_use]
    pub fn referrals(&self) -> Vec<String> {
        self.referrals.lock().clone()
    }

    /// Number of entries received so far.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl SearchListener for CollectingListener {
    async fn entry_received(&self, entry: LdapEntry) {
        self.entries.lock().push(entry);
    }

    async fn referral_received(&self, urls: Vec<String>) {
        self.referrals.lock().extend(urls);
    }

    async fn search_complete(&self, response: Response<()>) {
        *self.response.lock() = Some(response);
        self.complete.add_permits(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn collecting_listener_gathers_results() {
        let listener = Arc::new(CollectingListener::new());

        let feeder = Arc::clone(&listener);
        tokio::spawn(async move {
            feeder.entry_received(LdapEntry::new("uid=a,dc=example,dc=org")).await;
            feeder.entry_received(LdapEntry::new("uid=b,dc=example,dc=org")).await;
            feeder.referral_received(vec!["ldap://other.example.org".into()]).await;
            feeder.search_complete(Response::success(())).await;
        });

        let (entries, response) = listener.wait().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].dn, "uid=a,dc=example,dc=org");
        assert!(response.is_success());
        assert_eq!(listener.referrals(), vec!["ldap://other.example.org".to_string()]);
    }

    #[tokio::test]
    async fn fresh_listener_blocks_until_the_search_completes() {
        let listener = CollectingListener::new();
        assert_eq!(listener.entry_count(), 0);

        // Entries alone must not release wait().
        listener.entry_received(LdapEntry::new("uid=a,dc=example,dc=org")).await;
        let pending = tokio::time::timeout(std::time::Duration::from_millis(10), listener.wait());
        assert!(pending.await.is_err());

        listener.search_complete(Response::success(())).await;
        let (entries, response) = listener.wait().await;
        assert_eq!(entries.len(), 1);
        assert!(response.is_success());
    }
}
