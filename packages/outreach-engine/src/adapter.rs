use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::SearchCriteria;
use crate::error::EngineResult;
use crate::session::{InterceptedResponse, SessionCapability};
use crate::types::{OutreachOutcome, Platform, Posting};

/// Per-platform implementation of the shared workflow contract. Each
/// platform supplies its own selectors, URL templates and contact flow; the
/// orchestrator drives every platform through the same operations.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// URL the session should open before login detection starts.
    fn home_url(&self) -> Url;

    /// Inspect the current page for a positive login marker. A missing
    /// marker is `Ok(false)`, never an error.
    async fn is_authenticated(&self, session: &dyn SessionCapability) -> EngineResult<bool>;

    /// Build the search URL for one keyword/city pair and page cursor.
    /// Pure; no session access.
    fn build_search_url(
        &self,
        criteria: &SearchCriteria,
        keyword: &str,
        city_code: &str,
        page: usize,
    ) -> Url;

    /// Read postings from the currently rendered results page. An absent
    /// results container yields an empty vec, which the collection loop
    /// treats as end-of-results.
    async fn extract_postings(&self, session: &dyn SessionCapability)
        -> EngineResult<Vec<Posting>>;

    /// Move to the next results page. `Ok(false)` means no further page
    /// exists; calling again after that must stay `Ok(false)`.
    async fn advance_page(&self, session: &dyn SessionCapability) -> EngineResult<bool>;

    /// Drive the contact/apply flow for one posting.
    async fn initiate_contact(
        &self,
        session: &dyn SessionCapability,
        posting: &Posting,
        greeting: &str,
    ) -> EngineResult<OutreachOutcome>;

    /// URL substring identifying the platform's internal results API, if the
    /// platform renders results through one. `None` disables interception.
    fn response_pattern(&self) -> Option<&'static str> {
        None
    }

    /// Decode one intercepted response body into postings. Only called for
    /// responses matching `response_pattern`.
    fn decode_response(&self, _response: &InterceptedResponse) -> EngineResult<Vec<Posting>> {
        Ok(Vec::new())
    }
}

/// Immutable adapter lookup keyed by platform. Built once at startup and
/// shared by reference; runs never mutate it.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }
}
