use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{EngineError, EngineResult};

/// A response captured from the session's background network traffic.
/// The body is kept raw; the per-platform adapter decodes it.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: Url,
    pub body: String,
}

/// Handle to a located element. Interactions that fail because the element
/// went stale or never became interactable surface as `TransientUi`.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    async fn click(&self) -> EngineResult<()>;
    async fn fill(&self, text: &str) -> EngineResult<()>;
    async fn text(&self) -> EngineResult<String>;
    async fn is_visible(&self) -> EngineResult<bool>;
    async fn attr(&self, name: &str) -> EngineResult<Option<String>>;

    /// Locate a descendant of this element. Absent descendants are
    /// `Ok(None)`, mirroring session-level lookup semantics.
    async fn query(&self, selector: &str) -> EngineResult<Option<ElementRef>>;
}

pub type ElementRef = Arc<dyn ElementHandle>;

/// One controllable browser tab, supplied by the external automation
/// collaborator. This is the only interface the engine requires from it.
///
/// Lookup semantics: an absent element is `Ok(None)` / an empty vec, never
/// an error. Errors are reserved for infrastructure conditions (the session
/// died, the page refused to load). Every wait is bounded by an explicit
/// timeout.
#[async_trait]
pub trait SessionCapability: Send + Sync {
    async fn navigate(&self, url: &Url) -> EngineResult<()>;

    /// Locate the first element matching the selector on the current page.
    async fn find(&self, selector: &str) -> EngineResult<Option<ElementRef>>;

    /// Locate all elements matching the selector on the current page.
    async fn find_all(&self, selector: &str) -> EngineResult<Vec<ElementRef>>;

    /// Wait until an element matching the selector is present and visible,
    /// or the timeout elapses.
    async fn wait_for(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> EngineResult<Option<ElementRef>>;

    /// Subscribe to network responses whose URL contains `pattern`.
    /// Responses arriving after the receiver is dropped are discarded.
    fn watch_responses(
        &self,
        pattern: &str,
    ) -> tokio::sync::mpsc::UnboundedReceiver<InterceptedResponse>;
}

/// Wait for an element and require it, converting a timeout into a
/// `TransientUi` failure the caller can retry or record per item.
pub async fn require_element(
    session: &dyn SessionCapability,
    selector: &str,
    timeout: Duration,
) -> EngineResult<ElementRef> {
    session
        .wait_for(selector, timeout)
        .await?
        .ok_or_else(|| EngineError::TransientUi(format!("element not found: {selector}")))
}
