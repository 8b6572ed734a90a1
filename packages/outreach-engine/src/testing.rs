//! Scriptable fakes for the session capability, shared by unit and
//! integration tests. Nothing here touches a real browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::EngineResult;
use crate::session::{ElementHandle, ElementRef, InterceptedResponse, SessionCapability};

/// One scripted element. `children` are resolved by `ElementHandle::query`;
/// clicking an element with `advances_page` set moves the fake session to
/// its next scripted page.
#[derive(Clone, Default)]
pub struct FakeElement {
    pub text: String,
    pub visible: bool,
    pub attrs: HashMap<String, String>,
    pub children: HashMap<String, FakeElement>,
    pub advances_page: bool,
}

impl FakeElement {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            visible: true,
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, selector: impl Into<String>, child: FakeElement) -> Self {
        self.children.insert(selector.into(), child);
        self
    }

    pub fn next_page_button() -> Self {
        Self {
            visible: true,
            advances_page: true,
            ..Default::default()
        }
    }
}

/// Elements rendered on one scripted page, keyed by selector.
#[derive(Clone, Default)]
pub struct FakePage {
    pub elements: HashMap<String, Vec<FakeElement>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(mut self, selector: impl Into<String>, element: FakeElement) -> Self {
        self.elements.entry(selector.into()).or_default().push(element);
        self
    }

    pub fn with_elements(
        mut self,
        selector: impl Into<String>,
        elements: Vec<FakeElement>,
    ) -> Self {
        self.elements.entry(selector.into()).or_default().extend(elements);
        self
    }
}

struct FakeState {
    pages: Vec<FakePage>,
    current: usize,
    clicks: Vec<String>,
    navigations: Vec<Url>,
    watchers: Vec<(String, tokio::sync::mpsc::UnboundedSender<InterceptedResponse>)>,
    pushed: Vec<InterceptedResponse>,
}

/// In-memory session whose pages and network traffic are scripted up front.
#[derive(Clone)]
pub struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSession {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                pages,
                current: 0,
                clicks: Vec::new(),
                navigations: Vec::new(),
                watchers: Vec::new(),
                pushed: Vec::new(),
            })),
        }
    }

    pub fn empty() -> Self {
        Self::new(vec![FakePage::new()])
    }

    /// Simulate the platform's internal API responding in the background.
    /// Delivered to every current watcher whose pattern the URL contains,
    /// and buffered so a watcher attached later still sees it.
    pub fn push_response(&self, url: &str, body: impl Into<String>) {
        let response = InterceptedResponse {
            url: Url::parse(url).expect("test url"),
            body: body.into(),
        };
        let mut state = self.state.lock().unwrap();
        for (pattern, tx) in &state.watchers {
            if response.url.as_str().contains(pattern.as_str()) {
                let _ = tx.send(response.clone());
            }
        }
        state.pushed.push(response);
    }

    pub fn navigations(&self) -> Vec<Url> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().unwrap().current
    }

    fn current_elements(&self, selector: &str) -> Vec<FakeElement> {
        let state = self.state.lock().unwrap();
        state
            .pages
            .get(state.current)
            .and_then(|p| p.elements.get(selector))
            .cloned()
            .unwrap_or_default()
    }

    fn handle(&self, selector: &str, element: FakeElement) -> ElementRef {
        Arc::new(FakeElementHandle {
            selector: selector.to_string(),
            element,
            state: Arc::clone(&self.state),
        })
    }
}

struct FakeElementHandle {
    selector: String,
    element: FakeElement,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl ElementHandle for FakeElementHandle {
    async fn click(&self) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.clicks.push(self.selector.clone());
        if self.element.advances_page && state.current + 1 < state.pages.len() {
            state.current += 1;
        }
        Ok(())
    }

    async fn fill(&self, text: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.clicks.push(format!("fill:{}:{}", self.selector, text));
        Ok(())
    }

    async fn text(&self) -> EngineResult<String> {
        Ok(self.element.text.clone())
    }

    async fn is_visible(&self) -> EngineResult<bool> {
        Ok(self.element.visible)
    }

    async fn attr(&self, name: &str) -> EngineResult<Option<String>> {
        Ok(self.element.attrs.get(name).cloned())
    }

    async fn query(&self, selector: &str) -> EngineResult<Option<ElementRef>> {
        Ok(self.element.children.get(selector).map(|child| {
            Arc::new(FakeElementHandle {
                selector: selector.to_string(),
                element: child.clone(),
                state: Arc::clone(&self.state),
            }) as ElementRef
        }))
    }
}

#[async_trait]
impl SessionCapability for FakeSession {
    async fn navigate(&self, url: &Url) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.clone());
        Ok(())
    }

    async fn find(&self, selector: &str) -> EngineResult<Option<ElementRef>> {
        Ok(self
            .current_elements(selector)
            .into_iter()
            .next()
            .map(|e| self.handle(selector, e)))
    }

    async fn find_all(&self, selector: &str) -> EngineResult<Vec<ElementRef>> {
        Ok(self
            .current_elements(selector)
            .into_iter()
            .map(|e| self.handle(selector, e))
            .collect())
    }

    async fn wait_for(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> EngineResult<Option<ElementRef>> {
        // Scripted pages never animate; waiting is just lookup.
        self.find(selector).await
    }

    fn watch_responses(
        &self,
        pattern: &str,
    ) -> tokio::sync::mpsc::UnboundedReceiver<InterceptedResponse> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        for response in &state.pushed {
            if response.url.as_str().contains(pattern) {
                let _ = tx.send(response.clone());
            }
        }
        state.watchers.push((pattern.to_string(), tx));
        rx
    }
}
