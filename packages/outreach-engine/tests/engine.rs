//! End-to-end workflow tests against scripted adapters and the in-memory
//! posting store. No browser, no network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use outreach_engine::testing::FakeSession;
use outreach_engine::{
    AbortReason, AdapterRegistry, EngineError, EngineResult, EventKind, InterceptedResponse,
    MemoryPostingStore, OutreachOutcome, PacingConfig, Platform, PlatformAdapter, PlatformRun,
    Posting, PostingStatus, ProgressEvent, RunPhase, SearchCriteria, SessionCapability,
};

/// Adapter scripted entirely in-memory: a fixed sequence of result pages,
/// a switchable auth flag, and configurable outreach outcomes.
struct StubAdapter {
    platform: Platform,
    authenticated: bool,
    pages: Vec<Vec<Posting>>,
    extract_calls: AtomicUsize,
    advance_calls: AtomicUsize,
    contact_calls: AtomicUsize,
    page_cursor: AtomicUsize,
    outcomes: Mutex<Vec<OutreachOutcome>>,
    response_pattern: Option<&'static str>,
}

impl StubAdapter {
    fn new(pages: Vec<Vec<Posting>>) -> Self {
        Self {
            platform: Platform::Boss,
            authenticated: true,
            pages,
            extract_calls: AtomicUsize::new(0),
            advance_calls: AtomicUsize::new(0),
            contact_calls: AtomicUsize::new(0),
            page_cursor: AtomicUsize::new(0),
            outcomes: Mutex::new(Vec::new()),
            response_pattern: None,
        }
    }

    fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    fn watching(mut self, pattern: &'static str) -> Self {
        self.response_pattern = Some(pattern);
        self
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn home_url(&self) -> Url {
        Url::parse("https://stub.test/").unwrap()
    }

    async fn is_authenticated(&self, _session: &dyn SessionCapability) -> EngineResult<bool> {
        Ok(self.authenticated)
    }

    fn build_search_url(
        &self,
        _criteria: &SearchCriteria,
        keyword: &str,
        city_code: &str,
        page: usize,
    ) -> Url {
        Url::parse(&format!(
            "https://stub.test/search?q={keyword}&city={city_code}&page={page}"
        ))
        .unwrap()
    }

    async fn extract_postings(
        &self,
        _session: &dyn SessionCapability,
    ) -> EngineResult<Vec<Posting>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let cursor = self.page_cursor.load(Ordering::SeqCst);
        Ok(self.pages.get(cursor).cloned().unwrap_or_default())
    }

    async fn advance_page(&self, _session: &dyn SessionCapability) -> EngineResult<bool> {
        self.advance_calls.fetch_add(1, Ordering::SeqCst);
        let cursor = self.page_cursor.load(Ordering::SeqCst);
        if cursor + 1 < self.pages.len() {
            self.page_cursor.store(cursor + 1, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn initiate_contact(
        &self,
        _session: &dyn SessionCapability,
        _posting: &Posting,
        _greeting: &str,
    ) -> EngineResult<OutreachOutcome> {
        self.contact_calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(OutreachOutcome::Sent)
        } else {
            Ok(outcomes.remove(0))
        }
    }

    fn response_pattern(&self) -> Option<&'static str> {
        self.response_pattern
    }

    fn decode_response(&self, response: &InterceptedResponse) -> EngineResult<Vec<Posting>> {
        let ids: Vec<String> =
            serde_json::from_str(&response.body).map_err(|source| EngineError::NetworkDecode {
                url: response.url.to_string(),
                source,
            })?;
        Ok(ids
            .into_iter()
            .map(|id| Posting::new(self.platform, id))
            .collect())
    }
}

struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

impl outreach_engine::EventSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn posting(id: &str) -> Posting {
    let mut p = Posting::new(Platform::Boss, id);
    p.title = format!("Java Engineer {id}");
    p.detail_url = Some(Url::parse(&format!("https://stub.test/job/{id}")).unwrap());
    p
}

fn fast_criteria() -> SearchCriteria {
    SearchCriteria::new("java", "010000")
        .with_pacing(PacingConfig::immediate())
        .with_auth_timeout(Duration::from_millis(100))
}

fn run_for(
    adapter: Arc<dyn PlatformAdapter>,
    store: Arc<MemoryPostingStore>,
    criteria: SearchCriteria,
) -> PlatformRun {
    init_tracing();
    PlatformRun::new(
        adapter,
        Arc::new(FakeSession::empty()),
        store,
        None,
        Arc::new(outreach_engine::TracingSink),
        criteria,
    )
}

#[tokio::test]
async fn three_discovered_two_delivered_one_skipped() {
    let adapter = Arc::new(StubAdapter::new(vec![vec![
        posting("a"),
        posting("b"),
        posting("c"),
    ]]));
    let store = Arc::new(MemoryPostingStore::new());

    let report = run_for(
        adapter.clone(),
        store.clone(),
        fast_criteria().with_delivery_ceiling(2),
    )
    .run()
    .await;

    assert_eq!(report.phase, RunPhase::Terminated);
    assert_eq!(report.counters.discovered, 3);
    assert_eq!(report.counters.filtered_out, 0);
    assert_eq!(report.counters.delivered, 2);
    assert_eq!(report.counters.skipped, 1);
    assert_eq!(adapter.contact_calls.load(Ordering::SeqCst), 2);

    // Final statuses reach the store; the skipped one is not Filtered.
    assert_eq!(
        store.get(Platform::Boss, "a").unwrap().status,
        PostingStatus::DeliveredSuccess
    );
    assert_eq!(
        store.get(Platform::Boss, "c").unwrap().status,
        PostingStatus::Skipped
    );
    assert_eq!(store.reports().len(), 1);
}

#[tokio::test]
async fn second_collection_over_unchanged_results_persists_nothing() {
    let store = Arc::new(MemoryPostingStore::new());
    let pages = || vec![vec![posting("a"), posting("b")]];

    let first = run_for(
        Arc::new(StubAdapter::new(pages())),
        store.clone(),
        fast_criteria(),
    )
    .run()
    .await;
    assert_eq!(first.counters.discovered, 2);
    assert_eq!(store.posting_count(), 2);

    let second = run_for(
        Arc::new(StubAdapter::new(pages())),
        store.clone(),
        fast_criteria(),
    )
    .run()
    .await;
    assert_eq!(second.counters.discovered, 0);
    assert_eq!(store.posting_count(), 2);
}

#[tokio::test]
async fn pagination_stops_when_adapter_reports_no_next_page() {
    // Three non-empty pages; advance_page is false after the third.
    let adapter = Arc::new(StubAdapter::new(vec![
        vec![posting("p1")],
        vec![posting("p2")],
        vec![posting("p3")],
    ]));
    let store = Arc::new(MemoryPostingStore::new());

    let report = run_for(
        adapter.clone(),
        store,
        fast_criteria().with_max_pages(10),
    )
    .run()
    .await;

    assert_eq!(adapter.extract_calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.counters.discovered, 3);
    assert_eq!(report.counters.pages_collected, 3);
}

#[tokio::test]
async fn postings_gathered_before_a_session_death_are_persisted() {
    // Page 1 yields a posting; the session dies while extracting page 2.
    struct DyingAdapter {
        inner: StubAdapter,
    }

    #[async_trait]
    impl PlatformAdapter for DyingAdapter {
        fn platform(&self) -> Platform {
            Platform::Boss
        }
        fn home_url(&self) -> Url {
            self.inner.home_url()
        }
        async fn is_authenticated(&self, s: &dyn SessionCapability) -> EngineResult<bool> {
            self.inner.is_authenticated(s).await
        }
        fn build_search_url(
            &self,
            c: &SearchCriteria,
            k: &str,
            city: &str,
            page: usize,
        ) -> Url {
            self.inner.build_search_url(c, k, city, page)
        }
        async fn extract_postings(
            &self,
            _s: &dyn SessionCapability,
        ) -> EngineResult<Vec<Posting>> {
            match self.inner.extract_calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(vec![posting("survivor")]),
                _ => Err(EngineError::SessionDead("tab crashed".to_string())),
            }
        }
        async fn advance_page(&self, _s: &dyn SessionCapability) -> EngineResult<bool> {
            Ok(true)
        }
        async fn initiate_contact(
            &self,
            s: &dyn SessionCapability,
            p: &Posting,
            g: &str,
        ) -> EngineResult<OutreachOutcome> {
            self.inner.initiate_contact(s, p, g).await
        }
    }

    let adapter = Arc::new(DyingAdapter {
        inner: StubAdapter::new(Vec::new()),
    });
    let store = Arc::new(MemoryPostingStore::new());

    let report = run_for(adapter, store.clone(), fast_criteria()).run().await;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert!(matches!(
        report.abort_reason,
        Some(AbortReason::SessionDead { .. })
    ));
    // The page collected before the session died is still on record.
    assert_eq!(report.counters.discovered, 1);
    assert_eq!(store.posting_count(), 1);
    assert!(store.get(Platform::Boss, "survivor").is_some());
    assert_eq!(store.reports().len(), 1);
}

#[tokio::test]
async fn max_page_guard_stops_runaway_pagination() {
    // Every page claims a next page exists; the guard must cut the loop.
    struct EndlessAdapter {
        inner: StubAdapter,
    }

    #[async_trait]
    impl PlatformAdapter for EndlessAdapter {
        fn platform(&self) -> Platform {
            Platform::Boss
        }
        fn home_url(&self) -> Url {
            self.inner.home_url()
        }
        async fn is_authenticated(&self, s: &dyn SessionCapability) -> EngineResult<bool> {
            self.inner.is_authenticated(s).await
        }
        fn build_search_url(
            &self,
            c: &SearchCriteria,
            k: &str,
            city: &str,
            page: usize,
        ) -> Url {
            self.inner.build_search_url(c, k, city, page)
        }
        async fn extract_postings(
            &self,
            _s: &dyn SessionCapability,
        ) -> EngineResult<Vec<Posting>> {
            let n = self.inner.extract_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![posting(&format!("page-{n}"))])
        }
        async fn advance_page(&self, _s: &dyn SessionCapability) -> EngineResult<bool> {
            Ok(true)
        }
        async fn initiate_contact(
            &self,
            s: &dyn SessionCapability,
            p: &Posting,
            g: &str,
        ) -> EngineResult<OutreachOutcome> {
            self.inner.initiate_contact(s, p, g).await
        }
    }

    let adapter = Arc::new(EndlessAdapter {
        inner: StubAdapter::new(Vec::new()),
    });
    let store = Arc::new(MemoryPostingStore::new());

    let report = run_for(
        adapter.clone(),
        store,
        fast_criteria().with_max_pages(4).with_delivery_ceiling(0),
    )
    .run()
    .await;

    assert_eq!(adapter.inner.extract_calls.load(Ordering::SeqCst), 4);
    assert_eq!(report.counters.discovered, 4);
    assert_eq!(report.counters.pages_collected, 4);
}

#[tokio::test]
async fn auth_timeout_aborts_with_empty_report() {
    let adapter = Arc::new(StubAdapter::new(vec![vec![posting("a")]]).unauthenticated());
    let store = Arc::new(MemoryPostingStore::new());

    let mut criteria = fast_criteria();
    criteria.auth_poll_interval = Duration::from_millis(10);

    let report = run_for(adapter.clone(), store.clone(), criteria).run().await;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::AuthTimeout));
    assert_eq!(report.counters.discovered, 0);
    assert_eq!(adapter.extract_calls.load(Ordering::SeqCst), 0);
    // The aborted run still records its summary.
    assert_eq!(store.reports().len(), 1);
}

#[tokio::test]
async fn malformed_intercepted_response_does_not_stop_the_run() {
    init_tracing();
    let adapter = Arc::new(
        StubAdapter::new(vec![vec![posting("dom-1")]]).watching("internal/api/joblist"),
    );
    let store = Arc::new(MemoryPostingStore::new());
    let session = Arc::new(FakeSession::empty());

    let run = PlatformRun::new(
        adapter.clone(),
        session.clone(),
        store.clone(),
        None,
        Arc::new(outreach_engine::TracingSink),
        fast_criteria(),
    );

    // The malformed body arrives before collection drains the stream.
    session.push_response("https://stub.test/internal/api/joblist?page=1", "not json");
    session.push_response(
        "https://stub.test/internal/api/joblist?page=1",
        r#"["api-1", "api-2"]"#,
    );

    let report = run.run().await;

    assert_eq!(report.phase, RunPhase::Terminated);
    // DOM posting plus the two decodable intercepted ones; the malformed
    // body contributed nothing and broke nothing.
    assert_eq!(report.counters.discovered, 3);
    assert!(store.get(Platform::Boss, "api-1").is_some());
}

#[tokio::test]
async fn cancellation_aborts_before_collection() {
    let adapter = Arc::new(StubAdapter::new(vec![vec![posting("a")]]));
    let store = Arc::new(MemoryPostingStore::new());

    let run = run_for(adapter.clone(), store, fast_criteria());
    let handle = run.handle();
    handle.cancel();

    let report = run.run().await;
    assert_eq!(report.phase, RunPhase::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Cancelled));
    assert_eq!(adapter.contact_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_platform_failure_does_not_touch_siblings() {
    init_tracing();
    let store: Arc<MemoryPostingStore> = Arc::new(MemoryPostingStore::new());
    let sink = Arc::new(CollectingSink::new());

    let registry = AdapterRegistry::new();
    let engine = outreach_engine::Engine::new(registry, store.clone(), None, sink.clone());

    let healthy = PlatformRun::new(
        Arc::new(StubAdapter::new(vec![vec![posting("ok-1")]])),
        Arc::new(FakeSession::empty()),
        store.clone(),
        None,
        sink.clone(),
        fast_criteria(),
    );

    let mut broken_adapter = StubAdapter::new(Vec::new()).unauthenticated();
    broken_adapter.platform = Platform::Yupao;
    let broken = PlatformRun::new(
        Arc::new(broken_adapter),
        Arc::new(FakeSession::empty()),
        store.clone(),
        None,
        sink.clone(),
        {
            let mut c = fast_criteria();
            c.auth_poll_interval = Duration::from_millis(10);
            c
        },
    );

    let reports = engine.run_all(vec![healthy, broken]).await;
    assert_eq!(reports.len(), 2);

    let by_platform = |p: Platform| reports.iter().find(|r| r.platform == p).unwrap();
    assert_eq!(by_platform(Platform::Boss).phase, RunPhase::Terminated);
    assert_eq!(by_platform(Platform::Boss).counters.delivered, 1);
    assert_eq!(by_platform(Platform::Yupao).phase, RunPhase::Aborted);
    assert!(sink.kinds().contains(&EventKind::Error));
}

#[tokio::test]
async fn rate_limited_delivery_aborts_that_platform_after_retries() {
    let adapter = Arc::new(StubAdapter::new(vec![vec![
        posting("a"),
        posting("b"),
        posting("c"),
        posting("d"),
        posting("e"),
    ]]));
    *adapter.outcomes.lock().unwrap() = vec![
        OutreachOutcome::Sent,
        OutreachOutcome::RateLimited,
        OutreachOutcome::RateLimited,
        OutreachOutcome::RateLimited,
        OutreachOutcome::RateLimited,
    ];
    let store = Arc::new(MemoryPostingStore::new());

    let mut criteria = fast_criteria().with_delivery_ceiling(10);
    criteria.retry.max_rate_limit_retries = 2;
    criteria.retry.backoff_base = Duration::ZERO;

    let report = run_for(adapter, store.clone(), criteria).run().await;

    assert_eq!(report.phase, RunPhase::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::RateLimitExhausted));
    assert_eq!(report.counters.delivered, 1);
    // Partial results were persisted before the abort.
    assert_eq!(
        store.get(Platform::Boss, "a").unwrap().status,
        PostingStatus::DeliveredSuccess
    );
    assert_eq!(store.reports().len(), 1);
}

#[tokio::test]
async fn statuses_never_leave_terminal_states_across_a_run() {
    let adapter = Arc::new(StubAdapter::new(vec![vec![posting("a"), posting("b")]]));
    let store = Arc::new(MemoryPostingStore::new());

    let mut criteria = fast_criteria().with_delivery_ceiling(1);
    criteria.exclude_keywords = vec!["Engineer b".to_string()];

    let report = run_for(adapter, store.clone(), criteria).run().await;
    assert_eq!(report.counters.filtered_out, 1);
    assert_eq!(report.counters.delivered, 1);

    // Re-running over the same result set does not disturb stored statuses.
    let adapter = Arc::new(StubAdapter::new(vec![vec![posting("a"), posting("b")]]));
    run_for(adapter, store.clone(), fast_criteria()).run().await;

    assert_eq!(
        store.get(Platform::Boss, "a").unwrap().status,
        PostingStatus::DeliveredSuccess
    );
    assert_eq!(
        store.get(Platform::Boss, "b").unwrap().status,
        PostingStatus::Filtered
    );
}
