use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::adapter::{AdapterRegistry, PlatformAdapter};
use crate::config::SearchCriteria;
use crate::delivery::DeliveryDriver;
use crate::error::EngineError;
use crate::events::{EventKind, EventSink, ProgressEvent};
use crate::filter::FilterPipeline;
use crate::interceptor::{merge_by_scoped_id, ResponseInterceptor};
use crate::matcher::SemanticMatcher;
use crate::session::SessionCapability;
use crate::store::PostingStore;
use crate::types::{
    AbortReason, Platform, Posting, PostingStatus, RunCounters, RunPhase, RunReport,
};

/// Cancellation handle for one platform run. Cancelling takes effect at the
/// next loop iteration; in-flight single-posting operations complete first.
#[derive(Clone)]
pub struct RunHandle {
    run_id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// One platform's workflow run: the state machine
/// Preparing → Authenticating → Collecting → Filtering → Delivering →
/// Reporting, with Aborted reachable from any phase. Owns its session
/// exclusively; the posting store is the only shared collaborator.
pub struct PlatformRun {
    run_id: Uuid,
    adapter: Arc<dyn PlatformAdapter>,
    session: Arc<dyn SessionCapability>,
    store: Arc<dyn PostingStore>,
    matcher: Option<Arc<dyn SemanticMatcher>>,
    sink: Arc<dyn EventSink>,
    criteria: Arc<SearchCriteria>,
    cancelled: Arc<AtomicBool>,
    phase: RunPhase,
    counters: RunCounters,
}

impl PlatformRun {
    pub fn new(
        adapter: Arc<dyn PlatformAdapter>,
        session: Arc<dyn SessionCapability>,
        store: Arc<dyn PostingStore>,
        matcher: Option<Arc<dyn SemanticMatcher>>,
        sink: Arc<dyn EventSink>,
        criteria: SearchCriteria,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            adapter,
            session,
            store,
            matcher,
            sink,
            criteria: Arc::new(criteria),
            cancelled: Arc::new(AtomicBool::new(false)),
            phase: RunPhase::Idle,
            counters: RunCounters::default(),
        }
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.run_id,
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    fn platform(&self) -> Platform {
        self.adapter.platform()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn enter(&mut self, phase: RunPhase, message: &str) {
        self.phase = phase;
        tracing::info!(platform = %self.platform(), run_id = %self.run_id, ?phase, "{message}");
        self.sink
            .emit(ProgressEvent::new(self.platform(), EventKind::Info, message));
    }

    /// Execute the run to completion. Never panics and never returns an
    /// error: every failure mode ends in a report, aborted or terminated.
    pub async fn run(mut self) -> RunReport {
        let started_at = Utc::now();

        let abort_reason = match self.execute().await {
            Ok(()) => None,
            Err(reason) => Some(reason),
        };

        self.phase = match abort_reason {
            None => RunPhase::Terminated,
            Some(_) => RunPhase::Aborted,
        };

        let report = RunReport {
            run_id: self.run_id,
            platform: self.platform(),
            phase: self.phase,
            counters: self.counters,
            abort_reason: abort_reason.clone(),
            started_at,
            finished_at: Utc::now(),
        };

        // Partial results were persisted as the phases ran; the summary is
        // recorded even for aborted runs.
        if let Err(e) = self.store.record_run_summary(&report).await {
            tracing::error!(run_id = %self.run_id, error = %e, "failed to record run summary");
        }

        match &abort_reason {
            None => self.sink.emit(
                ProgressEvent::new(self.platform(), EventKind::Success, "run completed")
                    .with_progress(self.counters.delivered, self.criteria.delivery_ceiling),
            ),
            Some(reason) => self.sink.emit(ProgressEvent::new(
                self.platform(),
                EventKind::Error,
                format!("run aborted: {reason:?}"),
            )),
        }

        report
    }

    async fn execute(&mut self) -> Result<(), AbortReason> {
        self.enter(RunPhase::Preparing, "preparing run");
        let blacklist = self
            .store
            .load_blacklist(self.platform())
            .await
            .map_err(|e| AbortReason::Infrastructure {
                detail: format!("blacklist load failed: {e}"),
            })?;

        self.enter(RunPhase::Authenticating, "waiting for authentication");
        self.authenticate().await?;

        self.enter(RunPhase::Collecting, "collecting postings");
        let (mut candidates, collect_abort) = self.collect().await;
        self.counters.discovered = candidates.len();

        // Everything discovered is persisted before the abort (if any) is
        // surfaced, so a session dying mid-pagination still leaves the pages
        // it managed to produce on record.
        self.store
            .save_new_postings(&candidates)
            .await
            .map_err(|e| AbortReason::Infrastructure {
                detail: format!("posting save failed: {e}"),
            })?;
        if let Some(reason) = collect_abort {
            return Err(reason);
        }

        self.enter(RunPhase::Filtering, "filtering candidates");
        let pipeline = FilterPipeline::new(
            Arc::clone(&self.criteria),
            blacklist,
            self.matcher.clone(),
        );
        self.filter(&pipeline, &mut candidates).await?;

        self.enter(RunPhase::Delivering, "delivering outreach");
        self.deliver(&mut candidates).await?;

        self.enter(RunPhase::Reporting, "reporting results");
        for posting in candidates.iter().filter(|p| p.status.is_terminal()) {
            if let Err(e) = self.store.update_status(posting).await {
                tracing::warn!(
                    scoped_id = %posting.scoped_id,
                    error = %e,
                    "failed to persist final posting status"
                );
            }
        }

        Ok(())
    }

    /// Bounded polling until the adapter observes a login marker. The
    /// marker's absence is a normal poll result, not an error.
    async fn authenticate(&mut self) -> Result<(), AbortReason> {
        self.session
            .navigate(&self.adapter.home_url())
            .await
            .map_err(|e| AbortReason::SessionDead {
                detail: e.to_string(),
            })?;

        let deadline = tokio::time::Instant::now() + self.criteria.auth_timeout;
        loop {
            if self.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            match self.adapter.is_authenticated(self.session.as_ref()).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(EngineError::SessionDead(detail)) => {
                    return Err(AbortReason::SessionDead { detail });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "auth probe failed, treating as not logged in");
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AbortReason::AuthTimeout);
            }
            tokio::time::sleep(self.criteria.auth_poll_interval).await;
        }
    }

    /// Iterate the keyword×city cartesian product, paging until the adapter
    /// reports no further pages or the max-page guard trips. Returns new
    /// candidates in discovery order; postings already persisted are dropped
    /// silently. An abort mid-collection still returns everything gathered
    /// up to that point so the caller can persist it.
    async fn collect(&mut self) -> (Vec<Posting>, Option<AbortReason>) {
        let mut interceptor =
            ResponseInterceptor::attach(Arc::clone(&self.adapter), self.session.as_ref());
        let mut candidates: Vec<Posting> = Vec::new();
        let mut seen_in_run: HashSet<String> = HashSet::new();
        let criteria = Arc::clone(&self.criteria);

        'pairs: for keyword in &criteria.keywords {
            for city in &criteria.city_codes {
                if self.is_cancelled() {
                    break 'pairs;
                }

                let search_url = self
                    .adapter
                    .build_search_url(&criteria, keyword, city, 1);
                if let Err(e) = self.session.navigate(&search_url).await {
                    if e.is_phase_fatal() {
                        return (
                            candidates,
                            Some(AbortReason::SessionDead {
                                detail: e.to_string(),
                            }),
                        );
                    }
                    tracing::warn!(
                        keyword,
                        city,
                        error = %e,
                        "search navigation failed, skipping pair"
                    );
                    continue;
                }

                let mut page = 0usize;
                loop {
                    if self.is_cancelled() {
                        break 'pairs;
                    }
                    page += 1;

                    let dom = match self.adapter.extract_postings(self.session.as_ref()).await {
                        Ok(postings) => postings,
                        Err(e) if e.is_phase_fatal() => {
                            return (
                                candidates,
                                Some(AbortReason::SessionDead {
                                    detail: e.to_string(),
                                }),
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                keyword,
                                city,
                                page,
                                error = %e,
                                "page extraction failed, treating page as empty"
                            );
                            Vec::new()
                        }
                    };
                    let intercepted = interceptor.drain();
                    let merged = merge_by_scoped_id(dom, intercepted);

                    // An empty page means end-of-results for this pair.
                    if merged.is_empty() {
                        break;
                    }
                    self.counters.pages_collected += 1;

                    for posting in merged {
                        if !seen_in_run.insert(posting.scoped_id.clone()) {
                            continue;
                        }
                        let already_persisted = match self
                            .store
                            .exists(self.platform(), &posting.scoped_id)
                            .await
                        {
                            Ok(persisted) => persisted,
                            Err(e) => {
                                return (
                                    candidates,
                                    Some(AbortReason::Infrastructure {
                                        detail: format!("dedup check failed: {e}"),
                                    }),
                                );
                            }
                        };
                        if already_persisted {
                            // Expected duplicate, skipped without noise.
                            continue;
                        }
                        candidates.push(posting);
                    }

                    self.sink.emit(
                        ProgressEvent::new(
                            self.platform(),
                            EventKind::Progress,
                            format!("collected page {page} for '{keyword}' in {city}"),
                        )
                        .with_progress(candidates.len(), candidates.len()),
                    );

                    if page >= criteria.max_pages {
                        tracing::warn!(keyword, city, page, "max-page guard reached");
                        break;
                    }
                    match self.adapter.advance_page(self.session.as_ref()).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) if e.is_phase_fatal() => {
                            return (
                                candidates,
                                Some(AbortReason::SessionDead {
                                    detail: e.to_string(),
                                }),
                            );
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "next-page affordance failed, stopping pair");
                            break;
                        }
                    }
                }
            }
        }

        if self.is_cancelled() {
            return (candidates, Some(AbortReason::Cancelled));
        }
        (candidates, None)
    }

    async fn filter(
        &mut self,
        pipeline: &FilterPipeline,
        candidates: &mut [Posting],
    ) -> Result<(), AbortReason> {
        for posting in candidates.iter_mut() {
            if self.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            if let Some(reason) = pipeline.evaluate(posting).await {
                posting.transition(PostingStatus::Filtered);
                self.counters.filtered_out += 1;
                tracing::info!(
                    platform = %self.platform(),
                    scoped_id = %posting.scoped_id,
                    reason = ?reason,
                    "posting filtered"
                );
                if let Err(e) = self.store.update_status(posting).await {
                    tracing::warn!(error = %e, "failed to persist filtered status");
                }
            }
        }
        Ok(())
    }

    async fn deliver(&mut self, candidates: &mut [Posting]) -> Result<(), AbortReason> {
        let driver = DeliveryDriver::new(&self.criteria);
        let summary = driver
            .deliver(
                self.adapter.as_ref(),
                self.session.as_ref(),
                candidates,
                &self.cancelled,
                self.sink.as_ref(),
            )
            .await
            .map_err(|e| AbortReason::SessionDead {
                detail: e.to_string(),
            })?;

        self.counters.delivered = summary.delivered;
        self.counters.failed = summary.failed;
        self.counters.skipped = summary.skipped;

        if summary.rate_limit_aborted {
            // Delivered/skipped statuses are already final; the run reports
            // the abort after persisting them.
            for posting in candidates.iter().filter(|p| p.status.is_terminal()) {
                if let Err(e) = self.store.update_status(posting).await {
                    tracing::warn!(error = %e, "failed to persist status after rate-limit abort");
                }
            }
            return Err(AbortReason::RateLimitExhausted);
        }
        if self.is_cancelled() {
            return Err(AbortReason::Cancelled);
        }
        Ok(())
    }
}

/// Front door: runs several platforms concurrently, each on its own task
/// with its own session, isolated from its siblings.
pub struct Engine {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn PostingStore>,
    matcher: Option<Arc<dyn SemanticMatcher>>,
    sink: Arc<dyn EventSink>,
}

impl Engine {
    pub fn new(
        registry: AdapterRegistry,
        store: Arc<dyn PostingStore>,
        matcher: Option<Arc<dyn SemanticMatcher>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            matcher,
            sink,
        }
    }

    /// Build a run for one platform. Returns `None` when no adapter is
    /// registered for it.
    pub fn plan_run(
        &self,
        platform: Platform,
        criteria: SearchCriteria,
        session: Arc<dyn SessionCapability>,
    ) -> Option<PlatformRun> {
        let adapter = self.registry.get(platform)?;
        Some(PlatformRun::new(
            adapter,
            session,
            Arc::clone(&self.store),
            self.matcher.clone(),
            Arc::clone(&self.sink),
            criteria,
        ))
    }

    /// Run every planned platform concurrently and collect the reports.
    /// One platform's failure never aborts its siblings.
    pub async fn run_all(&self, runs: Vec<PlatformRun>) -> Vec<RunReport> {
        let mut handles = Vec::with_capacity(runs.len());
        for run in runs {
            handles.push((run.platform(), run.run_id, tokio::spawn(run.run())));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (platform, run_id, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(%platform, %run_id, error = %e, "platform run task failed");
                    reports.push(RunReport {
                        run_id,
                        platform,
                        phase: RunPhase::Aborted,
                        counters: RunCounters::default(),
                        abort_reason: Some(AbortReason::Infrastructure {
                            detail: e.to_string(),
                        }),
                        started_at: Utc::now(),
                        finished_at: Utc::now(),
                    });
                }
            }
        }
        reports
    }
}
