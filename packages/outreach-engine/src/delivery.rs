use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::adapter::PlatformAdapter;
use crate::config::SearchCriteria;
use crate::error::{EngineError, EngineResult};
use crate::events::{EventKind, EventSink, ProgressEvent};
use crate::session::SessionCapability;
use crate::types::{OutreachOutcome, Posting, PostingStatus};

/// Tally of one delivery phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
    /// Candidates never attempted: past the ceiling, already contacted, or
    /// left over when the phase aborted.
    pub skipped: usize,
    /// Set when consecutive rate limits exhausted the retry cap and the
    /// phase stopped early.
    pub rate_limit_aborted: bool,
}

/// Drives the contact flow over filter survivors, in discovery order, with
/// jittered pacing and a hard delivery ceiling per run.
pub struct DeliveryDriver {
    pacing_min: Duration,
    pacing_max: Duration,
    ceiling: usize,
    max_item_attempts: usize,
    max_rate_limit_retries: usize,
    backoff_base: Duration,
    greeting: String,
}

impl DeliveryDriver {
    pub fn new(criteria: &SearchCriteria) -> Self {
        Self {
            pacing_min: criteria.pacing.min_delay,
            pacing_max: criteria.pacing.max_delay,
            ceiling: criteria.delivery_ceiling,
            max_item_attempts: criteria.retry.max_item_attempts.max(1),
            max_rate_limit_retries: criteria.retry.max_rate_limit_retries,
            backoff_base: criteria.retry.backoff_base,
            greeting: criteria.greeting.clone(),
        }
    }

    /// Attempt outreach for every pending posting until the ceiling is
    /// reached, the run is cancelled, or rate limiting exhausts its retry
    /// budget. Item-level failures are recorded on the posting and never
    /// abort the phase; `Err` here means the session itself is unusable.
    pub async fn deliver(
        &self,
        adapter: &dyn PlatformAdapter,
        session: &dyn SessionCapability,
        postings: &mut [Posting],
        cancelled: &AtomicBool,
        sink: &dyn EventSink,
    ) -> EngineResult<DeliverySummary> {
        let mut summary = DeliverySummary::default();
        let mut rate_limit_streak = 0usize;
        let total = postings.iter().filter(|p| p.status == PostingStatus::Pending).count();

        for posting in postings.iter_mut() {
            if posting.status != PostingStatus::Pending {
                continue;
            }

            // Cancellation and the ceiling are both observed between
            // iterations; an in-flight attempt always completes.
            if cancelled.load(Ordering::SeqCst)
                || summary.delivered >= self.ceiling
                || summary.rate_limit_aborted
            {
                posting.transition(PostingStatus::Skipped);
                summary.skipped += 1;
                continue;
            }

            self.pace().await;

            match self.attempt_with_retry(adapter, session, posting).await {
                Ok(OutreachOutcome::Sent) => {
                    rate_limit_streak = 0;
                    posting.transition(PostingStatus::DeliveredSuccess);
                    summary.delivered += 1;
                    sink.emit(
                        ProgressEvent::new(
                            adapter.platform(),
                            EventKind::Success,
                            format!("contacted {} at {}", posting.recruiter_name, posting.company),
                        )
                        .with_progress(summary.delivered, total.min(self.ceiling)),
                    );
                }
                Ok(OutreachOutcome::AlreadyContacted) => {
                    rate_limit_streak = 0;
                    posting.transition(PostingStatus::Skipped);
                    summary.skipped += 1;
                    tracing::info!(
                        platform = %adapter.platform(),
                        scoped_id = %posting.scoped_id,
                        "recruiter already contacted, skipping"
                    );
                }
                Ok(OutreachOutcome::RateLimited) => {
                    rate_limit_streak += 1;
                    if rate_limit_streak > self.max_rate_limit_retries {
                        sink.emit(ProgressEvent::new(
                            adapter.platform(),
                            EventKind::Error,
                            "rate limit retries exhausted, stopping delivery",
                        ));
                        posting.transition(PostingStatus::Skipped);
                        summary.skipped += 1;
                        summary.rate_limit_aborted = true;
                        continue;
                    }
                    let backoff = self.backoff_base * 2u32.saturating_pow(rate_limit_streak as u32 - 1);
                    sink.emit(ProgressEvent::new(
                        adapter.platform(),
                        EventKind::Warning,
                        format!("rate limited, backing off {}s", backoff.as_secs()),
                    ));
                    tokio::time::sleep(backoff).await;
                    // The posting stays pending; nothing was sent. It is
                    // skipped rather than retried so pacing stays bounded.
                    posting.transition(PostingStatus::Skipped);
                    summary.skipped += 1;
                }
                Ok(OutreachOutcome::Failed { reason }) => {
                    rate_limit_streak = 0;
                    posting.transition(PostingStatus::DeliveredFailed);
                    summary.failed += 1;
                    tracing::warn!(
                        platform = %adapter.platform(),
                        scoped_id = %posting.scoped_id,
                        reason = %reason,
                        "outreach failed"
                    );
                }
                Err(e) if e.is_phase_fatal() => return Err(e),
                Err(e) => {
                    posting.transition(PostingStatus::DeliveredFailed);
                    summary.failed += 1;
                    tracing::warn!(
                        platform = %adapter.platform(),
                        scoped_id = %posting.scoped_id,
                        error = %e,
                        "outreach attempt errored"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// One posting's contact attempt with bounded retry on transient UI
    /// failures.
    async fn attempt_with_retry(
        &self,
        adapter: &dyn PlatformAdapter,
        session: &dyn SessionCapability,
        posting: &Posting,
    ) -> EngineResult<OutreachOutcome> {
        let mut last_err = None;
        for attempt in 1..=self.max_item_attempts {
            match adapter.initiate_contact(session, posting, &self.greeting).await {
                Ok(outcome) => return Ok(outcome),
                Err(EngineError::TransientUi(detail)) if attempt < self.max_item_attempts => {
                    tracing::debug!(
                        scoped_id = %posting.scoped_id,
                        attempt,
                        detail = %detail,
                        "transient UI failure, retrying contact"
                    );
                    last_err = Some(EngineError::TransientUi(detail));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::TransientUi("retries exhausted".into())))
    }

    async fn pace(&self) {
        let delay = {
            let mut rng = rand::thread_rng();
            if self.pacing_max > self.pacing_min {
                let min = self.pacing_min.as_millis() as u64;
                let max = self.pacing_max.as_millis() as u64;
                Duration::from_millis(rng.gen_range(min..=max))
            } else {
                self.pacing_min
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
