use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ENUMS (type-safe states)
// ============================================================================

/// Recruitment platform a run targets. Selects which adapter, URL templates
/// and filter vocabulary apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Chat-first platform whose result list is fed by an internal JSON API.
    Boss,
    /// Classic job board with server-rendered result cards.
    Yupao,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Boss => "boss",
            Platform::Yupao => "yupao",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a posting within a run. Transitions are append-only:
/// `Pending` may move to any other status, everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    Pending,
    Filtered,
    DeliveredSuccess,
    DeliveredFailed,
    /// Eligible after filtering but never attempted because the delivery
    /// ceiling was reached first. Not the same as Filtered.
    Skipped,
}

impl PostingStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PostingStatus::Pending)
    }
}

/// Outcome of one contact/apply attempt, as observed by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutreachOutcome {
    Sent,
    /// The platform reports we already contacted this recruiter. Skip, not
    /// an error.
    AlreadyContacted,
    /// Throttling signal (explicit dialog or platform-reported send limit).
    /// The delivery driver backs off and retries.
    RateLimited,
    Failed { reason: String },
}

/// Phase of a platform run's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Preparing,
    Authenticating,
    Collecting,
    Filtering,
    Delivering,
    Reporting,
    Terminated,
    Aborted,
}

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbortReason {
    AuthTimeout,
    Cancelled,
    SessionDead { detail: String },
    RateLimitExhausted,
    Infrastructure { detail: String },
}

// ============================================================================
// CORE TYPES
// ============================================================================

/// A discovered job opening. `scoped_id` is unique within one platform and
/// is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub platform: Platform,
    pub scoped_id: String,
    pub title: String,
    pub company: String,
    pub salary_text: String,
    pub location: String,
    pub recruiter_name: String,
    pub recruiter_last_active: String,
    pub detail_url: Option<url::Url>,
    /// Raw labels from the source page, used by keyword filters.
    pub source_tags: Vec<String>,
    pub status: PostingStatus,
}

impl Posting {
    pub fn new(platform: Platform, scoped_id: impl Into<String>) -> Self {
        Self {
            platform,
            scoped_id: scoped_id.into(),
            title: String::new(),
            company: String::new(),
            salary_text: String::new(),
            location: String::new(),
            recruiter_name: String::new(),
            recruiter_last_active: String::new(),
            detail_url: None,
            source_tags: Vec::new(),
            status: PostingStatus::Pending,
        }
    }

    /// Apply a status transition. Terminal statuses are never overwritten;
    /// returns whether the transition was applied.
    pub fn transition(&mut self, next: PostingStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if next == PostingStatus::Pending {
            return false;
        }
        self.status = next;
        true
    }

    /// Count of populated descriptive fields. Used to pick the richer record
    /// when the DOM path and the intercepted-API path both discover the same
    /// posting.
    pub fn richness(&self) -> usize {
        [
            &self.title,
            &self.company,
            &self.salary_text,
            &self.location,
            &self.recruiter_name,
            &self.recruiter_last_active,
        ]
        .iter()
        .filter(|s| !s.is_empty())
        .count()
            + usize::from(self.detail_url.is_some())
            + usize::from(!self.source_tags.is_empty())
    }
}

/// Why the filter pipeline rejected a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RejectionReason {
    RecruiterInactive { last_active: String },
    Blacklisted { name: String },
    KeywordMismatch { detail: String },
    SalaryOutOfRange { salary_text: String },
    SemanticMismatch { detail: String },
}

// ============================================================================
// RUN STATE & REPORTING
// ============================================================================

/// Per-run counters, updated only by the platform's own worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub discovered: usize,
    pub filtered_out: usize,
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Monotonic count of result pages consumed across every keyword×city
    /// pair; the collection cursor surfaced in the run report.
    pub pages_collected: usize,
}

/// Final summary of one platform run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub platform: Platform,
    pub phase: RunPhase,
    pub counters: RunCounters,
    pub abort_reason: Option<AbortReason>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
