use thiserror::Error;

/// Failure taxonomy for the workflow engine.
///
/// Item-level failures (`TransientUi`, `NetworkDecode`) are caught and
/// counted where they occur; phase-level failures (`AuthTimeout`,
/// `SessionDead`, exhausted `RateLimited`) abort the owning platform's run
/// only. Duplicate detection is not represented here at all: the dedup
/// gateway reports it through counts, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An element was missing or not interactable within its wait timeout.
    /// Retried a bounded number of times, then the single item is failed.
    #[error("transient UI failure: {0}")]
    TransientUi(String),

    /// The login marker never appeared before the configured deadline.
    #[error("authentication not detected within {0:?}")]
    AuthTimeout(std::time::Duration),

    /// An intercepted response matched the watched URL pattern but did not
    /// decode against the platform schema. Logged and dropped, never fatal.
    #[error("failed to decode intercepted response from {url}: {source}")]
    NetworkDecode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The platform signaled throttling.
    #[error("rate limited by platform")]
    RateLimited,

    /// The browser session itself is gone. Aborts this platform's run.
    #[error("browser session died: {0}")]
    SessionDead(String),

    /// Dedup/persistence gateway failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether this failure aborts the whole platform run rather than the
    /// single item that raised it.
    pub fn is_phase_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::AuthTimeout(_) | EngineError::SessionDead(_) | EngineError::Store(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
