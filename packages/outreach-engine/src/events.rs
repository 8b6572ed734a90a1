use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Platform;

/// Severity/category of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Progress,
    Success,
    Error,
    Warning,
}

/// Structured progress event emitted per phase transition and per notable
/// outcome. The presentation layer (SSE/REST) consumes these; the engine
/// only knows the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub platform: Platform,
    pub kind: EventKind,
    pub message: String,
    pub current: Option<usize>,
    pub total: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(platform: Platform, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            platform,
            kind,
            message: message.into(),
            current: None,
            total: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_progress(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }
}

/// Sink accepting progress events. Emission must never fail the run, so the
/// method is infallible; implementations drop events they cannot deliver.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink backed by an unbounded tokio channel, for wiring the engine to an
/// SSE/REST layer. Events emitted after the receiver is dropped are
/// discarded.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Sink that logs every event through `tracing`. Useful default when no
/// presentation layer is attached.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        match event.kind {
            EventKind::Error => tracing::error!(
                platform = %event.platform,
                current = ?event.current,
                total = ?event.total,
                "{}",
                event.message
            ),
            EventKind::Warning => tracing::warn!(
                platform = %event.platform,
                current = ?event.current,
                total = ?event.total,
                "{}",
                event.message
            ),
            _ => tracing::info!(
                platform = %event.platform,
                current = ?event.current,
                total = ?event.total,
                "{}",
                event.message
            ),
        }
    }
}
