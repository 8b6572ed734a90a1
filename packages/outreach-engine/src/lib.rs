//! Multi-platform recruitment workflow engine.
//!
//! Drives an automated browser session per platform through login
//! detection, paginated job discovery (DOM scraping plus interception of
//! the platform's internal API responses), deduplication, rule-based
//! filtering and rate-limited outreach. The browser driver, persistence
//! layer and presentation layer are collaborators behind traits
//! ([`SessionCapability`], [`PostingStore`], [`EventSink`]).

pub mod adapter;
pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod filter;
pub mod interceptor;
pub mod matcher;
pub mod platforms;
pub mod session;
pub mod store;
pub mod testing;
pub mod types;
pub mod workflow;

// Re-exports for clean API
pub use adapter::{AdapterRegistry, PlatformAdapter};
pub use config::{PacingConfig, RetryConfig, SearchCriteria};
pub use error::{EngineError, EngineResult};
pub use events::{ChannelSink, EventKind, EventSink, ProgressEvent, TracingSink};
pub use matcher::{HttpSemanticMatcher, SemanticMatcher};
pub use session::{ElementHandle, ElementRef, InterceptedResponse, SessionCapability};
pub use store::{Blacklist, MemoryPostingStore, PostingStore};
pub use types::{
    AbortReason, OutreachOutcome, Platform, Posting, PostingStatus, RejectionReason, RunCounters,
    RunPhase, RunReport,
};
pub use workflow::{Engine, PlatformRun, RunHandle};
