mod memory;

pub use memory::MemoryPostingStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Platform, Posting, RunReport};

/// Deny-list loaded during the Preparing phase.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    pub companies: Vec<String>,
    pub recruiters: Vec<String>,
}

/// Deduplication & persistence gateway. Owns the invariant that a posting
/// identified by `(platform, scoped_id)` is persisted at most once.
///
/// This is the only resource shared between concurrently running platform
/// workers, so implementations must serialize conflicting writes: when two
/// paths discover the same id, exactly one write wins and the other
/// observes "already exists".
#[async_trait]
pub trait PostingStore: Send + Sync {
    async fn exists(&self, platform: Platform, scoped_id: &str) -> Result<bool>;

    /// Persist the genuinely new postings of `batch` and return how many
    /// were written. The existence filter and the write happen within one
    /// logical unit per batch, so a duplicate arriving concurrently from
    /// another extraction path cannot produce a second row. Ids already
    /// persisted keep their stored status.
    async fn save_new_postings(&self, batch: &[Posting]) -> Result<usize>;

    /// Update the stored status of an already-persisted posting. Terminal
    /// statuses are never overwritten back to Pending.
    async fn update_status(&self, posting: &Posting) -> Result<()>;

    async fn load_blacklist(&self, platform: Platform) -> Result<Blacklist>;

    async fn record_run_summary(&self, report: &RunReport) -> Result<()>;
}
