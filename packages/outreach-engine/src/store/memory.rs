use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Platform, Posting, RunReport};

use super::{Blacklist, PostingStore};

#[derive(Default)]
struct Inner {
    postings: HashMap<(Platform, String), Posting>,
    blacklists: HashMap<Platform, Blacklist>,
    reports: Vec<RunReport>,
}

/// In-memory posting store. The relational collaborator implements the same
/// trait in production; this one backs tests and single-process runs.
///
/// All dedup-sensitive operations take the single mutex for their whole
/// duration, which is what makes `save_new_postings` one logical unit.
#[derive(Default)]
pub struct MemoryPostingStore {
    inner: Mutex<Inner>,
}

impl MemoryPostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blacklist(self, platform: Platform, blacklist: Blacklist) -> Self {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.blacklists.insert(platform, blacklist);
        }
        self
    }

    pub fn posting_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .postings
            .len()
    }

    pub fn get(&self, platform: Platform, scoped_id: &str) -> Option<Posting> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .postings
            .get(&(platform, scoped_id.to_string()))
            .cloned()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reports
            .clone()
    }
}

#[async_trait]
impl PostingStore for MemoryPostingStore {
    async fn exists(&self, platform: Platform, scoped_id: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .postings
            .contains_key(&(platform, scoped_id.to_string())))
    }

    async fn save_new_postings(&self, batch: &[Posting]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut saved = 0;
        for posting in batch {
            let key = (posting.platform, posting.scoped_id.clone());
            if let std::collections::hash_map::Entry::Vacant(entry) = inner.postings.entry(key) {
                entry.insert(posting.clone());
                saved += 1;
            }
        }
        Ok(saved)
    }

    async fn update_status(&self, posting: &Posting) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = (posting.platform, posting.scoped_id.clone());
        if let Some(stored) = inner.postings.get_mut(&key) {
            if !stored.status.is_terminal() {
                stored.status = posting.status;
            }
        }
        Ok(())
    }

    async fn load_blacklist(&self, platform: Platform) -> Result<Blacklist> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.blacklists.get(&platform).cloned().unwrap_or_default())
    }

    async fn record_run_summary(&self, report: &RunReport) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.reports.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostingStatus;

    fn posting(id: &str) -> Posting {
        Posting::new(Platform::Boss, id)
    }

    #[tokio::test]
    async fn duplicate_ids_within_one_batch_saved_once() {
        let store = MemoryPostingStore::new();
        let saved = store
            .save_new_postings(&[posting("a"), posting("a"), posting("b")])
            .await
            .unwrap();
        assert_eq!(saved, 2);
        assert_eq!(store.posting_count(), 2);
    }

    #[tokio::test]
    async fn duplicate_ids_across_batches_saved_once() {
        let store = MemoryPostingStore::new();
        assert_eq!(store.save_new_postings(&[posting("a")]).await.unwrap(), 1);
        assert_eq!(
            store
                .save_new_postings(&[posting("a"), posting("c")])
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.posting_count(), 2);
    }

    #[tokio::test]
    async fn same_id_on_different_platforms_is_not_a_duplicate() {
        let store = MemoryPostingStore::new();
        let mut other = posting("a");
        other.platform = Platform::Yupao;
        let saved = store
            .save_new_postings(&[posting("a"), other])
            .await
            .unwrap();
        assert_eq!(saved, 2);
    }

    #[tokio::test]
    async fn reingestion_never_resets_terminal_status() {
        let store = MemoryPostingStore::new();
        let mut delivered = posting("a");
        delivered.status = PostingStatus::DeliveredSuccess;
        store.save_new_postings(&[delivered]).await.unwrap();

        // A fresh Pending record for the same id is dropped by dedup.
        store.save_new_postings(&[posting("a")]).await.unwrap();
        assert_eq!(
            store.get(Platform::Boss, "a").unwrap().status,
            PostingStatus::DeliveredSuccess
        );

        // An explicit status update cannot regress it either.
        store.update_status(&posting("a")).await.unwrap();
        assert_eq!(
            store.get(Platform::Boss, "a").unwrap().status,
            PostingStatus::DeliveredSuccess
        );
    }

    #[tokio::test]
    async fn concurrent_saves_of_same_id_one_write_wins() {
        use std::sync::Arc;

        let store = Arc::new(MemoryPostingStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.save_new_postings(&[posting("contested")]).await
            }));
        }

        let mut total_saved = 0;
        for handle in handles {
            total_saved += handle.await.unwrap().unwrap();
        }
        assert_eq!(total_saved, 1);
        assert_eq!(store.posting_count(), 1);
    }
}
