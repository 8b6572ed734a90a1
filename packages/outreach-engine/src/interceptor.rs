use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::adapter::PlatformAdapter;
use crate::error::EngineError;
use crate::session::{InterceptedResponse, SessionCapability};
use crate::types::Posting;

/// Passive observer of the session's background network traffic. Some
/// platforms feed their result list from an internal JSON API whose payload
/// is richer than the rendered DOM; this taps that stream and turns matched
/// responses into postings through the adapter's decoder.
pub struct ResponseInterceptor {
    adapter: Arc<dyn PlatformAdapter>,
    rx: Option<UnboundedReceiver<InterceptedResponse>>,
    pub decode_failures: usize,
}

impl ResponseInterceptor {
    /// Attach to the session if the adapter watches an internal API. An
    /// adapter without a response pattern yields an inert interceptor.
    pub fn attach(adapter: Arc<dyn PlatformAdapter>, session: &dyn SessionCapability) -> Self {
        let rx = adapter
            .response_pattern()
            .map(|pattern| session.watch_responses(pattern));
        Self {
            adapter,
            rx,
            decode_failures: 0,
        }
    }

    /// Decode every response received so far. A body that fails to decode is
    /// logged and dropped; nothing escapes this method except postings.
    pub fn drain(&mut self) -> Vec<Posting> {
        let Some(rx) = self.rx.as_mut() else {
            return Vec::new();
        };

        let mut postings = Vec::new();
        while let Ok(response) = rx.try_recv() {
            match self.adapter.decode_response(&response) {
                Ok(decoded) => postings.extend(decoded),
                Err(EngineError::NetworkDecode { url, source }) => {
                    self.decode_failures += 1;
                    tracing::warn!(
                        platform = %self.adapter.platform(),
                        url = %url,
                        error = %source,
                        "dropping undecodable intercepted response"
                    );
                }
                Err(e) => {
                    self.decode_failures += 1;
                    tracing::warn!(
                        platform = %self.adapter.platform(),
                        url = %response.url,
                        error = %e,
                        "dropping intercepted response"
                    );
                }
            }
        }
        postings
    }
}

/// Merge DOM-extracted and intercepted postings by platform-scoped id,
/// preserving discovery order. When both paths saw the same id the record
/// with more populated fields wins; ties keep the earlier record.
pub fn merge_by_scoped_id(primary: Vec<Posting>, secondary: Vec<Posting>) -> Vec<Posting> {
    let mut merged: Vec<Posting> = Vec::with_capacity(primary.len() + secondary.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for posting in primary.into_iter().chain(secondary) {
        match index_by_id.get(&posting.scoped_id) {
            Some(&i) => {
                if posting.richness() > merged[i].richness() {
                    merged[i] = posting;
                }
            }
            None => {
                index_by_id.insert(posting.scoped_id.clone(), merged.len());
                merged.push(posting);
            }
        }
    }
    merged
}
