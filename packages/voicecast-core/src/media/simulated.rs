//! Deterministic in-memory media for demos and local runs.

use async_trait::async_trait;

use super::{FetchError, MediaFetcher, MediaHandle, MediaInfo, MediaResolver, ResolveError};

/// Resolves every non-empty query to a synthetic track.
///
/// Durations are derived from the query text so the same query always yields
/// the same track.
#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    max_duration_secs: u32,
}

impl SimulatedMedia {
    pub fn new(max_duration_secs: u32) -> Self {
        Self {
            max_duration_secs: max_duration_secs.max(1),
        }
    }

    fn duration_for(&self, query: &str) -> u32 {
        let sum = query
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        sum % self.max_duration_secs + 1
    }
}

#[async_trait]
impl MediaResolver for SimulatedMedia {
    async fn resolve(&self, query: &str) -> Result<MediaInfo, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound);
        }
        Ok(MediaInfo {
            title: query.to_string(),
            duration_secs: self.duration_for(query),
            source_url: format!("simulated://{}", query.replace(' ', "+")),
        })
    }
}

#[async_trait]
impl MediaFetcher for SimulatedMedia {
    async fn fetch(&self, locator: &str) -> Result<MediaHandle, FetchError> {
        if locator.trim().is_empty() {
            return Err(FetchError::Failed("empty locator".into()));
        }
        Ok(MediaHandle::new(format!("memory:{locator}")))
    }
}
