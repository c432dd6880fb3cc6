//! Push-ingress read side (C6): the scheduler's view of buffers written by
//! [`crate::ingress`]. Reading is a single pipelined `hgetall` over the
//! region's station index, never a fan-out HTTP call to stations.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{keys, CacheClient};
use crate::error::SourceError;
use crate::report::Report;

use super::SourceFetch;

/// One station's buffer as persisted by the ingress handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushBuffer {
    pub station_id: String,
    pub station_name: String,
    pub written_at: DateTime<Utc>,
    pub aircraft: Vec<Report>,
}

/// Index of station ids that have ever pushed into a region, so the reader
/// can enumerate buffers without a key-scan. Field = station id, value =
/// last-write timestamp; entries are advisory and never block a read of a
/// since-expired buffer.
fn station_index_key(region: &str) -> String {
    format!("{region}:push_stations")
}

pub fn record_station(cache: &CacheClient, region: &str, station_id: &str) -> Result<(), crate::error::CacheError> {
    cache.hset(&station_index_key(region), station_id, &Utc::now())
}

pub struct PushSource {
    region: String,
    cache: CacheClient,
    push_interval: Duration,
}

impl PushSource {
    pub fn new(region: impl Into<String>, cache: CacheClient, push_interval: Duration) -> Self {
        Self {
            region: region.into(),
            cache,
            push_interval,
        }
    }
}

#[async_trait]
impl SourceFetch for PushSource {
    fn source_id(&self) -> &str {
        "push"
    }

    async fn fetch(&self) -> Result<Vec<Report>, SourceError> {
        let stations: Vec<(String, DateTime<Utc>)> = self
            .cache
            .hgetall(&station_index_key(&self.region))
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let buffer_keys: Vec<String> = stations
            .iter()
            .map(|(station_id, _)| keys::push(&self.region, station_id))
            .collect();
        let buffers: Vec<Option<PushBuffer>> = self
            .cache
            .mget(&buffer_keys)
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let max_age = chrono::Duration::from_std(self.push_interval * 2)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));

        let mut reports = Vec::new();
        for buffer in buffers.into_iter().flatten() {
            // Excluded once its snapshot age exceeds 2x the expected push
            // interval (§4.7), independent of the cache TTL's own eviction.
            if Utc::now().signed_duration_since(buffer.written_at) <= max_age {
                reports.extend(buffer.aircraft);
            }
        }

        Ok(reports)
    }
}
