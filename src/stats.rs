//! Stats (C10): per-region advisory counters/gauges under `stats:{region}:*`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{keys, CacheClient};

/// One cycle's worth of stats, written as a single hash per region so a
/// reader can fetch the whole snapshot in one round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    pub cycle_duration_ms: u64,
    pub aircraft_observed: u64,
    pub per_source_observed: std::collections::HashMap<String, u64>,
    pub helicopters_observed: u64,
    pub timeouts: u64,
    pub dedup_ratio: f64,
    pub enrichment_hit_rate: f64,
}

const STATS_TTL: Duration = Duration::from_secs(24 * 3600);

/// Publish one cycle's stats for `region`. All counters here are advisory
/// per §4.10 and may be reset at will -- a plain overwrite, not an
/// accumulation.
pub fn publish(cache: &CacheClient, region: &str, stats: &CycleStats) -> Result<(), crate::error::CacheError> {
    cache.set_with_ttl(&keys::stats(region, "last_cycle"), stats, STATS_TTL)?;

    metrics::histogram!("flock_cycle_duration_ms", "region" => region.to_string())
        .record(stats.cycle_duration_ms as f64);
    metrics::gauge!("flock_aircraft_observed", "region" => region.to_string())
        .set(stats.aircraft_observed as f64);
    metrics::gauge!("flock_helicopters_observed", "region" => region.to_string())
        .set(stats.helicopters_observed as f64);
    metrics::counter!("flock_cycle_timeouts_total", "region" => region.to_string())
        .increment(stats.timeouts);

    Ok(())
}

/// Compute the dedup ratio: fraction of blended groups that had >= 2
/// distinct contributing sources, out of all groups in the cycle.
pub fn dedup_ratio(total_groups: usize, blended_groups: usize) -> f64 {
    if total_groups == 0 {
        0.0
    } else {
        blended_groups as f64 / total_groups as f64
    }
}

/// Fraction of reports that matched a registry entry.
pub fn enrichment_hit_rate(total: usize, hits: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}
