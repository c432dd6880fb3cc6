//! Region scheduler (C9): the per-region tick loop tying together sources,
//! the blender, the enricher, and cache writes.
//!
//! Grounded on the teacher's `handle_run` startup sequencing
//! (`commands/run/mod.rs`) for the overall shape of "spawn one loop per
//! unit of work, fan out concurrently, pipeline writes"; fan-out uses
//! `futures_util::future::join_all`/`timeout` (the teacher's own
//! concurrent-fan-in tool, per `actions/fixes.rs`'s `select_all` usage)
//! rather than the teacher's actor-style channels, since each tick's
//! sources are a fixed, known set rather than an open stream of
//! independent packets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::blender::{self, SourceContribution};
use crate::cache::{keys, CacheClient, CachePipeline};
use crate::enrich;
use crate::registry::Registry;
use crate::report::{DataSource, Region, Report};
use crate::shutdown::ShutdownToken;
use crate::sources::{self, Source};
use crate::stats::{self, CycleStats};

/// The per-region state machine named in §4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Fetching,
    Blending,
    Writing,
    Degraded,
}

/// A configured source plus the per-source cadence state the scheduler
/// needs to honor §6's "actual fetch rate is max(scheduler_tick,
/// poll_interval)": a source is only re-fetched once its own poll interval
/// has elapsed, and otherwise carries forward its last fetched reports into
/// this tick's blend.
struct SourceSlot {
    source: Source,
    priority: u8,
    poll_interval: Duration,
    last_fetch: Option<Instant>,
    last_reports: Vec<Report>,
}

pub struct RegionScheduler {
    region: Region,
    sources: Vec<SourceSlot>,
    cache: CacheClient,
    registry: Arc<Registry>,
    tick_interval: Duration,
    state: SchedulerState,
}

impl RegionScheduler {
    pub fn new(
        region: Region,
        sources: Vec<(Source, u8, Duration)>,
        cache: CacheClient,
        registry: Arc<Registry>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            region,
            sources: sources
                .into_iter()
                .map(|(source, priority, poll_interval)| SourceSlot {
                    source,
                    priority,
                    poll_interval,
                    last_fetch: None,
                    last_reports: Vec::new(),
                })
                .collect(),
            cache,
            registry,
            tick_interval,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Run ticks until `shutdown` is cancelled. A tick never overlaps the
    /// previous one; if a tick overruns the interval the next tick starts
    /// immediately with no catch-up (§4.9 "Cycle overlap").
    pub async fn run(&mut self, shutdown: ShutdownToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let tick_start = Instant::now();
            tokio::select! {
                _ = self.run_tick() => {}
                _ = shutdown.cancelled() => {
                    info!(region = %self.region.id, "shutdown requested before step 4, abandoning tick");
                    break;
                }
            }

            let elapsed = tick_start.elapsed();
            if elapsed < self.tick_interval {
                tokio::select! {
                    _ = tokio::time::sleep(self.tick_interval - elapsed) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        }
    }

    /// One full cycle: fetch -> blend -> enrich -> write -> stats (§4.9).
    async fn run_tick(&mut self) {
        let cycle_start = Instant::now();
        self.state = SchedulerState::Fetching;

        let wave_deadline = self.tick_interval.saturating_sub(Duration::from_secs(1));
        let mut timeouts = 0u64;

        // Concurrently fan out to every source whose poll interval has
        // elapsed (§4.9 step 2, §5 "fan-out of sources"); sources not yet due
        // keep contributing their last fetched reports into this tick's blend.
        let due: Vec<usize> = self
            .sources
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.last_fetch.is_none_or(|t| t.elapsed() >= slot.poll_interval))
            .map(|(i, _)| i)
            .collect();

        let fetches = due.iter().map(|&i| {
            let source = &self.sources[i].source;
            async move { (i, timeout(wave_deadline, source.fetch()).await) }
        });
        let fetch_results = join_all(fetches).await;

        for (i, outcome) in fetch_results {
            let slot = &mut self.sources[i];
            slot.last_fetch = Some(Instant::now());
            match outcome {
                Ok(Ok(reports)) => {
                    slot.last_reports = reports;
                }
                Ok(Err(e)) => {
                    sources::record_fetch_error(slot.source.source_id(), &e);
                }
                Err(_) => {
                    timeouts += 1;
                    warn!(region = %self.region.id, source = slot.source.source_id(), "source fetch timed out");
                }
            }
        }

        let mut contributions = Vec::with_capacity(self.sources.len());
        let mut raw_by_source: Vec<(String, Vec<Report>)> = Vec::new();
        for slot in &self.sources {
            if !slot.last_reports.is_empty() {
                raw_by_source.push((slot.source.source_id().to_string(), slot.last_reports.clone()));
            }
            contributions.push(SourceContribution {
                source_id: slot.source.source_id().to_string(),
                priority: slot.priority,
                reports: slot.last_reports.clone(),
            });
        }

        self.state = SchedulerState::Blending;
        let bbox = self.region.bounding_box();
        let blended = blender::blend(contributions, bbox, self.region.center(), 0.01);

        let enriched = enrich::enrich(&self.registry, blended);
        let blended_count = enriched
            .flights
            .iter()
            .filter(|r| r.data_source == DataSource::Blended)
            .count();
        let enrichment_hits = enriched
            .flights
            .iter()
            .filter(|r| r.registration.is_some() || r.icao_aircraft_class.is_some())
            .count();

        self.state = SchedulerState::Writing;
        if let Err(e) = self.write_cycle(&enriched, &raw_by_source) {
            warn!(region = %self.region.id, error = %e, "cache write failed, entering degraded state");
            self.state = SchedulerState::Degraded;
            return;
        }

        let cycle_stats = CycleStats {
            cycle_duration_ms: cycle_start.elapsed().as_millis() as u64,
            aircraft_observed: enriched.flights.len() as u64,
            per_source_observed: raw_by_source
                .iter()
                .map(|(id, reports)| (id.clone(), reports.len() as u64))
                .collect(),
            helicopters_observed: enriched.choppers.len() as u64,
            timeouts,
            dedup_ratio: stats::dedup_ratio(enriched.flights.len(), blended_count),
            enrichment_hit_rate: stats::enrichment_hit_rate(enriched.flights.len(), enrichment_hits),
        };
        if let Err(e) = stats::publish(&self.cache, &self.region.id, &cycle_stats) {
            warn!(region = %self.region.id, error = %e, "failed to publish cycle stats");
        }

        self.state = SchedulerState::Idle;
    }

    /// Pipeline-write the cycle's output (§4.9 step 5): one round trip.
    fn write_cycle(
        &self,
        enriched: &enrich::EnrichedCycle,
        raw_by_source: &[(String, Vec<Report>)],
    ) -> Result<(), crate::error::CacheError> {
        let default_ttl = Duration::from_secs(60);
        let mut pipeline = CachePipeline::new(&self.cache);

        pipeline.set_with_ttl(keys::flights(&self.region.id), &enriched.flights, default_ttl)?;
        pipeline.set_with_ttl(keys::choppers(&self.region.id), &enriched.choppers, default_ttl)?;

        for report in &enriched.flights {
            pipeline.set_with_ttl(keys::aircraft_live(report.hex.as_str()), report, default_ttl)?;
        }

        for (source_id, reports) in raw_by_source {
            pipeline.set_with_ttl(keys::raw(&self.region.id, source_id), reports, default_ttl)?;
        }

        pipeline.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaStore;
    use crate::report::{DataSource, Hex, Report};
    use crate::sources::local_receiver::LocalReceiverSource;
    use std::sync::Arc;

    fn region() -> Region {
        Region {
            id: "etex".into(),
            name: "East Texas".into(),
            center_lat: 32.3513,
            center_lon: -95.3011,
            radius_miles: 50.0,
            timezone: "UTC".into(),
        }
    }

    #[tokio::test]
    async fn tick_with_no_sources_writes_empty_flights() {
        let store: Arc<dyn crate::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
        let cache = CacheClient::new(store);
        let registry = Arc::new(Registry::new(cache.clone()));
        let mut scheduler = RegionScheduler::new(region(), vec![], cache.clone(), registry, Duration::from_secs(15));

        scheduler.run_tick().await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let flights: Vec<Report> = cache.get(&keys::flights("etex")).unwrap().unwrap();
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn tick_with_unreachable_source_counts_error_and_proceeds() {
        let store: Arc<dyn crate::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
        let cache = CacheClient::new(store);
        let registry = Arc::new(Registry::new(cache.clone()));
        let source = Source::LocalReceiver(LocalReceiverSource::new("dump1090", "http://127.0.0.1:1/data.json"));
        let mut scheduler = RegionScheduler::new(
            region(),
            vec![(source, 2, Duration::from_secs(15))],
            cache.clone(),
            registry,
            Duration::from_secs(15),
        );

        scheduler.run_tick().await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let flights: Vec<Report> = cache.get(&keys::flights("etex")).unwrap().unwrap();
        assert!(flights.is_empty());
    }

    /// Two slow sources fetch concurrently within one tick, not sequentially:
    /// total tick time stays near one source's delay, not their sum.
    #[tokio::test]
    async fn tick_fans_out_sources_concurrently() {
        async fn slow_aircraft() -> axum::Json<serde_json::Value> {
            tokio::time::sleep(Duration::from_millis(150)).await;
            axum::Json(serde_json::json!({ "aircraft": [] }))
        }

        let app = axum::Router::new()
            .route("/a.json", axum::routing::get(slow_aircraft))
            .route("/b.json", axum::routing::get(slow_aircraft));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let store: Arc<dyn crate::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
        let cache = CacheClient::new(store);
        let registry = Arc::new(Registry::new(cache.clone()));
        let sources = vec![
            (
                Source::LocalReceiver(LocalReceiverSource::new("a", format!("http://{addr}/a.json"))),
                2,
                Duration::from_secs(15),
            ),
            (
                Source::LocalReceiver(LocalReceiverSource::new("b", format!("http://{addr}/b.json"))),
                2,
                Duration::from_secs(15),
            ),
        ];
        let mut scheduler = RegionScheduler::new(region(), sources, cache, registry, Duration::from_secs(15));

        let start = Instant::now();
        scheduler.run_tick().await;
        assert!(
            start.elapsed() < Duration::from_millis(280),
            "tick took {:?}, sources should have fetched concurrently",
            start.elapsed()
        );
    }

    #[test]
    fn data_source_variant_used_for_push_tag_matches_region_station() {
        let ds = DataSource::PiStation("station-1".into());
        assert_eq!(ds.source_id(), "pi_station:station-1");
        let _ = Hex::parse("a1b2c3");
    }
}
