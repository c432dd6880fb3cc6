//! `flock-collector`: runs one region scheduler per configured region.
//!
//! CLI shape grounded on the only `clap::Parser` usage in the teacher tree
//! (`fetch_receivers.rs::Args`); startup sequencing (init logging, init
//! metrics, load registry, then run) mirrors `commands/run/mod.rs::handle_run`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flock::cache::{CacheClient, MokaStore};
use flock::config::Config;
use flock::registry::Registry;
use flock::report::Region;
use flock::scheduler::RegionScheduler;
use flock::shutdown::{spawn_shutdown_handler, ShutdownToken};
use flock::sources::local_receiver::LocalReceiverSource;
use flock::sources::push::PushSource;
use flock::sources::wide_area::WideAreaSource;
use flock::sources::Source;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "flock-collector", about = "Collect, blend, and cache live aircraft positions.")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "flock.toml")]
    config: PathBuf,
}

fn build_sources(
    region: &flock::config::RegionConfig,
    cache: &CacheClient,
    push_interval: std::time::Duration,
) -> Vec<(Source, u8, std::time::Duration)> {
    region
        .sources
        .iter()
        .filter_map(|source_config| match source_config.kind {
            flock::config::SourceKind::LocalReceiver => {
                let url = source_config.url.clone()?;
                Some((
                    Source::LocalReceiver(LocalReceiverSource::new("dump1090", url)),
                    2,
                    source_config.poll_interval(),
                ))
            }
            flock::config::SourceKind::WideArea => {
                let url = source_config.url.clone()?;
                let bbox = Region {
                    id: region.id.clone(),
                    name: region.name.clone(),
                    center_lat: region.center_lat,
                    center_lon: region.center_lon,
                    radius_miles: region.radius_miles,
                    timezone: region.timezone.clone(),
                }
                .bounding_box();
                Some((
                    Source::WideArea(WideAreaSource::new("opensky", url, bbox, cache.clone(), 400)),
                    1,
                    source_config.poll_interval(),
                ))
            }
            flock::config::SourceKind::Push => Some((
                Source::Push(PushSource::new(region.id.clone(), cache.clone(), push_interval)),
                3,
                source_config.poll_interval(),
            )),
        })
        .collect()
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    flock::telemetry::init_tracing(&config.log.level);
    let metrics_handle = flock::telemetry::init_metrics();

    info!(regions = config.regions.len(), "starting flock-collector");

    let store: Arc<dyn flock::cache::KeyValueStore> = Arc::new(MokaStore::default());
    let cache = CacheClient::new(store);
    let registry = Arc::new(Registry::new(cache.clone()));

    let candidate_paths: Vec<PathBuf> = config
        .registry
        .csv_path
        .iter()
        .map(PathBuf::from)
        .collect();
    match registry
        .load(&candidate_paths, config.registry.fallback_url.as_deref())
        .await
    {
        Ok(summary) if summary.enrichment_disabled => {
            info!("running in no-enrichment mode: registry unavailable at startup");
        }
        Ok(summary) => {
            info!(rows = summary.rows_loaded, skipped = summary.rows_skipped, "registry loaded");
        }
        Err(e) => {
            error!(error = %e, "registry load failed unexpectedly");
        }
    }

    let shutdown = ShutdownToken::new();
    spawn_shutdown_handler(shutdown.clone());

    let metrics_app = flock::telemetry::metrics_router(metrics_handle);
    let metrics_listener = tokio::net::TcpListener::bind("0.0.0.0:9090").await.ok();
    if let Some(listener) = metrics_listener {
        tokio::spawn(async move {
            let _ = axum::serve(listener, metrics_app).await;
        });
    }

    let mut handles = Vec::new();
    for region_config in &config.regions {
        let region = Region {
            id: region_config.id.clone(),
            name: region_config.name.clone(),
            center_lat: region_config.center_lat,
            center_lon: region_config.center_lon,
            radius_miles: region_config.radius_miles,
            timezone: region_config.timezone.clone(),
        };
        let sources = build_sources(region_config, &cache, config.push.push_interval());
        let mut scheduler = RegionScheduler::new(
            region,
            sources,
            cache.clone(),
            registry.clone(),
            config.tick_interval(),
        );
        let region_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run(region_shutdown).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    info!("flock-collector shut down cleanly");
}
