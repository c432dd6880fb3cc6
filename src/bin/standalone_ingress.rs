//! `flock-ingress`: runs the push-ingress HTTP listener (C6) on its own,
//! for deployments that separate ingestion from the collector process.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flock::cache::{CacheClient, MokaStore};
use flock::config::Config;
use flock::ingress::{router, IngressState};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "flock-ingress", about = "Accept push-ingress uploads from remote stations.")]
struct Args {
    #[arg(long, default_value = "flock.toml")]
    config: PathBuf,

    #[arg(long, default_value = "0.0.0.0:8088")]
    listen: String,
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
    info!(listen = %args.listen, "starting flock-ingress");

    let store: Arc<dyn flock::cache::KeyValueStore> = Arc::new(MokaStore::default());
    let cache = CacheClient::new(store);
    let state = IngressState::new(cache, config.push.shared_secrets.clone(), config.push.push_interval());

    let listener = match tokio::net::TcpListener::bind(&args.listen).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("failed to bind listener on {}: {e}", args.listen);
            std::process::exit(4);
        }
    };

    if let Err(e) = axum::serve(listener, router(state)).await {
        eprintln!("fatal: {e}");
        std::process::exit(3);
    }
}
