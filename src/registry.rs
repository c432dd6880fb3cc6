//! Aircraft registry: bulk CSV load, cache persistence, batch lookup (C2).
//!
//! Load policy and the malformed-row skip/count convention are grounded on
//! `commands/load_data/aircraft_types.rs`'s embedded-CSV streaming; the
//! "file path, then fallback URL, then no-enrichment mode" sequencing
//! generalizes `ddb.rs`'s fetch-then-populate-map pattern.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;
use tracing::{info, warn};

use crate::cache::{keys, CacheClient, CachePipeline};
use crate::error::RegistryError;
use crate::report::{Hex, RegistryEntry};

/// Minimum number of writes batched into a single cache pipeline flush
/// (§4.2 "batch size >= 1000").
const BATCH_SIZE: usize = 1000;

/// Registry entries never expire on their own; a fresh load overwrites them.
const REGISTRY_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Raw CSV row shape, column order per §4.2.
#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    icao24: String,
    registration: Option<String>,
    manufacturer: Option<String>,
    model: Option<String>,
    typecode: Option<String>,
    operator: Option<String>,
    owner: Option<String>,
    #[serde(rename = "icaoaircrafttype")]
    icao_aircraft_class: Option<String>,
}

/// Outcome of a load attempt, surfaced for the startup log line in S5.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub rows_loaded: usize,
    pub rows_skipped: usize,
    pub enrichment_disabled: bool,
}

/// Registry store: persists entries to the shared cache and keeps a small
/// process-local LRU to absorb repeated lookups within a tick (§4.2).
pub struct Registry {
    cache: CacheClient,
    lru: Mutex<LruCache<Hex, Option<RegistryEntry>>>,
    no_enrichment: std::sync::atomic::AtomicBool,
}

impl Registry {
    pub fn new(cache: CacheClient) -> Self {
        Self {
            cache,
            lru: Mutex::new(LruCache::new(NonZeroUsize::new(1000).unwrap())),
            no_enrichment: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn is_enrichment_disabled(&self) -> bool {
        self.no_enrichment.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Load the registry CSV from the first of `candidate_paths` that
    /// exists; if none exist, try `fallback_url`; if that also fails, fall
    /// back to permanent no-enrichment mode (§4.2 step 1, §7 Registry-missing).
    pub async fn load(
        &self,
        candidate_paths: &[std::path::PathBuf],
        fallback_url: Option<&str>,
    ) -> Result<LoadSummary, RegistryError> {
        for path in candidate_paths {
            if path.exists() {
                let file = std::fs::File::open(path)
                    .map_err(|e| RegistryError::SourceUnavailable(e.to_string()))?;
                return self.load_from_reader(std::io::BufReader::new(file));
            }
        }

        if let Some(url) = fallback_url {
            match reqwest::get(url).await {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| RegistryError::SourceUnavailable(e.to_string()))?;
                    return self.load_from_reader(std::io::Cursor::new(bytes));
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "registry fallback fetch returned non-success status");
                }
                Err(e) => {
                    warn!(error = %e, "registry fallback fetch failed");
                }
            }
        }

        warn!("registry source unavailable; operating in no-enrichment mode for process lifetime");
        self.no_enrichment.store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(LoadSummary {
            enrichment_disabled: true,
            ..Default::default()
        })
    }

    /// Stream-parse and upsert, never materializing the whole file (§4.2 step 2).
    fn load_from_reader<R: std::io::Read>(&self, reader: R) -> Result<LoadSummary, RegistryError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut summary = LoadSummary::default();
        let mut pipeline = CachePipeline::new(&self.cache);

        for result in csv_reader.deserialize::<CsvRow>() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "skipping malformed registry row");
                    summary.rows_skipped += 1;
                    continue;
                }
            };

            let Some(hex) = Hex::parse(&row.icao24) else {
                summary.rows_skipped += 1;
                continue;
            };

            let entry = RegistryEntry {
                registration: row.registration,
                manufacturer: row.manufacturer,
                model: row.model,
                typecode: row.typecode,
                operator: row.operator,
                owner: row.owner,
                icao_aircraft_class: row.icao_aircraft_class,
            };

            pipeline
                .set_with_ttl(keys::aircraft_db(hex.as_str()), &entry, REGISTRY_TTL)
                .map_err(|e| RegistryError::SourceUnavailable(e.to_string()))?;
            summary.rows_loaded += 1;

            if pipeline.len() >= BATCH_SIZE {
                let flushed = std::mem::replace(&mut pipeline, CachePipeline::new(&self.cache));
                flushed
                    .flush()
                    .map_err(|e| RegistryError::SourceUnavailable(e.to_string()))?;
            }
        }

        if !pipeline.is_empty() {
            pipeline
                .flush()
                .map_err(|e| RegistryError::SourceUnavailable(e.to_string()))?;
        }

        info!(
            loaded = summary.rows_loaded,
            skipped = summary.rows_skipped,
            "registry load complete"
        );
        Ok(summary)
    }

    /// Batch-lookup, one cache round trip regardless of input size (§4.2).
    /// Entries are also cached in the process-local LRU for hot repeats
    /// within the same tick.
    pub fn batch_lookup(
        &self,
        hexes: &[Hex],
    ) -> std::collections::HashMap<Hex, Option<RegistryEntry>> {
        let mut result = std::collections::HashMap::with_capacity(hexes.len());
        let mut to_fetch = Vec::new();

        {
            let mut lru = self.lru.lock().unwrap();
            for hex in hexes {
                if let Some(cached) = lru.get(hex) {
                    result.insert(hex.clone(), cached.clone());
                } else {
                    to_fetch.push(hex.clone());
                }
            }
        }

        if self.is_enrichment_disabled() {
            for hex in to_fetch {
                result.insert(hex, None);
            }
            return result;
        }

        let fetch_keys: Vec<String> = to_fetch.iter().map(|hex| keys::aircraft_db(hex.as_str())).collect();
        let entries: Vec<Option<RegistryEntry>> = self.cache.mget(&fetch_keys).unwrap_or_else(|_| vec![None; fetch_keys.len()]);

        let mut lru = self.lru.lock().unwrap();
        for (hex, entry) in to_fetch.into_iter().zip(entries) {
            lru.put(hex.clone(), entry.clone());
            result.insert(hex, entry);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaStore;
    use std::sync::Arc;

    fn registry() -> Registry {
        let store: Arc<dyn crate::cache::KeyValueStore> = Arc::new(MokaStore::new(10_000));
        Registry::new(CacheClient::new(store))
    }

    #[test]
    fn stream_loads_and_normalizes_hex() {
        let reg = registry();
        let csv = "icao24,registration,manufacturer,model,typecode,operator,owner,icaoaircrafttype\n\
                    A1B2C3,N12345,Cessna,172,C172,Acme,Jane Doe,L1P\n";
        let summary = reg.load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(summary.rows_loaded, 1);
        assert_eq!(summary.rows_skipped, 0);

        let hex = Hex::parse("a1b2c3").unwrap();
        let looked_up = reg.batch_lookup(std::slice::from_ref(&hex));
        let entry = looked_up.get(&hex).unwrap().as_ref().unwrap();
        assert_eq!(entry.registration.as_deref(), Some("N12345"));
    }

    #[test]
    fn malformed_hex_rows_are_skipped_and_counted() {
        let reg = registry();
        let csv = "icao24,registration,manufacturer,model,typecode,operator,owner,icaoaircrafttype\n\
                    zzzzzz,N1,Cessna,172,C172,Acme,Jane,L1P\n\
                    a1b2c3,N2,Cessna,172,C172,Acme,Jane,H2T\n";
        let summary = reg.load_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(summary.rows_loaded, 1);
        assert_eq!(summary.rows_skipped, 1);
    }

    #[test]
    fn missing_hex_yields_absent_entry_not_error() {
        let reg = registry();
        let looked_up = reg.batch_lookup(&[Hex::parse("ffffff").unwrap()]);
        assert_eq!(looked_up.get(&Hex::parse("ffffff").unwrap()).unwrap(), &None);
    }

    #[tokio::test]
    async fn no_candidate_path_and_no_fallback_enters_no_enrichment_mode() {
        let reg = registry();
        let summary = reg.load(&[], None).await.unwrap();
        assert!(summary.enrichment_disabled);
        assert!(reg.is_enrichment_disabled());

        let looked_up = reg.batch_lookup(&[Hex::parse("a1b2c3").unwrap()]);
        assert_eq!(looked_up.get(&Hex::parse("a1b2c3").unwrap()).unwrap(), &None);
    }
}
