//! The keyed, TTL-bounded store backing region state and stats (C3).
//!
//! Grounded on the cache-aside pattern in the teacher's `coverage_cache.rs`
//! (a `moka` cache fronting a slower backing store), generalized here into a
//! `KeyValueStore` trait so a Redis-backed implementation can later sit
//! behind the same seam without touching callers.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Key-building helpers, one function per keyspace in §4.3.
pub mod keys {
    pub fn flights(region: &str) -> String {
        format!("{region}:flights")
    }

    pub fn choppers(region: &str) -> String {
        format!("{region}:choppers")
    }

    pub fn raw(region: &str, source: &str) -> String {
        format!("{region}:raw:{source}")
    }

    pub fn push(region: &str, station: &str) -> String {
        format!("{region}:push:{station}")
    }

    pub fn aircraft_live(hex: &str) -> String {
        format!("aircraft_live:{hex}")
    }

    pub fn aircraft_db(hex: &str) -> String {
        format!("aircraft_db:{hex}")
    }

    pub fn stats(region: &str, field: &str) -> String {
        format!("stats:{region}:{field}")
    }

    pub fn opensky_credits_remaining() -> &'static str {
        "stats:opensky:credits_remaining"
    }

    pub fn opensky_backoff_until() -> &'static str {
        "stats:opensky:backoff_until"
    }
}

/// The abstract cache seam. A real implementation backs this with Redis or
/// similar; the in-process `MokaStore` below is the only implementation
/// shipped here.
pub trait KeyValueStore: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn set_raw_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
    fn del(&self, key: &str) -> Result<(), CacheError>;

    fn hset_raw(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), CacheError>;
    fn hgetall_raw(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, CacheError>;

    /// Batched read, one round trip regardless of `keys.len()` (§4.2's
    /// `batch_lookup` requirement, §4.9's push-buffer read). The default
    /// falls back to one `get_raw` per key; `MokaStore` overrides it since a
    /// single in-process map lookup per key is already as batched as it gets.
    fn mget_raw(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        keys.iter().map(|k| self.get_raw(k)).collect()
    }
}

/// Typed convenience layer over [`KeyValueStore`], JSON-encoding values.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KeyValueStore>,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.store.get_raw(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.store.set_raw_with_ttl(key, bytes, ttl)
    }

    pub fn del(&self, key: &str) -> Result<(), CacheError> {
        self.store.del(key)
    }

    pub fn hset<T: Serialize>(&self, key: &str, field: &str, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.store.hset_raw(key, field, bytes)
    }

    pub fn hgetall<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<(String, T)>, CacheError> {
        self.store
            .hgetall_raw(key)?
            .into_iter()
            .map(|(field, bytes)| Ok((field, serde_json::from_slice(&bytes)?)))
            .collect()
    }

    /// Batched read in the same key order as `keys`; one call into the
    /// store regardless of `keys.len()`.
    pub fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Result<Vec<Option<T>>, CacheError> {
        self.store
            .mget_raw(keys)?
            .into_iter()
            .map(|maybe_bytes| match maybe_bytes {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            })
            .collect()
    }
}

/// A batch of writes applied together, for the registry's bulk-upsert path
/// (§4.2 "batch size >= 1000").
pub struct CachePipeline<'a> {
    client: &'a CacheClient,
    pending: Vec<(String, Vec<u8>, Duration)>,
}

impl<'a> CachePipeline<'a> {
    pub fn new(client: &'a CacheClient) -> Self {
        Self {
            client,
            pending: Vec::new(),
        }
    }

    pub fn set_with_ttl<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        self.pending.push((key.into(), bytes, ttl));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn flush(self) -> Result<(), CacheError> {
        for (key, bytes, ttl) in self.pending {
            self.client.store.set_raw_with_ttl(&key, bytes, ttl)?;
        }
        Ok(())
    }
}

type HashEntry = dashmap::DashMap<String, Vec<u8>>;

#[derive(Clone)]
struct TtlEntry {
    value: Vec<u8>,
    ttl: Duration,
}

/// A per-entry expiry policy: each value carries its own TTL set at insert
/// time, so one `Cache` can serve keyspaces with wildly different lifetimes
/// (seconds-scale live positions vs. hour-scale registry rows).
struct PerEntryExpiry;

impl Expiry<String, TtlEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &TtlEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// The shipped [`KeyValueStore`]: an in-process `moka` cache keyed by string
/// with a per-entry TTL policy, plus a side table of `dashmap` hashes for the
/// hset/hgetall API.
pub struct MokaStore {
    entries: Cache<String, TtlEntry>,
    hashes: Arc<dashmap::DashMap<String, Arc<HashEntry>>>,
}

impl MokaStore {
    /// `max_capacity` bounds entry count, not bytes; region/aircraft volumes
    /// in this system are small enough that an entry-count cap is sufficient.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(PerEntryExpiry)
                .build(),
            hashes: Arc::new(dashmap::DashMap::new()),
        }
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl KeyValueStore for MokaStore {
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value))
    }

    fn set_raw_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), TtlEntry { value, ttl });
        Ok(())
    }

    fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key);
        self.hashes.remove(key);
        Ok(())
    }

    fn hset_raw(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), CacheError> {
        let entry = self
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(dashmap::DashMap::new()))
            .clone();
        entry.insert(field.to_string(), value);
        Ok(())
    }

    fn hgetall_raw(&self, key: &str) -> Result<Vec<(String, Vec<u8>)>, CacheError> {
        match self.hashes.get(key) {
            Some(entry) => Ok(entry
                .iter()
                .map(|kv| (kv.key().clone(), kv.value().clone()))
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    fn mget_raw(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        Ok(keys
            .iter()
            .map(|k| self.entries.get(k).map(|entry| entry.value))
            .collect())
    }
}
