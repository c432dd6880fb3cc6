//! Wide-area source (C5): a states endpoint queried by bounding box, with
//! unit normalization and a credit/backoff controller.
//!
//! The bounding-box query shape is grounded on `Bounds`/`QueryParams` in
//! `other_examples/.../opensky-rs__src-types.rs`; the credit/backoff and
//! per-region response cache are this spec's own addition, implemented with
//! the teacher's `moka` dependency for the cache and its `CacheClient`
//! keyspace (§4.3) for the cross-region-shared backoff gauges.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Timelike, Utc};
use moka::sync::Cache;
use serde::Deserialize;
use tracing::debug;

use crate::cache::{keys, CacheClient};
use crate::error::SourceError;
use crate::geo::BoundingBox;
use crate::report::{DataSource, Hex, Report};

use super::SourceFetch;

const METERS_TO_FEET: f64 = 3.28084;
const MPS_TO_KNOTS: f64 = 1.94384;
const MPS_TO_FPM: f64 = 196.85;
const BACKOFF_DURATION: Duration = Duration::from_secs(5 * 60);
const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Positional-vector index layout from §6 "Wide-area upstream wire format".
#[derive(Debug, Deserialize)]
struct StatesResponse {
    states: Option<Vec<Vec<serde_json::Value>>>,
}

pub struct WideAreaSource {
    id: String,
    url: String,
    client: reqwest::Client,
    bbox: BoundingBox,
    cache: CacheClient,
    response_cache: Cache<String, Vec<Report>>,
    daily_credit_budget: u64,
}

impl WideAreaSource {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        bbox: BoundingBox,
        cache: CacheClient,
        daily_credit_budget: u64,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with static config"),
            bbox,
            cache,
            response_cache: Cache::builder()
                .max_capacity(16)
                .time_to_live(RESPONSE_CACHE_TTL)
                .build(),
            daily_credit_budget,
        }
    }

    /// Credit cost estimated from bbox area, per §4.5.
    fn estimated_credit_cost(&self) -> u32 {
        let area = self.bbox.area_deg2();
        if area <= 25.0 {
            1
        } else if area <= 100.0 {
            2
        } else if area <= 400.0 {
            3
        } else {
            4
        }
    }

    fn backoff_until(&self) -> Option<i64> {
        self.cache.get(keys::opensky_backoff_until()).ok().flatten()
    }

    fn in_backoff(&self) -> bool {
        match self.backoff_until() {
            Some(until) => Utc::now().timestamp() < until,
            None => false,
        }
    }

    fn set_backoff(&self) {
        let until = Utc::now().timestamp() + BACKOFF_DURATION.as_secs() as i64;
        let _ = self.cache.set_with_ttl(
            keys::opensky_backoff_until(),
            &until,
            BACKOFF_DURATION,
        );
    }

    fn persist_credits_remaining(&self, remaining: u64) {
        let _ = self.cache.set_with_ttl(
            keys::opensky_credits_remaining(),
            &remaining,
            Duration::from_secs(24 * 3600),
        );
    }

    fn credits_remaining(&self) -> u64 {
        self.cache
            .get(keys::opensky_credits_remaining())
            .ok()
            .flatten()
            .unwrap_or(self.daily_credit_budget)
    }

    /// Whether to skip this tick because the projected consumption rate
    /// would exhaust the daily budget before midnight UTC (§4.5).
    fn should_throttle(&self) -> bool {
        let now = Utc::now();
        let seconds_until_midnight = (86_400 - (now.num_seconds_from_midnight() as i64)).max(1) as f64;
        let fraction_of_day_remaining = seconds_until_midnight / 86_400.0;
        let remaining = self.credits_remaining() as f64;
        let projected_need = self.estimated_credit_cost() as f64 * 2.0;
        remaining < projected_need && fraction_of_day_remaining > 0.0
    }

    fn response_cache_key(&self) -> String {
        format!(
            "{:.4},{:.4},{:.4},{:.4}",
            self.bbox.lamin, self.bbox.lomin, self.bbox.lamax, self.bbox.lomax
        )
    }

    fn normalize(value: &[serde_json::Value]) -> Option<Report> {
        let get_str = |i: usize| value.get(i).and_then(|v| v.as_str());
        let get_f64 = |i: usize| value.get(i).and_then(|v| v.as_f64());
        let get_bool = |i: usize| value.get(i).and_then(|v| v.as_bool()).unwrap_or(false);

        let hex = Hex::parse(get_str(0)?)?;

        Some(Report {
            hex,
            flight: get_str(1).unwrap_or_default().trim().to_string(),
            lat: get_f64(6),
            lon: get_f64(5),
            alt_baro: get_f64(7).map(|m| (m * METERS_TO_FEET).round() as i32),
            alt_geom: get_f64(13).map(|m| (m * METERS_TO_FEET).round() as i32),
            gs: get_f64(9).map(|v| v * MPS_TO_KNOTS),
            track: get_f64(10),
            baro_rate: get_f64(11).map(|v| (v * MPS_TO_FPM).round() as i32),
            on_ground: get_bool(8),
            rssi: None,
            messages: None,
            seen: get_f64(4),
            data_source: DataSource::OpenSky,
            distance_miles: None,
            squawk: get_str(14).map(|s| s.to_string()),
            registration: None,
            model: None,
            manufacturer: None,
            operator: None,
            owner: None,
            typecode: None,
            aircraft_type: None,
            icao_aircraft_class: None,
            is_helicopter: false,
        })
    }
}

#[async_trait]
impl SourceFetch for WideAreaSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<Report>, SourceError> {
        if self.in_backoff() {
            debug!(source = %self.id, "wide-area source in backoff, skipping network call");
            return Ok(Vec::new());
        }

        if let Some(cached) = self.response_cache.get(&self.response_cache_key()) {
            return Ok(cached);
        }

        if self.should_throttle() {
            debug!(source = %self.id, "wide-area source throttling to conserve credit budget");
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("lamin", self.bbox.lamin),
                ("lomin", self.bbox.lomin),
                ("lamax", self.bbox.lamax),
                ("lomax", self.bbox.lomax),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout
                } else {
                    SourceError::Transport(e)
                }
            })?;

        if response.status().as_u16() == 429 {
            self.set_backoff();
            return Err(SourceError::RateLimited);
        }

        if let Some(remaining) = response
            .headers()
            .get("x-rate-limit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.persist_credits_remaining(remaining);
        }

        let body: StatesResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let reports: Vec<Report> = body
            .states
            .unwrap_or_default()
            .iter()
            .filter_map(|state| Self::normalize(state))
            .collect();

        self.response_cache
            .insert(self.response_cache_key(), reports.clone());

        Ok(reports)
    }
}
