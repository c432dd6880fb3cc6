//! Local-receiver source (C4): polls a dump1090-style JSON endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::SourceError;
use crate::report::{DataSource, Hex, Report};

use super::SourceFetch;

/// Records whose `seen` age (seconds) exceeds this are dropped as stale,
/// per §4.4.
const DEFAULT_STALENESS_SECONDS: f64 = 60.0;

#[derive(Debug, Deserialize)]
struct WireResponse {
    aircraft: Vec<WireRecord>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    hex: Option<String>,
    #[serde(default)]
    flight: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt_baro: Option<i32>,
    alt_geom: Option<i32>,
    gs: Option<f64>,
    track: Option<f64>,
    baro_rate: Option<i32>,
    squawk: Option<String>,
    rssi: Option<f64>,
    messages: Option<u64>,
    seen: Option<f64>,
}

pub struct LocalReceiverSource {
    id: String,
    url: String,
    client: reqwest::Client,
    staleness_seconds: f64,
}

impl LocalReceiverSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with static config"),
            staleness_seconds: DEFAULT_STALENESS_SECONDS,
        }
    }

    fn normalize(&self, record: WireRecord) -> Option<Report> {
        let hex = Hex::parse(record.hex.as_deref()?)?;

        if let Some(seen) = record.seen
            && seen > self.staleness_seconds
        {
            return None;
        }

        Some(Report {
            hex,
            flight: record.flight.unwrap_or_default().trim().to_string(),
            lat: record.lat,
            lon: record.lon,
            alt_baro: record.alt_baro,
            alt_geom: record.alt_geom,
            gs: record.gs,
            track: record.track,
            baro_rate: record.baro_rate,
            on_ground: false,
            rssi: record.rssi,
            messages: record.messages,
            seen: record.seen,
            data_source: DataSource::Dump1090,
            distance_miles: None,
            squawk: record.squawk,
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
impl SourceFetch for LocalReceiverSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<Report>, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceError::Timeout
                } else {
                    SourceError::Transport(e)
                }
            })?;

        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let reports: Vec<Report> = body
            .aircraft
            .into_iter()
            .filter_map(|record| self.normalize(record))
            .collect();

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> LocalReceiverSource {
        LocalReceiverSource::new("dump1090", "http://example.invalid/data.json")
    }

    #[test]
    fn normalize_drops_records_without_hex() {
        let src = source();
        let record = WireRecord {
            hex: None,
            flight: Some("UAL123".into()),
            lat: Some(1.0),
            lon: Some(1.0),
            alt_baro: None,
            alt_geom: None,
            gs: None,
            track: None,
            baro_rate: None,
            squawk: None,
            rssi: None,
            messages: None,
            seen: None,
        };
        assert!(src.normalize(record).is_none());
    }

    #[test]
    fn normalize_drops_stale_records() {
        let src = source();
        let record = WireRecord {
            hex: Some("A1B2C3".into()),
            flight: None,
            lat: Some(1.0),
            lon: Some(1.0),
            alt_baro: None,
            alt_geom: None,
            gs: None,
            track: None,
            baro_rate: None,
            squawk: None,
            rssi: None,
            messages: None,
            seen: Some(61.0),
        };
        assert!(src.normalize(record).is_none());
    }

    #[test]
    fn normalize_lowercases_hex_and_trims_flight() {
        let src = source();
        let record = WireRecord {
            hex: Some("A1B2C3".into()),
            flight: Some("  UAL123  ".into()),
            lat: Some(1.0),
            lon: Some(1.0),
            alt_baro: Some(3500),
            alt_geom: None,
            gs: None,
            track: None,
            baro_rate: None,
            squawk: None,
            rssi: None,
            messages: None,
            seen: Some(1.0),
        };
        let report = src.normalize(record).unwrap();
        assert_eq!(report.hex.as_str(), "a1b2c3");
        assert_eq!(report.flight, "UAL123");
    }
}
