//! Push ingress (C6 write side): an axum HTTP server accepting bulk uploads
//! of normalized reports from remote stations.
//!
//! The `FromRequestParts`-based extractor is adapted from the teacher's
//! `AuthUser`/`AdminUser` bearer-token pattern in `auth.rs`: instead of
//! decoding a JWT, it matches a shared-secret header against the region its
//! prefix encodes, and instead of a `DatabaseError` rejection, the
//! rejections map onto this spec's own `IngressError` status vocabulary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequestParts, Json, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::CacheClient;
use crate::error::IngressError;
use crate::report::{DataSource, Hex, Report};
use crate::sources::push::{self, PushBuffer};

const DEFAULT_MAX_RECORDS: usize = 10_000;

#[derive(Clone)]
pub struct IngressState {
    pub cache: CacheClient,
    /// Region id -> expected shared-secret prefix, per §6 "push.shared_secrets".
    pub shared_secrets: Arc<HashMap<String, String>>,
    pub max_records: usize,
    pub push_ttl: Duration,
}

impl IngressState {
    /// `push_interval` is the expected interval between a station's uploads
    /// (§6 `push.push_interval_seconds`); the cache TTL is set generously
    /// above the explicit `2 * push_interval` snapshot-age check the reader
    /// performs in [`crate::sources::push::PushSource::fetch`], so cache
    /// eviction never fires before that check would already have excluded
    /// the buffer.
    pub fn new(cache: CacheClient, shared_secrets: HashMap<String, String>, push_interval: Duration) -> Self {
        Self {
            cache,
            shared_secrets: Arc::new(shared_secrets),
            max_records: DEFAULT_MAX_RECORDS,
            push_ttl: push_interval * 4,
        }
    }
}

/// Resolves the caller's region from the shared-secret header, per §4.6.
pub struct AuthenticatedRegion(pub String);

impl FromRequestParts<IngressState> for AuthenticatedRegion {
    type Rejection = IngressError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &IngressState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get("x-push-secret")
            .and_then(|v| v.to_str().ok())
            .ok_or(IngressError::Unauthenticated)?;

        state
            .shared_secrets
            .iter()
            .find(|(_, expected)| expected.as_str() == secret)
            .map(|(region, _)| AuthenticatedRegion(region.clone()))
            .ok_or_else(|| IngressError::PermissionDenied(secret.to_string()))
    }
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngressError::Unauthenticated => StatusCode::UNAUTHORIZED,
            IngressError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            IngressError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            IngressError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        };
        (status, self.to_string()).into_response()
    }
}

/// Wire-level record shape, identical to the local-receiver record (§6).
#[derive(Debug, Deserialize)]
pub struct WireAircraftRecord {
    pub hex: Option<String>,
    #[serde(default)]
    pub flight: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_baro: Option<i32>,
    pub alt_geom: Option<i32>,
    pub gs: Option<f64>,
    pub track: Option<f64>,
    pub baro_rate: Option<i32>,
    pub squawk: Option<String>,
    pub rssi: Option<f64>,
    pub messages: Option<u64>,
    pub seen: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub station_id: String,
    pub station_name: String,
    pub timestamp: DateTime<Utc>,
    pub aircraft: Vec<WireAircraftRecord>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub status: &'static str,
    pub processed_count: usize,
    pub aircraft_count: usize,
    pub errors: Vec<String>,
    pub request_id: Uuid,
}

fn validate_and_normalize(record: WireAircraftRecord, station_id: &str) -> Result<Report, String> {
    let hex = record
        .hex
        .as_deref()
        .and_then(Hex::parse)
        .ok_or_else(|| "missing or malformed hex".to_string())?;

    Ok(Report {
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
        data_source: DataSource::PiStation(station_id.to_string()),
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

async fn handle_push(
    State(state): State<IngressState>,
    region: AuthenticatedRegion,
    Json(request): Json<PushRequest>,
) -> Result<axum::Json<PushResponse>, IngressError> {
    let AuthenticatedRegion(region_id) = region;
    let request_id = Uuid::new_v4();

    if request.aircraft.len() > state.max_records {
        return Err(IngressError::PayloadTooLarge(state.max_records));
    }

    if request.station_id.trim().is_empty() {
        return Err(IngressError::InvalidArgument("station_id is required".into()));
    }

    let received = request.aircraft.len();
    let mut errors = Vec::new();
    let mut survivors = Vec::new();

    for record in request.aircraft {
        match validate_and_normalize(record, &request.station_id) {
            Ok(report) => survivors.push(report),
            Err(e) => errors.push(e),
        }
    }

    let persisted = survivors.len();

    let buffer = PushBuffer {
        station_id: request.station_id.clone(),
        station_name: request.station_name.clone(),
        written_at: Utc::now(),
        aircraft: survivors,
    };

    state
        .cache
        .set_with_ttl(
            &crate::cache::keys::push(&region_id, &request.station_id),
            &buffer,
            state.push_ttl,
        )
        .map_err(|e| IngressError::InvalidArgument(e.to_string()))?;

    push::record_station(&state.cache, &region_id, &request.station_id)
        .map_err(|e| IngressError::InvalidArgument(e.to_string()))?;

    info!(
        region = %region_id,
        station = %request.station_id,
        received,
        persisted,
        errors = errors.len(),
        %request_id,
        "push ingress accepted upload"
    );

    Ok(axum::Json(PushResponse {
        status: "ok",
        processed_count: received,
        aircraft_count: persisted,
        errors,
        request_id,
    }))
}

pub fn router(state: IngressState) -> Router {
    Router::new()
        .route("/v1/push", post(handle_push))
        .with_state(state)
}

/// Logged once at startup when a region has no configured shared secret but
/// appears in `push.shared_secrets` misconfigured — caught by config
/// validation before the server ever binds, per §4.0 Config errors.
pub fn warn_unconfigured_region(region: &str) {
    warn!(region, "push ingress has no shared secret configured for this region");
}
