//! End-to-end scenarios from the testable-properties section, driving the
//! public module surface the way a collector process would wire it
//! together for one region cycle.

use std::sync::Arc;
use std::time::Duration;

use flock::blender::{self, SourceContribution};
use flock::cache::{keys, CacheClient, MokaStore};
use flock::enrich;
use flock::ingress::{router, IngressState};
use flock::registry::Registry;
use flock::report::{DataSource, Hex, Region, RegistryEntry, Report};

fn region() -> Region {
    Region {
        id: "r1".into(),
        name: "Region One".into(),
        center_lat: 32.3513,
        center_lon: -95.3011,
        radius_miles: 150.0,
        timezone: "UTC".into(),
    }
}

fn base_report(hex: &str, source: DataSource) -> Report {
    Report {
        hex: Hex::parse(hex).unwrap(),
        flight: "UAL123".into(),
        lat: Some(32.4),
        lon: Some(-95.3),
        alt_baro: Some(35000),
        alt_geom: None,
        gs: Some(450.0),
        track: Some(270.0),
        baro_rate: None,
        on_ground: false,
        rssi: None,
        messages: None,
        seen: Some(0.5),
        data_source: source,
        distance_miles: None,
        squawk: None,
        registration: None,
        model: None,
        manufacturer: None,
        operator: None,
        owner: None,
        typecode: None,
        aircraft_type: None,
        icao_aircraft_class: None,
        is_helicopter: false,
    }
}

/// S1 — single local-receiver source, no wide-area contribution.
#[test]
fn s1_single_source_reports_dump1090_and_correct_distance() {
    let region = region();
    let contribution = SourceContribution {
        source_id: "dump1090".into(),
        priority: 2,
        reports: vec![base_report("a1b2c3", DataSource::Dump1090)],
    };

    let out = blender::blend(vec![contribution], region.bounding_box(), region.center(), 0.01);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].data_source, DataSource::Dump1090);
    assert!((out[0].distance_miles.unwrap() - 3.38).abs() < 0.05);
}

/// S2 — local-receiver and wide-area both see the same aircraft; the
/// higher-priority local-receiver kinematics win and the tag becomes
/// "blended".
#[test]
fn s2_two_sources_same_hex_blends_and_prefers_local_receiver_kinematics() {
    let region = region();
    let local = base_report("a1b2c3", DataSource::Dump1090);

    let mut wide = base_report("a1b2c3", DataSource::OpenSky);
    wide.lat = Some(32.41);
    wide.lon = Some(-95.29);
    wide.alt_baro = Some((10668.0_f64 * 3.28084).round() as i32);
    wide.gs = Some(231.5 * 1.94384);
    wide.seen = Some(2.0);

    let out = blender::blend(
        vec![
            SourceContribution {
                source_id: "dump1090".into(),
                priority: 2,
                reports: vec![local],
            },
            SourceContribution {
                source_id: "opensky".into(),
                priority: 1,
                reports: vec![wide],
            },
        ],
        region.bounding_box(),
        region.center(),
        0.01,
    );

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].data_source, DataSource::Blended);
    // Kinematics copied exclusively from the winning (local-receiver) report.
    assert_eq!(out[0].alt_baro, Some(35000));
    assert_eq!(out[0].gs, Some(450.0));
}

/// S3 — a push upload through the real HTTP listener contributes a
/// `pi_station:` tagged report that survives into the next blend.
#[tokio::test]
async fn s3_push_upload_is_picked_up_with_pi_station_tag() {
    let store: Arc<dyn flock::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
    let cache = CacheClient::new(store);

    let mut secrets = std::collections::HashMap::new();
    secrets.insert("etex".to_string(), "etex.testsecret".to_string());
    let state = IngressState::new(cache.clone(), secrets, Duration::from_secs(60));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });

    let body = serde_json::json!({
        "station_id": "ETEX01",
        "station_name": "Etex Station 1",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "aircraft": [
            {
                "hex": "a1b2c3", "flight": "N1", "lat": 32.35, "lon": -95.30,
                "alt_baro": 1000, "alt_geom": null, "gs": null, "track": null,
                "baro_rate": null, "squawk": null, "rssi": null, "messages": null, "seen": 1.0
            },
            {
                "hex": "d4e5f6", "flight": "N2", "lat": 32.36, "lon": -95.31,
                "alt_baro": 2000, "alt_geom": null, "gs": null, "track": null,
                "baro_rate": null, "squawk": null, "rssi": null, "messages": null, "seen": 1.0
            }
        ]
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/v1/push"))
        .header("x-push-secret", "etex.testsecret")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let parsed: serde_json::Value = response.json().await.unwrap();
    assert_eq!(parsed["processed_count"], 2);
    assert_eq!(parsed["aircraft_count"], 2);

    let push_source = flock::sources::push::PushSource::new("etex", cache, Duration::from_secs(60));
    let reports = push_source_fetch(&push_source).await;
    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|r| matches!(&r.data_source, DataSource::PiStation(id) if id == "ETEX01")));
}

async fn push_source_fetch(source: &flock::sources::push::PushSource) -> Vec<Report> {
    use flock::sources::SourceFetch;
    source.fetch().await.unwrap()
}

/// S4 — a real HTTP 429 from the wide-area upstream sets the shared backoff
/// gauge, and a second fetch inside the backoff window never hits the network.
#[tokio::test]
async fn s4_wide_area_429_triggers_backoff_and_suppresses_subsequent_calls() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let store: Arc<dyn flock::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
    let cache = CacheClient::new(store);

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_for_handler = hits.clone();
    let app = axum::Router::new().route(
        "/states/all",
        axum::routing::get(move || {
            let hits = hits_for_handler.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                axum::http::StatusCode::TOO_MANY_REQUESTS
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let bbox = region().bounding_box();
    let source = flock::sources::wide_area::WideAreaSource::new(
        "opensky",
        format!("http://{addr}/states/all"),
        bbox,
        cache.clone(),
        400,
    );

    use flock::sources::SourceFetch;
    let first = source.fetch().await;
    assert!(matches!(first, Err(flock::error::SourceError::RateLimited)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let backoff_until: i64 = cache.get(keys::opensky_backoff_until()).unwrap().unwrap();
    assert!(backoff_until > chrono::Utc::now().timestamp());

    // A fetch within the backoff window is suppressed before any HTTP call.
    let second = source.fetch().await.unwrap();
    assert!(second.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// S5 — absent registry: no-enrichment mode, flights list still produced.
#[tokio::test]
async fn s5_missing_registry_falls_back_to_no_enrichment_mode() {
    let store: Arc<dyn flock::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
    let cache = CacheClient::new(store);
    let registry = Registry::new(cache);

    let summary = registry.load(&[], None).await.unwrap();
    assert!(summary.enrichment_disabled);

    let blended = vec![base_report("a1b2c3", DataSource::Dump1090)];
    let result = enrich::enrich(&registry, blended);
    assert_eq!(result.flights.len(), 1);
    assert!(!result.flights[0].is_helicopter);
    assert!(result.choppers.is_empty());
}

/// S6 — a registry hit with an `H`-class yields a choppers-list entry.
#[test]
fn s6_helicopter_registry_entry_appears_in_choppers() {
    let store: Arc<dyn flock::cache::KeyValueStore> = Arc::new(MokaStore::new(100));
    let cache = CacheClient::new(store);
    cache
        .set_with_ttl(
            &keys::aircraft_db("a1b2c3"),
            &RegistryEntry {
                icao_aircraft_class: Some("H2T".into()),
                ..Default::default()
            },
            Duration::from_secs(3600),
        )
        .unwrap();

    let registry = Registry::new(cache);
    let blended = vec![base_report("a1b2c3", DataSource::Dump1090)];
    let result = enrich::enrich(&registry, blended);

    assert_eq!(result.choppers.len(), 1);
    assert_eq!(result.choppers[0].hex.as_str(), "a1b2c3");
}

/// Boundary invariant from §8: a point exactly on the bounding-box edge is
/// accepted by the blender's clip step.
#[test]
fn point_on_bbox_boundary_is_accepted_by_blend() {
    let region = region();
    let bbox = region.bounding_box();
    let mut report = base_report("a1b2c3", DataSource::Dump1090);
    report.lat = Some(bbox.lamax);
    report.lon = Some(bbox.lomin);

    let out = blender::blend(
        vec![SourceContribution {
            source_id: "dump1090".into(),
            priority: 2,
            reports: vec![report],
        }],
        bbox,
        region.center(),
        0.0,
    );
    assert_eq!(out.len(), 1);
}
