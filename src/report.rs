//! The normalized aircraft report and the types around it (§3).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A validated, lowercase 24-bit ICAO hex address, 6 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hex(String);

impl Hex {
    /// Parse and normalize a hex string. Accepts any case; rejects anything
    /// that doesn't reduce to exactly 6 lowercase hex digits.
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.len() == 6 && lower.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(lower))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provenance tag carried on every published report, per §3 invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    PiStation(String),
    Dump1090,
    OpenSky,
    Blended,
}

impl DataSource {
    /// Priority used by the blender's winner selection (§4.7). Higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            DataSource::PiStation(_) => 3,
            DataSource::Dump1090 => 2,
            DataSource::OpenSky => 1,
            // `Blended` is never an input tag, only an output tag; it has no
            // meaningful priority of its own.
            DataSource::Blended => 0,
        }
    }

    /// A stable sort key for deterministic tie-breaking, distinct from
    /// priority (the spec's "lexicographically smaller source id").
    pub fn source_id(&self) -> String {
        match self {
            DataSource::PiStation(id) => format!("pi_station:{id}"),
            DataSource::Dump1090 => "dump1090".to_string(),
            DataSource::OpenSky => "opensky".to_string(),
            DataSource::Blended => "blended".to_string(),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source_id())
    }
}

/// A single normalized aircraft report, the unit the blender/enricher/cache
/// operate on. Field set and meaning match §3 exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub hex: Hex,
    #[serde(default)]
    pub flight: String,

    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt_baro: Option<i32>,
    pub alt_geom: Option<i32>,
    pub gs: Option<f64>,
    pub track: Option<f64>,
    pub baro_rate: Option<i32>,
    #[serde(default)]
    pub on_ground: bool,

    pub rssi: Option<f64>,
    pub messages: Option<u64>,
    pub seen: Option<f64>,

    pub data_source: DataSource,

    #[serde(default)]
    pub distance_miles: Option<f64>,
    pub squawk: Option<String>,

    #[serde(default)]
    pub registration: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub typecode: Option<String>,
    #[serde(default)]
    pub aircraft_type: Option<String>,
    #[serde(default)]
    pub icao_aircraft_class: Option<String>,

    #[serde(default)]
    pub is_helicopter: bool,
}

impl Report {
    /// Whether this report carries a usable position, per the blender's
    /// drop rule in §4.7 step 1.
    pub fn has_position(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    pub fn position(&self) -> Option<crate::geo::LatLon> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(crate::geo::LatLon::new(lat, lon)),
            _ => None,
        }
    }
}

/// Center + radius + identity of one configured region (§3 "Region").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_miles: f64,
    pub timezone: String,
}

impl Region {
    pub fn center(&self) -> crate::geo::LatLon {
        crate::geo::LatLon::new(self.center_lat, self.center_lon)
    }

    pub fn bounding_box(&self) -> crate::geo::BoundingBox {
        crate::geo::bounding_box(self.center(), self.radius_miles)
    }
}

/// A registry entry keyed by `hex`, immutable once loaded (§3 "Registry
/// entry").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub registration: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub typecode: Option<String>,
    pub operator: Option<String>,
    pub owner: Option<String>,
    pub icao_aircraft_class: Option<String>,
}

impl RegistryEntry {
    /// True iff `icao_aircraft_class` begins with `H`/`h`. No other
    /// heuristic is used, per §3 invariants.
    pub fn is_helicopter(&self) -> bool {
        self.icao_aircraft_class
            .as_deref()
            .and_then(|s| s.chars().next())
            .map(|c| c.eq_ignore_ascii_case(&'H'))
            .unwrap_or(false)
    }
}
