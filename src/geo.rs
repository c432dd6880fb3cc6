//! Great-circle distance and bounding-box geometry (C1).
//!
//! Grounded on the haversine implementation in `flights.rs` of the teacher
//! repo, adapted to statute miles (the spec's unit) and generalized into a
//! small reusable `LatLon` type plus a `bounding_box` helper.

/// A point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Mean earth radius in statute miles, per §4.1.
const EARTH_RADIUS_MILES: f64 = 3958.7613;

/// Great-circle distance between two points, in statute miles.
///
/// Deterministic to better than 1e-6 mi for well-conditioned inputs.
pub fn distance_miles(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().clamp(0.0, 1.0).asin();

    EARTH_RADIUS_MILES * c
}

/// A bounding box as `(lamin, lomin, lamax, lomax)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lomin: f64,
    pub lamax: f64,
    pub lomax: f64,
}

impl BoundingBox {
    /// The full globe, used as the degenerate-input clamp.
    pub fn full_globe() -> Self {
        Self {
            lamin: -90.0,
            lomin: -180.0,
            lamax: 90.0,
            lomax: 180.0,
        }
    }

    /// Whether `point` lies inside the box, widened by `tolerance_deg` on
    /// every side (used by the blender's freshness/clip check in §4.7).
    pub fn contains_with_tolerance(&self, point: LatLon, tolerance_deg: f64) -> bool {
        point.lat >= self.lamin - tolerance_deg
            && point.lat <= self.lamax + tolerance_deg
            && point.lon >= self.lomin - tolerance_deg
            && point.lon <= self.lomax + tolerance_deg
    }

    /// Area in square degrees, used by the wide-area credit-cost estimator
    /// (§4.5).
    pub fn area_deg2(&self) -> f64 {
        (self.lamax - self.lamin).max(0.0) * (self.lomax - self.lomin).max(0.0)
    }
}

/// Derive a region's bounding box from its center and radius, widened by a
/// 2% safety margin, per §3 "Region" and §4.1.
///
/// Degenerate inputs (poles, `radius_miles` covering >= 90 degrees of
/// latitude) clamp to the full globe.
pub fn bounding_box(center: LatLon, radius_miles: f64) -> BoundingBox {
    const MARGIN: f64 = 1.02;
    const MILES_PER_DEGREE_LAT: f64 = 69.0;

    // 90 degrees of latitude is ~90 * 69 miles; beyond that (or at a pole)
    // there's no meaningful box left to compute.
    if radius_miles >= 90.0 * MILES_PER_DEGREE_LAT || center.lat.abs() >= 90.0 {
        return BoundingBox::full_globe();
    }

    let dlat = (radius_miles / MILES_PER_DEGREE_LAT) * MARGIN;

    let cos_lat = center.lat.to_radians().cos();
    // Near the poles cos(lat) collapses toward zero and the longitude span
    // blows up; once it would exceed a half-turn, clamp to the full globe.
    if cos_lat.abs() < 1e-6 {
        return BoundingBox::full_globe();
    }
    let dlon = (radius_miles / (MILES_PER_DEGREE_LAT * cos_lat)) * MARGIN;

    let lamin = (center.lat - dlat).max(-90.0);
    let lamax = (center.lat + dlat).min(90.0);
    let lomin = center.lon - dlon;
    let lomax = center.lon + dlon;

    if lomax - lomin >= 360.0 {
        BoundingBox {
            lamin,
            lomin: -180.0,
            lamax,
            lomax: 180.0,
        }
    } else {
        BoundingBox {
            lamin,
            lomin,
            lamax,
            lomax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn distance_zero_for_identical_points() {
        let p = LatLon::new(32.3513, -95.3011);
        assert!(distance_miles(p, p) < 1e-9);
    }

    #[test]
    fn distance_matches_known_value() {
        // Tyler, TX to a point ~0.05 deg north, similar to S1 in spec.md.
        let center = LatLon::new(32.3513, -95.3011);
        let point = LatLon::new(32.4, -95.3);
        let d = distance_miles(center, point);
        assert!((d - 3.38).abs() < 0.05, "got {d}");
    }

    #[test]
    fn bounding_box_widens_by_two_percent() {
        let bbox = bounding_box(LatLon::new(0.0, 0.0), 69.0);
        // 1 degree of latitude at the equator, widened 2%.
        assert!((bbox.lamax - 1.02).abs() < 1e-6);
        assert!((bbox.lamin + 1.02).abs() < 1e-6);
    }

    /// Degenerate inputs (a radius spanning the whole globe, or a pole
    /// center) both clamp to the full-globe box.
    #[rstest]
    #[case(LatLon::new(32.0, -95.0), 90.0 * 69.0)]
    #[case(LatLon::new(90.0, 0.0), 50.0)]
    fn degenerate_input_clips_to_globe(#[case] center: LatLon, #[case] radius_miles: f64) {
        let bbox = bounding_box(center, radius_miles);
        assert_eq!(bbox, BoundingBox::full_globe());
    }

    #[test]
    fn point_exactly_on_boundary_is_contained() {
        let bbox = bounding_box(LatLon::new(32.3513, -95.3011), 150.0);
        assert!(bbox.contains_with_tolerance(LatLon::new(bbox.lamax, bbox.lomin), 0.0));
    }

    #[test]
    fn point_strictly_outside_is_rejected() {
        let bbox = bounding_box(LatLon::new(32.3513, -95.3011), 150.0);
        let outside = LatLon::new(bbox.lamax + 1.0, bbox.lomin);
        assert!(!bbox.contains_with_tolerance(outside, 0.0));
    }
}
