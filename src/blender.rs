//! Blender (C7): merges per-source report lists into one region snapshot.
//!
//! Pure function, grounded on the teacher's `Flight`/`FlightState` handling
//! in `flights.rs` for the notion of picking a single winning observation
//! per aircraft, generalized here into an explicit priority/tie-break chain
//! per §4.7.

use std::collections::HashMap;

use crate::geo::BoundingBox;
use crate::report::{DataSource, Hex, Report};

/// One source's contribution for a cycle: its reports plus the priority
/// class that source carries (§4.7 input shape).
pub struct SourceContribution {
    pub source_id: String,
    pub priority: u8,
    pub reports: Vec<Report>,
}

/// Blend a cycle's contributions into one sorted, deduplicated list.
///
/// `tolerance_deg` is the bounding-box clip tolerance (§4.7 step 2); pass
/// `0.0` for an exact clip.
pub fn blend(
    contributions: Vec<SourceContribution>,
    bbox: BoundingBox,
    region_center: crate::geo::LatLon,
    tolerance_deg: f64,
) -> Vec<Report> {
    let mut groups: HashMap<Hex, Vec<(u8, Report)>> = HashMap::new();

    for contribution in contributions {
        for mut report in contribution.reports {
            // Step 1: drop invalid hex (already enforced by `Hex::parse` at
            // ingestion) or missing position.
            if !report.has_position() {
                continue;
            }

            let point = report.position().unwrap();

            // Step 2: clip to bounding box, compute distance to center.
            if !bbox.contains_with_tolerance(point, tolerance_deg) {
                continue;
            }
            report.distance_miles = Some(crate::geo::distance_miles(region_center, point));

            groups
                .entry(report.hex.clone())
                .or_default()
                .push((contribution.priority, report));
        }
    }

    let mut output: Vec<Report> = groups
        .into_values()
        .map(|mut candidates| {
            // Step 3: winner selection. Highest priority, then smaller
            // `seen`, then larger `messages`, then lexicographically
            // smaller source id.
            candidates.sort_by(|(pa, ra), (pb, rb)| {
                pb.cmp(pa)
                    .then_with(|| {
                        let sa = ra.seen.unwrap_or(f64::INFINITY);
                        let sb = rb.seen.unwrap_or(f64::INFINITY);
                        sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| {
                        let ma = ra.messages.unwrap_or(0);
                        let mb = rb.messages.unwrap_or(0);
                        mb.cmp(&ma)
                    })
                    .then_with(|| ra.data_source.source_id().cmp(&rb.data_source.source_id()))
            });

            let distinct_count: usize = candidates
                .iter()
                .map(|(_, r)| r.data_source.source_id())
                .collect::<std::collections::HashSet<_>>()
                .len();

            let (_, mut winner) = candidates.into_iter().next().unwrap();

            // Step 4: mark blended when >= 2 distinct sources contributed.
            if distinct_count >= 2 {
                winner.data_source = DataSource::Blended;
            }

            // Step 5: kinematic fields already copied verbatim from the
            // winner (no field-level blending); rssi/messages already only
            // present if the winner had them.
            winner
        })
        .collect();

    // Step 6: sort by distance ascending, tie-break by hex ascending.
    output.sort_by(|a, b| {
        let da = a.distance_miles.unwrap_or(f64::INFINITY);
        let db = b.distance_miles.unwrap_or(f64::INFINITY);
        da.partial_cmp(&db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.hex.cmp(&b.hex))
    });

    output
}
