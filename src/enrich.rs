//! Enricher + classifier (C8): joins the blended list against the registry
//! and derives the helicopter subset.

use crate::registry::Registry;
use crate::report::Report;

/// Result of enrichment: the full blended list (now registry-joined) and
/// the `is_helicopter = true` subset, preserving blended order (§4.8).
pub struct EnrichedCycle {
    pub flights: Vec<Report>,
    pub choppers: Vec<Report>,
}

pub fn enrich(registry: &Registry, blended: Vec<Report>) -> EnrichedCycle {
    let hexes: Vec<_> = blended.iter().map(|r| r.hex.clone()).collect();
    let entries = registry.batch_lookup(&hexes);

    let flights: Vec<Report> = blended
        .into_iter()
        .map(|mut report| {
            if let Some(Some(entry)) = entries.get(&report.hex) {
                report.registration = entry.registration.clone();
                report.manufacturer = entry.manufacturer.clone();
                report.model = entry.model.clone();
                report.typecode = entry.typecode.clone();
                report.operator = entry.operator.clone();
                report.owner = entry.owner.clone();
                report.icao_aircraft_class = entry.icao_aircraft_class.clone();
                report.is_helicopter = entry.is_helicopter();
            } else {
                report.is_helicopter = false;
            }
            report
        })
        .collect();

    let choppers = flights.iter().filter(|r| r.is_helicopter).cloned().collect();

    EnrichedCycle { flights, choppers }
}
