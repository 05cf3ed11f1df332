//! Hierarchy assembly and address rendering for one address point.
//!
//! Among all containing boundaries the join keeps one representative
//! per level: smallest enclosing area wins, equal areas broken by the
//! lexicographically smallest id, so results are reproducible. A level
//! with no candidate is simply omitted from the rendered text.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use gazetteer_model::{AddrLevel, AddrLevelsSorting};
use serde::Serialize;

use crate::boundaries::BoundaryEntry;

/// A selected boundary reference at one address level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelRef {
    /// The address level this boundary fills.
    pub level: AddrLevel,
    /// Feature id of the selected boundary.
    pub id: String,
    /// Display name, when the boundary record carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One joined record: the address point plus its resolved hierarchy.
///
/// Produced per address point and handed straight to the output sink;
/// never persisted on its own.
#[derive(Debug, Serialize)]
pub struct AddressJoinResult {
    /// Id of the joined address point (the original record's id).
    pub id: String,
    /// Selected boundary references, innermost level first.
    pub boundaries: Vec<LevelRef>,
    /// Rendered address text per the configured level ordering.
    pub addr_text: String,
    /// Join-time UTC instant.
    pub timestamp: String,
}

/// Resolves the hierarchy for one address point and renders its text.
///
/// `candidates` must already be filtered to boundaries containing the
/// point. Zero candidates at every level still yields a result; partial
/// success is not an error.
#[must_use]
pub fn resolve<'a>(
    point_id: &str,
    properties: &BTreeMap<String, String>,
    candidates: impl Iterator<Item = &'a BoundaryEntry>,
    sorting: AddrLevelsSorting,
) -> AddressJoinResult {
    let mut selected: BTreeMap<AddrLevel, &BoundaryEntry> = BTreeMap::new();

    for candidate in candidates {
        match selected.get(&candidate.level) {
            Some(current) if !wins_over(candidate, *current) => {}
            _ => {
                selected.insert(candidate.level, candidate);
            }
        }
    }

    let addr_text = render_text(properties, &selected, sorting);

    let boundaries = [AddrLevel::Street, AddrLevel::City]
        .into_iter()
        .filter_map(|level| {
            selected.get(&level).map(|entry| LevelRef {
                level,
                id: entry.id.clone(),
                name: entry.name.clone(),
            })
        })
        .collect();

    AddressJoinResult {
        id: point_id.to_string(),
        boundaries,
        addr_text,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Smallest area wins; equal areas fall back to the smallest id.
fn wins_over(challenger: &BoundaryEntry, current: &BoundaryEntry) -> bool {
    match challenger.area.partial_cmp(&current.area) {
        Some(std::cmp::Ordering::Less) => true,
        Some(std::cmp::Ordering::Equal) => challenger.id < current.id,
        _ => false,
    }
}

/// Joins the levels that resolved to a value, in the configured order.
fn render_text(
    properties: &BTreeMap<String, String>,
    selected: &BTreeMap<AddrLevel, &BoundaryEntry>,
    sorting: AddrLevelsSorting,
) -> String {
    let value_for = |level: AddrLevel| -> Option<String> {
        match level {
            AddrLevel::HouseNumber => properties.get("addr:housenumber").cloned(),
            AddrLevel::Street => selected
                .get(&AddrLevel::Street)
                .and_then(|e| e.name.clone())
                .or_else(|| properties.get("addr:street").cloned()),
            AddrLevel::City => selected.get(&AddrLevel::City).and_then(|e| e.name.clone()),
        }
    };

    let parts: Vec<String> = sorting.levels().into_iter().filter_map(value_for).collect();
    parts.join(", ")
}
