//! Boundary candidate loading and the per-stripe R-tree.
//!
//! For one home stripe the join reads boundary-type records from the
//! home cell and its 8 neighbors (a polygon can straddle a cell edge
//! even though its anchor sits in only one cell), then bulk-loads them
//! into an R-tree for fast point lookups.

use std::str::FromStr;

use gazetteer_model::{AddrLevel, FeatureType};
use gazetteer_striper::codec;
use gazetteer_striper::store::{StoreError, StripeKey, StripeStore};
use geo::{Area, BoundingRect, Intersects};
use rstar::{AABB, RTree, RTreeObject};

/// A boundary polygon stored in the R-tree with its metadata.
pub struct BoundaryEntry {
    /// Feature id of the boundary record.
    pub id: String,
    /// Address level this boundary contributes.
    pub level: AddrLevel,
    /// Display name, if the record carries one.
    pub name: Option<String>,
    /// Unsigned area, the smallest-wins tie-break key.
    pub area: f64,
    envelope: AABB<[f64; 2]>,
    polygon: geo::Polygon<f64>,
}

impl BoundaryEntry {
    /// A candidate entry with its area and envelope precomputed.
    ///
    /// Returns `None` for a degenerate polygon with no bounding box.
    #[must_use]
    pub fn new(
        id: String,
        level: AddrLevel,
        name: Option<String>,
        polygon: geo::Polygon<f64>,
    ) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        Some(Self {
            id,
            level,
            name,
            area: polygon.unsigned_area(),
            envelope: AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ),
            polygon,
        })
    }

    /// Inclusive containment: a point exactly on the boundary counts as
    /// inside. Applied uniformly so re-running the join is idempotent.
    #[must_use]
    pub fn contains(&self, point: geo::Point<f64>) -> bool {
        self.polygon.intersects(&point)
    }
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Maps a record ftype to the address level it contributes, if any.
fn level_for_ftype(ftype: &str) -> Option<AddrLevel> {
    match FeatureType::from_str(ftype).ok()? {
        FeatureType::Street => Some(AddrLevel::Street),
        FeatureType::Boundary => Some(AddrLevel::City),
        FeatureType::Addr => None,
    }
}

/// Loads every boundary candidate for `home` (home cell + 8 neighbors)
/// into an R-tree.
///
/// A missing neighbor stripe reads as empty; an unreadable one is
/// demoted to a warning and its boundaries come up absent, per the
/// stripe-read failure policy. Malformed candidate lines are skipped
/// with a logged warning.
#[must_use]
pub fn load_candidates(store: &StripeStore, home: StripeKey) -> RTree<BoundaryEntry> {
    let mut entries = Vec::new();

    let mut cells = vec![home];
    cells.extend(home.neighbors());

    for cell in cells {
        match store.read_stripe(cell) {
            Ok(Some(lines)) => {
                for line in lines {
                    match line {
                        Ok(line) => {
                            if let Some(entry) = candidate_from_line(&line) {
                                entries.push(entry);
                            }
                        }
                        Err(e) => {
                            log::warn!("read error in stripe {cell}, candidates truncated: {e}");
                            break;
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(StoreError::StripeRead { path, source }) => {
                log::warn!("stripe {path} unreadable ({source}); boundaries absent for it");
            }
            Err(e) => {
                log::warn!("stripe {cell} unreadable ({e}); boundaries absent for it");
            }
        }
    }

    RTree::bulk_load(entries)
}

/// Builds a boundary entry from one record line, or `None` if the line
/// is not a usable polygon candidate (skipped with a warning when it
/// looked like one but was malformed).
fn candidate_from_line(line: &str) -> Option<BoundaryEntry> {
    // Fast-path ftype check so non-boundary records never pay for a
    // full parse.
    let ftype = match codec::extract_ftype(line) {
        Ok(ftype) => ftype,
        Err(e) => {
            log::warn!("skipping malformed candidate record: {e}");
            return None;
        }
    };
    let level = level_for_ftype(ftype)?;

    let record = match codec::parse_record(line) {
        Ok(record) => record,
        Err(e) => {
            log::warn!("skipping unparseable candidate record ({e}): {line}");
            return None;
        }
    };

    let geometry = match record.geometry() {
        Ok(geometry) => geometry,
        Err(e) => {
            log::warn!(
                "skipping candidate {} with bad geometry: {e}",
                record.id.as_deref().unwrap_or("<no id>")
            );
            return None;
        }
    };

    let geo::Geometry::Polygon(polygon) = geometry else {
        // Boundary levels join against polygons only.
        return None;
    };

    let id = record.id.unwrap_or_else(|| "<no id>".to_string());
    let name = record.properties.get("name").cloned();

    BoundaryEntry::new(id, level, name, polygon)
}

/// Boundaries containing `point`, found via envelope pre-filter plus
/// the inclusive containment test.
pub fn containing<'a>(
    tree: &'a RTree<BoundaryEntry>,
    point: geo::Point<f64>,
) -> impl Iterator<Item = &'a BoundaryEntry> {
    let probe = AABB::from_point([point.x(), point.y()]);
    tree.locate_in_envelope_intersecting(&probe)
        .filter(move |entry| entry.contains(point))
}
