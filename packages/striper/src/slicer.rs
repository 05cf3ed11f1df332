//! Slicing stage: upstream feature tuples → id-stamped stripe records.
//!
//! The upstream splitter hands over newline-delimited tuples of
//! (`ftype`, `geometry`, `properties`, `metainfo`) — see [`SliceInput`].
//! Each tuple gets its locality-sorting id assigned, is encoded as one
//! record line, and is appended to the stripe of its anchor point.
//!
//! Per-record problems (unknown ftype, bad coordinates, empty polygons,
//! unparseable lines) are skipped and logged with the offending line so
//! they can be reprocessed; only store write failures abort the stage.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::str::FromStr;

use gazetteer_model::{Feature, FeatureType, Meta};

use crate::codec::{self, RawGeometry};
use crate::store::{StoreError, StripeStore, anchor_point};

/// One upstream feature tuple, as received from the splitter.
#[derive(Debug, serde::Deserialize)]
pub struct SliceInput {
    /// Classification tag; must name a catalog [`FeatureType`].
    pub ftype: String,
    /// Discriminated geometry object.
    pub geometry: RawGeometry,
    /// Semantic tags.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Source linkage metadata.
    pub metainfo: Meta,
}

/// Counters from one slicing run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SliceStats {
    /// Records encoded and written into stripes.
    pub written: u64,
    /// Input lines skipped (logged with context).
    pub skipped: u64,
}

/// Errors that abort the slicing stage.
#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    /// Stripe write failure; partial stripes would corrupt the index.
    #[error("stripe store error: {0}")]
    Store(#[from] StoreError),

    /// Failure reading the input stream itself.
    #[error("input read error: {0}")]
    Input(#[from] std::io::Error),
}

/// Slices an upstream tuple stream into the stripe store.
///
/// # Errors
///
/// Returns an error if the input stream or a stripe write fails;
/// per-record problems are skipped, not fatal.
pub fn slice_reader(reader: impl BufRead, store: &StripeStore) -> Result<SliceStats, SliceError> {
    let mut writer = store.writer();
    let mut stats = SliceStats::default();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match slice_line(&line) {
            Ok((feature, anchor)) => {
                let encoded = match codec::encode_feature(&feature) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        log::warn!("skipping unencodable feature ({e}): {line}");
                        stats.skipped += 1;
                        continue;
                    }
                };
                let key = store.key_for(anchor.x(), anchor.y());
                writer.append(key, &encoded)?;
                stats.written += 1;
            }
            Err(reason) => {
                log::warn!("skipping input line ({reason}): {line}");
                stats.skipped += 1;
            }
        }
    }

    writer.flush()?;
    log::info!(
        "sliced {} records into stripes ({} skipped)",
        stats.written,
        stats.skipped
    );

    Ok(stats)
}

/// Builds an id-stamped feature from one input line, or a skip reason.
fn slice_line(line: &str) -> Result<(Feature, geo::Point<f64>), String> {
    let input: SliceInput =
        serde_json::from_str(line).map_err(|e| format!("unparseable tuple: {e}"))?;

    if FeatureType::from_str(&input.ftype).is_err() {
        return Err(format!("ftype `{}` not in catalog", input.ftype));
    }

    let geometry = input
        .geometry
        .to_geometry()
        .map_err(|e| format!("bad geometry: {e}"))?;

    let anchor = anchor_point(&geometry).ok_or_else(|| "geometry has no anchor".to_string())?;

    let id = codec::build_id(&input.ftype, anchor, &input.metainfo)
        .map_err(|e| format!("invalid coordinate: {e}"))?;

    Ok((
        Feature {
            id: Some(id),
            ftype: input.ftype,
            geometry,
            properties: input.properties,
            meta: input.metainfo,
        },
        anchor,
    ))
}
