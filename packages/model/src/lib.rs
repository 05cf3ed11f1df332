#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the gazetteer index pipeline.
//!
//! This crate contains only data types, the feature-type catalog, and the
//! address-ordering configuration. It has no I/O and no heavyweight
//! dependencies beyond `geo` for the geometry payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Grid step (in degrees) used to key stripes in the reference setup.
///
/// Each stripe covers a 0.1° × 0.1° cell; the upstream splitter may
/// override this when it supplies features at a different density.
pub const DEFAULT_GRID_STEP: f64 = 0.1;

/// The geometry kind a feature was derived from.
///
/// Serialized inside `metainfo` and contributes one character to the
/// feature id, so the mapping must stay stable across runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
pub enum GeometryKind {
    /// A single coordinate.
    Point,
    /// An open sequence of coordinates.
    LineString,
    /// A closed exterior ring plus zero or more holes.
    Polygon,
}

impl GeometryKind {
    /// Single-character tag used in feature ids.
    ///
    /// `Polygon` gets `'G'` rather than its first letter so that every
    /// kind char stays unique (`Point` already owns `'P'`).
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Point => 'P',
            Self::LineString => 'L',
            Self::Polygon => 'G',
        }
    }

    /// Classifies a `geo` geometry into its kind, if it is one of the
    /// three kinds the pipeline stores.
    #[must_use]
    pub fn of(geometry: &geo::Geometry<f64>) -> Option<Self> {
        match geometry {
            geo::Geometry::Point(_) => Some(Self::Point),
            geo::Geometry::LineString(_) => Some(Self::LineString),
            geo::Geometry::Polygon(_) => Some(Self::Polygon),
            _ => None,
        }
    }
}

/// Auxiliary metadata carried by every encoded record.
///
/// Links a derived feature back to the source entity it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Originating geometry kind.
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    /// Numeric id of the source entity.
    #[serde(rename = "id")]
    pub source_id: i64,
    /// Disambiguates multiple features derived from one source entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<i64>,
}

impl Meta {
    /// Metadata with no counter.
    #[must_use]
    pub const fn new(kind: GeometryKind, source_id: i64) -> Self {
        Self {
            kind,
            source_id,
            counter: None,
        }
    }
}

/// The atomic indexed entity: one geometry plus its semantic tags.
///
/// Features are created once by the encoder and never mutated in place;
/// a join produces a new record referencing the original's id.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Globally unique id, `None` until assigned at encode time.
    pub id: Option<String>,
    /// Classification tag from the upstream catalog (e.g. `"addr"`).
    pub ftype: String,
    /// Point, line, or polygon payload.
    pub geometry: geo::Geometry<f64>,
    /// Semantic tags, unordered, keys unique.
    pub properties: BTreeMap<String, String>,
    /// Source linkage metadata.
    pub meta: Meta,
}

/// The fixed catalog of feature types the pipeline recognizes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeatureType {
    /// An addressable point (house number + street tags).
    Addr,
    /// A street polygon (buffered highway geometry).
    Street,
    /// An administrative / locality boundary polygon.
    Boundary,
}

/// One level of the address hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AddrLevel {
    /// The house number of the address point itself.
    HouseNumber,
    /// The enclosing street.
    Street,
    /// The enclosing city or locality.
    City,
}

/// Token order used when rendering a joined address as text.
///
/// Set once at process start and passed into the join configuration;
/// core code never reads it as ambient global state.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AddrLevelsSorting {
    /// house number, street, city
    #[default]
    HnStreetCity,
    /// street, house number, city
    StreetHnCity,
    /// city, street, house number
    CityStreetHn,
}

impl AddrLevelsSorting {
    /// The three address levels in this sorting's render order.
    #[must_use]
    pub const fn levels(self) -> [AddrLevel; 3] {
        match self {
            Self::HnStreetCity => [AddrLevel::HouseNumber, AddrLevel::Street, AddrLevel::City],
            Self::StreetHnCity => [AddrLevel::Street, AddrLevel::HouseNumber, AddrLevel::City],
            Self::CityStreetHn => [AddrLevel::City, AddrLevel::Street, AddrLevel::HouseNumber],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn kind_chars_are_unique() {
        let chars = [
            GeometryKind::Point.as_char(),
            GeometryKind::LineString.as_char(),
            GeometryKind::Polygon.as_char(),
        ];
        assert_eq!(chars, ['P', 'L', 'G']);
    }

    #[test]
    fn sorting_parses_cli_names() {
        assert_eq!(
            AddrLevelsSorting::from_str("HN_STREET_CITY").unwrap(),
            AddrLevelsSorting::HnStreetCity
        );
        assert_eq!(
            AddrLevelsSorting::from_str("STREET_HN_CITY").unwrap(),
            AddrLevelsSorting::StreetHnCity
        );
        assert_eq!(
            AddrLevelsSorting::from_str("CITY_STREET_HN").unwrap(),
            AddrLevelsSorting::CityStreetHn
        );
    }

    #[test]
    fn sorting_orders_levels() {
        assert_eq!(
            AddrLevelsSorting::StreetHnCity.levels(),
            [AddrLevel::Street, AddrLevel::HouseNumber, AddrLevel::City]
        );
    }

    #[test]
    fn feature_type_round_trips() {
        assert_eq!(FeatureType::from_str("addr").unwrap(), FeatureType::Addr);
        assert_eq!(FeatureType::Boundary.as_ref(), "boundary");
    }

    #[test]
    fn meta_counter_skipped_when_absent() {
        let meta = Meta::new(GeometryKind::Point, 42);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"type":"Point","id":42}"#);
    }
}
