//! Feature ⇄ line-record codec.
//!
//! One record is one compact JSON object per line:
//!
//! ```json
//! {"id":"...","ftype":"addr","type":"Feature","geometry":{...},
//!  "properties":{...},"metainfo":{...},"timestamp":"..."}
//! ```
//!
//! Key order is fixed by struct declaration order, and every string value
//! is JSON-escaped, so a field pattern such as `"timestamp":"` inside a
//! *value* is always escaped away. Property **keys** are emitted verbatim
//! though, so a property named like a record field produces the same byte
//! pattern mid-line. The fast extractors below therefore lean on the key
//! order: `id` is the first key when assigned, `ftype` precedes
//! `properties`, and `timestamp` is the last key. The round-trip tests
//! pin extraction against the full parser, shadowing keys included.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use gazetteer_hash::HashError;
use gazetteer_model::{Feature, GeometryKind, Meta};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

const ID_PATTERN: &str = "\"id\":\"";
const FTYPE_PATTERN: &str = "\"ftype\":\"";
const TIMESTAMP_PATTERN: &str = "\"timestamp\":\"";

/// Errors from encoding, parsing, or fast-field extraction.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Fast-path extraction found no matching field pattern.
    #[error("no `{field}` pattern in record line: {line}")]
    MalformedRecord {
        /// The field whose pattern was missing.
        field: &'static str,
        /// The offending line, kept for skip-and-log reprocessing.
        line: String,
    },

    /// A polygon with zero rings cannot be stored.
    #[error("polygon has no rings")]
    EmptyGeometry,

    /// Geometry kind the pipeline does not store.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(&'static str),

    /// A timestamp field that does not parse as an RFC 3339 instant.
    #[error("bad timestamp `{value}` in record line")]
    BadTimestamp {
        /// The unparseable timestamp text.
        value: String,
    },

    /// Structural JSON error from the full parser.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    ftype: &'a str,
    #[serde(rename = "type")]
    record_type: &'static str,
    geometry: GeometryOut,
    properties: &'a BTreeMap<String, String>,
    metainfo: &'a Meta,
    timestamp: String,
}

#[derive(Serialize)]
struct GeometryOut {
    #[serde(rename = "type")]
    kind: GeometryKind,
    coordinates: Box<RawValue>,
}

/// A fully parsed record line (the slow path).
///
/// `coordinates` stays a raw fragment until [`RawRecord::geometry`] is
/// called, so candidate filtering by `ftype` never pays for coordinate
/// parsing.
#[derive(Debug, Deserialize)]
pub struct RawRecord {
    /// Feature id, absent only for records written before id assignment.
    #[serde(default)]
    pub id: Option<String>,
    /// Feature classification tag.
    pub ftype: String,
    /// Always `"Feature"`.
    #[serde(rename = "type")]
    pub record_type: String,
    /// Discriminated geometry object.
    pub geometry: RawGeometry,
    /// Semantic tags.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Source linkage metadata.
    pub metainfo: Meta,
    /// Encode-time RFC 3339 instant.
    pub timestamp: String,
}

/// The `geometry` member of a parsed record.
#[derive(Debug, Deserialize)]
pub struct RawGeometry {
    /// Geometry discriminator.
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    /// Coordinate payload, kept as the raw emitted fragment.
    pub coordinates: Box<RawValue>,
}

impl RawRecord {
    /// Reconstructs the typed geometry from the raw coordinate fragment.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EmptyGeometry`] for a polygon with zero
    /// rings, or [`CodecError::Json`] if the fragment does not match the
    /// declared geometry type.
    pub fn geometry(&self) -> Result<geo::Geometry<f64>, CodecError> {
        self.geometry.to_geometry()
    }

    /// Converts the parsed record back into a [`Feature`].
    ///
    /// # Errors
    ///
    /// Returns an error if the geometry fragment cannot be reconstructed.
    pub fn to_feature(&self) -> Result<Feature, CodecError> {
        Ok(Feature {
            id: self.id.clone(),
            ftype: self.ftype.clone(),
            geometry: self.geometry()?,
            properties: self.properties.clone(),
            meta: self.metainfo.clone(),
        })
    }
}

impl RawGeometry {
    /// Reconstructs a typed `geo` geometry value.
    ///
    /// Ring 0 of a polygon is the exterior; the rest are holes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::EmptyGeometry`] for a polygon with zero
    /// rings, or [`CodecError::Json`] on a malformed fragment.
    pub fn to_geometry(&self) -> Result<geo::Geometry<f64>, CodecError> {
        let fragment = self.coordinates.get();
        match self.kind {
            GeometryKind::Point => {
                let [x, y]: [f64; 2] = serde_json::from_str(fragment)?;
                Ok(geo::Point::new(x, y).into())
            }
            GeometryKind::LineString => {
                let coords: Vec<[f64; 2]> = serde_json::from_str(fragment)?;
                Ok(line_from_pairs(&coords).into())
            }
            GeometryKind::Polygon => {
                let rings: Vec<Vec<[f64; 2]>> = serde_json::from_str(fragment)?;
                let mut rings = rings.into_iter().map(|r| line_from_pairs(&r));
                let exterior = rings.next().ok_or(CodecError::EmptyGeometry)?;
                Ok(geo::Polygon::new(exterior, rings.collect()).into())
            }
        }
    }
}

fn line_from_pairs(pairs: &[[f64; 2]]) -> geo::LineString<f64> {
    geo::LineString::from(
        pairs
            .iter()
            .map(|[x, y]| (*x, *y))
            .collect::<Vec<(f64, f64)>>(),
    )
}

/// Encodes a feature as one self-contained record line.
///
/// The timestamp is the encode-time UTC instant, not the source edit
/// time. Coordinates are emitted with fixed 8-decimal-place formatting.
///
/// # Errors
///
/// Returns [`CodecError::EmptyGeometry`] for a polygon with no exterior
/// vertices, [`CodecError::UnsupportedGeometry`] for geometry kinds the
/// pipeline does not store, or [`CodecError::Json`] if serialization
/// fails.
pub fn encode_feature(feature: &Feature) -> Result<String, CodecError> {
    let (kind, fragment) = geometry_fragment(&feature.geometry)?;

    let record = RecordOut {
        id: feature.id.as_deref(),
        ftype: &feature.ftype,
        record_type: "Feature",
        geometry: GeometryOut {
            kind,
            coordinates: RawValue::from_string(fragment)?,
        },
        properties: &feature.properties,
        metainfo: &feature.meta,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    Ok(serde_json::to_string(&record)?)
}

/// Fully parses one record line (the fallback for the fast extractors).
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the line is not a structurally valid
/// record.
pub fn parse_record(line: &str) -> Result<RawRecord, CodecError> {
    Ok(serde_json::from_str(line)?)
}

/// Extracts the `id` field without parsing the record.
///
/// An assigned id is always the record's *first* key, so the pattern
/// must sit at the start of the line; a property key named `id` further
/// along must not match, and an id-less record is reported as such.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] if the record carries no id;
/// callers fall back to [`parse_record`] or skip the line.
pub fn extract_id(line: &str) -> Result<&str, CodecError> {
    if !line.starts_with('{') || !line[1..].starts_with(ID_PATTERN) {
        return Err(malformed("id", line));
    }
    field_value(line, 1 + ID_PATTERN.len(), "id")
}

/// Extracts the `ftype` field without parsing the record.
///
/// The real `ftype` key precedes `properties`, so the first match is
/// always the record field, never a property key of the same name.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] if the ftype pattern is absent.
pub fn extract_ftype(line: &str) -> Result<&str, CodecError> {
    let begin = line
        .find(FTYPE_PATTERN)
        .ok_or_else(|| malformed("ftype", line))?
        + FTYPE_PATTERN.len();
    field_value(line, begin, "ftype")
}

/// Extracts and parses the `timestamp` field without parsing the record.
///
/// The real `timestamp` is the record's *last* key, after `properties`,
/// so the last match is taken; a property key named `timestamp` sits
/// earlier in the line and never shadows it.
///
/// # Errors
///
/// Returns [`CodecError::MalformedRecord`] if the timestamp pattern is
/// absent, or [`CodecError::BadTimestamp`] if it does not parse as an
/// RFC 3339 instant.
pub fn extract_timestamp(line: &str) -> Result<DateTime<Utc>, CodecError> {
    let begin = line
        .rfind(TIMESTAMP_PATTERN)
        .ok_or_else(|| malformed("timestamp", line))?
        + TIMESTAMP_PATTERN.len();
    let value = field_value(line, begin, "timestamp")?;
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| CodecError::BadTimestamp {
            value: value.to_string(),
        })
}

/// Slices from `begin` to the next `"` (the field's closing quote).
fn field_value<'a>(line: &'a str, begin: usize, field: &'static str) -> Result<&'a str, CodecError> {
    let end = line[begin..]
        .find('"')
        .ok_or_else(|| malformed(field, line))?
        + begin;
    Ok(&line[begin..end])
}

fn malformed(field: &'static str, line: &str) -> CodecError {
    CodecError::MalformedRecord {
        field,
        line: line.to_string(),
    }
}

/// Builds the locality-sorting feature id:
/// `<ftype>-<10-digit hash>-<kindchar><source_id>[-<counter>]`.
///
/// Lexicographic sort of ids within a stripe approximates spatial
/// locality because the zero-padded hash dominates the comparison.
///
/// # Errors
///
/// Returns [`HashError::InvalidCoordinate`] if the point is outside the
/// valid WGS84 range.
pub fn build_id(ftype: &str, point: geo::Point<f64>, meta: &Meta) -> Result<String, HashError> {
    let hash = gazetteer_hash::encode(point.x(), point.y())?;

    let mut id = format!("{ftype}-{hash:010}-{}{}", meta.kind.as_char(), meta.source_id);
    if let Some(counter) = meta.counter {
        if counter >= 0 {
            let _ = write!(id, "-{counter}");
        }
    }

    Ok(id)
}

fn geometry_fragment(geometry: &geo::Geometry<f64>) -> Result<(GeometryKind, String), CodecError> {
    match geometry {
        geo::Geometry::Point(p) => Ok((GeometryKind::Point, point_fragment(*p))),
        geo::Geometry::LineString(ls) => Ok((GeometryKind::LineString, ring_fragment(ls))),
        geo::Geometry::Polygon(poly) => {
            if poly.exterior().0.is_empty() {
                return Err(CodecError::EmptyGeometry);
            }
            Ok((GeometryKind::Polygon, polygon_fragment(poly)))
        }
        other => Err(CodecError::UnsupportedGeometry(geometry_name(other))),
    }
}

const fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

fn point_fragment(point: geo::Point<f64>) -> String {
    format!("[{:.8},{:.8}]", point.x(), point.y())
}

fn ring_fragment(line: &geo::LineString<f64>) -> String {
    let mut out = String::with_capacity(line.0.len() * 24);
    out.push('[');
    for (i, coord) in line.0.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "[{:.8},{:.8}]", coord.x, coord.y);
    }
    out.push(']');
    out
}

fn polygon_fragment(polygon: &geo::Polygon<f64>) -> String {
    let mut out = String::from("[");
    out.push_str(&ring_fragment(polygon.exterior()));
    for hole in polygon.interiors() {
        out.push(',');
        out.push_str(&ring_fragment(hole));
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_feature(x: f64, y: f64) -> Feature {
        let mut properties = BTreeMap::new();
        properties.insert("addr:housenumber".to_string(), "15".to_string());

        Feature {
            id: None,
            ftype: "addr".to_string(),
            geometry: geo::Point::new(x, y).into(),
            properties,
            meta: Meta::new(GeometryKind::Point, 42),
        }
    }

    fn square(min: f64, max: f64) -> geo::Polygon<f64> {
        geo::Polygon::new(
            geo::LineString::from(vec![
                (min, min),
                (max, min),
                (max, max),
                (min, max),
                (min, min),
            ]),
            vec![],
        )
    }

    #[test]
    fn encodes_point_with_fixed_decimals() {
        let mut feature = point_feature(30.5234, 50.4501);
        feature.id = Some(build_id("addr", geo::Point::new(30.5234, 50.4501), &feature.meta).unwrap());

        let line = encode_feature(&feature).unwrap();
        assert!(line.contains("\"coordinates\":[30.52340000,50.45010000]"));
        assert!(line.contains("\"type\":\"Feature\""));
        assert!(line.contains("\"ftype\":\"addr\""));
    }

    #[test]
    fn id_matches_grammar_for_point_source() {
        let point = geo::Point::new(30.5234, 50.4501);
        let meta = Meta::new(GeometryKind::Point, 42);

        let hash = gazetteer_hash::encode(30.5234, 50.4501).unwrap();
        let id = build_id("addr", point, &meta).unwrap();

        assert_eq!(id, format!("addr-{hash:010}-P42"));
    }

    #[test]
    fn id_appends_counter_when_present() {
        let meta = Meta {
            kind: GeometryKind::Polygon,
            source_id: 7,
            counter: Some(3),
        };
        let id = build_id("boundary", geo::Point::new(0.0, 0.0), &meta).unwrap();

        assert!(id.starts_with("boundary-"));
        assert!(id.ends_with("-G7-3"));
    }

    #[test]
    fn fast_extraction_matches_full_parse() {
        let mut feature = point_feature(30.5234, 50.4501);
        feature.id = Some("addr-0000000001-P42".to_string());
        let line = encode_feature(&feature).unwrap();

        let parsed = parse_record(&line).unwrap();
        assert_eq!(extract_id(&line).unwrap(), parsed.id.as_deref().unwrap());
        assert_eq!(extract_ftype(&line).unwrap(), parsed.ftype);
        assert_eq!(
            extract_timestamp(&line).unwrap(),
            DateTime::parse_from_rfc3339(&parsed.timestamp).unwrap()
        );
    }

    #[test]
    fn fast_extraction_is_not_fooled_by_property_values() {
        // A property value containing the literal pattern text is escaped
        // on encode, so the scan still lands on the real keys.
        let mut feature = point_feature(1.0, 2.0);
        feature.id = Some("addr-0000000001-P42".to_string());
        feature.properties.insert(
            "note".to_string(),
            "contains \"ftype\":\"bogus\" and \"timestamp\":\"bogus\"".to_string(),
        );

        let line = encode_feature(&feature).unwrap();
        assert_eq!(extract_ftype(&line).unwrap(), "addr");
        assert!(extract_timestamp(&line).is_ok());
    }

    #[test]
    fn property_keys_named_like_record_fields_do_not_shadow() {
        // Property keys are emitted verbatim, so a property named
        // `timestamp` puts the literal pattern earlier in the line than
        // the real field. Extraction must still agree with a full parse.
        let mut feature = point_feature(1.0, 2.0);
        feature.id = Some("addr-0000000001-P42".to_string());
        feature
            .properties
            .insert("id".to_string(), "bogus".to_string());
        feature
            .properties
            .insert("ftype".to_string(), "bogus".to_string());
        feature
            .properties
            .insert("timestamp".to_string(), "1999-01-01T00:00:00Z".to_string());

        let line = encode_feature(&feature).unwrap();
        let parsed = parse_record(&line).unwrap();

        assert_eq!(extract_id(&line).unwrap(), "addr-0000000001-P42");
        assert_eq!(extract_ftype(&line).unwrap(), "addr");
        assert_eq!(
            extract_timestamp(&line).unwrap(),
            DateTime::parse_from_rfc3339(&parsed.timestamp).unwrap()
        );
    }

    #[test]
    fn id_extraction_reports_idless_record_despite_id_property() {
        let mut feature = point_feature(1.0, 2.0);
        feature
            .properties
            .insert("id".to_string(), "bogus".to_string());

        let line = encode_feature(&feature).unwrap();
        assert!(matches!(
            extract_id(&line).unwrap_err(),
            CodecError::MalformedRecord { field: "id", .. }
        ));
    }

    #[test]
    fn extraction_fails_on_foreign_line() {
        let err = extract_id("{\"not\":\"a record\"}").unwrap_err();
        assert!(matches!(err, CodecError::MalformedRecord { field: "id", .. }));
    }

    #[test]
    fn polygon_round_trips_byte_identical_fragment() {
        let polygon = square(10.0, 10.5);
        let feature = Feature {
            id: Some("boundary-0000000001-G7".to_string()),
            ftype: "boundary".to_string(),
            geometry: polygon.into(),
            properties: BTreeMap::new(),
            meta: Meta::new(GeometryKind::Polygon, 7),
        };

        let line = encode_feature(&feature).unwrap();
        let parsed = parse_record(&line).unwrap();
        let reencoded = encode_feature(&parsed.to_feature().unwrap()).unwrap();

        let fragment = parsed.geometry.coordinates.get();
        assert!(line.contains(fragment));
        assert!(reencoded.contains(fragment));
    }

    #[test]
    fn sub_resolution_perturbation_does_not_change_formatted_digits() {
        // 1e-9° sits below the 8-decimal output resolution.
        let a = point_fragment(geo::Point::new(30.523_400_0, 50.450_100_0));
        let b = point_fragment(geo::Point::new(30.523_400_001, 50.450_100_0));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_polygon_with_no_rings() {
        let raw = RawGeometry {
            kind: GeometryKind::Polygon,
            coordinates: RawValue::from_string("[]".to_string()).unwrap(),
        };
        assert!(matches!(
            raw.to_geometry(),
            Err(CodecError::EmptyGeometry)
        ));
    }

    #[test]
    fn reconstructs_polygon_with_hole() {
        let raw = RawGeometry {
            kind: GeometryKind::Polygon,
            coordinates: RawValue::from_string(
                "[[[0.0,0.0],[10.0,0.0],[10.0,10.0],[0.0,10.0],[0.0,0.0]],\
                 [[4.0,4.0],[6.0,4.0],[6.0,6.0],[4.0,6.0],[4.0,4.0]]]"
                    .to_string(),
            )
            .unwrap(),
        };

        let geo::Geometry::Polygon(polygon) = raw.to_geometry().unwrap() else {
            panic!("expected polygon");
        };
        assert_eq!(polygon.exterior().0.len(), 5);
        assert_eq!(polygon.interiors().len(), 1);
    }
}
