#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Line-record codec and stripe store for the gazetteer index.
//!
//! Features are persisted as one self-contained GeoJSON-like object per
//! line, partitioned into "stripes": append-only files keyed by a 0.1°
//! geographic grid cell. Records number in the tens of millions, so the
//! codec avoids full structural parsing on the hot path:
//!
//! - **Encode** embeds coordinate arrays as pre-formatted text fragments
//!   (fixed 8-decimal-place, locale-independent) via
//!   [`serde_json::value::RawValue`] instead of rebuilding them through a
//!   generic serializer.
//! - **Fast-field extraction** pulls `id`, `ftype`, or `timestamp` out of
//!   a raw line with a literal pattern scan; JSON string escaping plus the
//!   encoder's fixed key order guarantee the scan agrees with a full parse
//!   for any record the encoder can produce.
//!
//! The [`slicer`] module feeds upstream feature tuples through the codec
//! into the store, assigning each feature its locality-sorting id.

pub mod codec;
pub mod slicer;
pub mod store;

pub use codec::{CodecError, RawRecord, build_id, encode_feature, parse_record};
pub use slicer::{SliceError, SliceStats, slice_reader};
pub use store::{StoreError, StripeKey, StripeStore, StripeWriter, anchor_point};
