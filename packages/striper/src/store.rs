//! Stripe store: append-only record files keyed by geographic grid cell.
//!
//! A stripe is one file named `stripe_<x>_<y>.gjson` where `x`/`y` are
//! the feature's anchor longitude/latitude floored to the grid step
//! (0.1° by default). Stripes are independent files with no shared
//! mutable state, so the join can process them in parallel.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

/// Errors from stripe storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error on the store directory or a stripe write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stripe file exists but cannot be read.
    #[error("cannot read stripe {path}: {source}")]
    StripeRead {
        /// Path of the unreadable stripe file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Key of one geographic grid cell.
///
/// Two keys are adjacent when they differ by one step in either axis;
/// a polygon whose anchor sits in one cell may still overlap any of the
/// 8 neighbors, which is why the join reads neighbors too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StripeKey {
    /// Longitude cell index (floor(lon / step)).
    pub x: i32,
    /// Latitude cell index (floor(lat / step)).
    pub y: i32,
}

impl StripeKey {
    /// Keys a coordinate into its grid cell.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_point(lon: f64, lat: f64, step: f64) -> Self {
        Self {
            x: (lon / step).floor() as i32,
            y: (lat / step).floor() as i32,
        }
    }

    /// The 8 geographically adjacent cell keys.
    #[must_use]
    pub const fn neighbors(self) -> [Self; 8] {
        let Self { x, y } = self;
        [
            Self { x: x - 1, y: y - 1 },
            Self { x: x - 1, y },
            Self { x: x - 1, y: y + 1 },
            Self { x, y: y - 1 },
            Self { x, y: y + 1 },
            Self { x: x + 1, y: y - 1 },
            Self { x: x + 1, y },
            Self { x: x + 1, y: y + 1 },
        ]
    }

    /// File name of this stripe inside the store directory.
    #[must_use]
    pub fn file_name(self) -> String {
        format!("stripe_{}_{}.gjson", self.x, self.y)
    }

    /// Parses a stripe file name back into its key.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let body = name.strip_prefix("stripe_")?.strip_suffix(".gjson")?;
        let (x, y) = body.split_once('_')?;
        Some(Self {
            x: x.parse().ok()?,
            y: y.parse().ok()?,
        })
    }
}

impl std::fmt::Display for StripeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

/// Directory of stripe files plus the grid step that keys them.
pub struct StripeStore {
    dir: PathBuf,
    step: f64,
}

impl StripeStore {
    /// Opens (creating if needed) a stripe store at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>, step: f64) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, step })
    }

    /// The grid step (degrees) this store was keyed with.
    #[must_use]
    pub const fn grid_step(&self) -> f64 {
        self.step
    }

    /// Keys a coordinate into its stripe.
    #[must_use]
    pub fn key_for(&self, lon: f64, lat: f64) -> StripeKey {
        StripeKey::from_point(lon, lat, self.step)
    }

    /// A writer that appends records across stripes, caching one file
    /// handle per touched stripe. Single-owner: the slicing stage is
    /// sequential, parallelism happens between join workers on the read
    /// side.
    #[must_use]
    pub fn writer(&self) -> StripeWriter<'_> {
        StripeWriter {
            store: self,
            writers: HashMap::new(),
        }
    }

    /// Streams one stripe's record lines in file order.
    ///
    /// Returns `Ok(None)` when the stripe has no file (nothing was ever
    /// written there) — an absent neighbor is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StripeRead`] if the file exists but cannot
    /// be opened.
    pub fn read_stripe(
        &self,
        key: StripeKey,
    ) -> Result<Option<Lines<BufReader<File>>>, StoreError> {
        let path = self.dir.join(key.file_name());
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|source| StoreError::StripeRead {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Some(BufReader::new(file).lines()))
    }

    /// Enumerates all stripe keys present on disk, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be listed.
    pub fn stripe_keys(&self) -> Result<Vec<StripeKey>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(StripeKey::from_file_name)
            {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}

/// Append-side handle over a [`StripeStore`].
pub struct StripeWriter<'a> {
    store: &'a StripeStore,
    writers: HashMap<StripeKey, BufWriter<File>>,
}

impl StripeWriter<'_> {
    /// Appends one record line to the stripe for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stripe file cannot be opened or written.
    pub fn append(&mut self, key: StripeKey, line: &str) -> Result<(), StoreError> {
        let writer = match self.writers.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = self.store.dir.join(key.file_name());
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                entry.insert(BufWriter::new(file))
            }
        };

        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flushes every touched stripe file.
    ///
    /// # Errors
    ///
    /// Returns the first flush failure.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// The single deterministic point that places a geometry into a stripe.
///
/// Point → itself; LineString → first vertex; Polygon → first vertex of
/// the exterior ring. The same rule feeds write placement and the join's
/// adjacency lookups, so a feature is always found where it was filed.
#[must_use]
pub fn anchor_point(geometry: &geo::Geometry<f64>) -> Option<geo::Point<f64>> {
    match geometry {
        geo::Geometry::Point(p) => Some(*p),
        geo::Geometry::LineString(ls) => ls.0.first().map(|c| geo::Point::new(c.x, c.y)),
        geo::Geometry::Polygon(poly) => poly
            .exterior()
            .0
            .first()
            .map(|c| geo::Point::new(c.x, c.y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store(name: &str) -> StripeStore {
        let dir = std::env::temp_dir().join(format!("gazetteer_store_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        StripeStore::new(&dir, 0.1).unwrap()
    }

    #[test]
    fn keys_floor_to_grid_cells() {
        let key = StripeKey::from_point(30.5234, 50.4501, 0.1);
        assert_eq!(key, StripeKey { x: 305, y: 504 });

        let negative = StripeKey::from_point(-0.05, -0.05, 0.1);
        assert_eq!(negative, StripeKey { x: -1, y: -1 });
    }

    #[test]
    fn file_name_round_trips() {
        let key = StripeKey { x: -12, y: 504 };
        assert_eq!(key.file_name(), "stripe_-12_504.gjson");
        assert_eq!(StripeKey::from_file_name(&key.file_name()), Some(key));
        assert_eq!(StripeKey::from_file_name("not_a_stripe.txt"), None);
    }

    #[test]
    fn neighbors_surround_the_cell() {
        let key = StripeKey { x: 0, y: 0 };
        let neighbors = key.neighbors();
        assert_eq!(neighbors.len(), 8);
        assert!(!neighbors.contains(&key));
        for n in neighbors {
            assert!((n.x - key.x).abs() <= 1 && (n.y - key.y).abs() <= 1);
        }
    }

    #[test]
    fn append_then_read_preserves_order() {
        let store = scratch_store("append_read");
        let key = StripeKey { x: 305, y: 504 };

        let mut writer = store.writer();
        writer.append(key, "first").unwrap();
        writer.append(key, "second").unwrap();
        writer.flush().unwrap();

        let lines: Vec<String> = store
            .read_stripe(key)
            .unwrap()
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(lines, ["first", "second"]);

        assert_eq!(store.stripe_keys().unwrap(), [key]);
    }

    #[test]
    fn missing_stripe_reads_as_empty() {
        let store = scratch_store("missing");
        assert!(store.read_stripe(StripeKey { x: 9, y: 9 }).unwrap().is_none());
    }

    #[test]
    fn anchor_rule_is_first_vertex() {
        let point: geo::Geometry<f64> = geo::Point::new(1.0, 2.0).into();
        assert_eq!(anchor_point(&point), Some(geo::Point::new(1.0, 2.0)));

        let line: geo::Geometry<f64> =
            geo::LineString::from(vec![(3.0, 4.0), (5.0, 6.0)]).into();
        assert_eq!(anchor_point(&line), Some(geo::Point::new(3.0, 4.0)));

        let polygon: geo::Geometry<f64> = geo::Polygon::new(
            geo::LineString::from(vec![(7.0, 8.0), (9.0, 8.0), (9.0, 9.0), (7.0, 8.0)]),
            vec![],
        )
        .into();
        assert_eq!(anchor_point(&polygon), Some(geo::Point::new(7.0, 8.0)));
    }
}
