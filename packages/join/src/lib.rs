#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cross-stripe spatial join for the gazetteer index.
//!
//! For every address point the join resolves the enclosing street and
//! city polygons — including polygons whose boundary crosses a stripe
//! edge — and renders a configurably-ordered address string.
//!
//! # Architecture
//!
//! - **Candidates**: boundary records from the point's home stripe and
//!   its 8 neighbors, bulk-loaded into an `rstar` R-tree
//!   ([`boundaries`]).
//! - **Resolution**: inclusive point-in-polygon, smallest enclosing
//!   area per level, deterministic tie-breaks ([`address`]).
//! - **Emission**: joined records go to a shared, mutex-serialized
//!   [`handlers::JoinOutHandler`]; per-stripe completion flushes the
//!   sink without closing it.
//!
//! Stripes are joined in parallel by scoped worker threads draining a
//! shared queue; within a stripe, records stream sequentially in input
//! order. Run with one thread for a stable total output order.

pub mod address;
pub mod boundaries;
pub mod handlers;

use std::sync::{Mutex, PoisonError};

use gazetteer_model::{AddrLevelsSorting, FeatureType};
use gazetteer_striper::codec;
use gazetteer_striper::store::{StoreError, StripeKey, StripeStore};

pub use address::{AddressJoinResult, LevelRef};
pub use handlers::{JoinOutHandler, PrintJoinOutHandler, SinkError};

/// Errors that abort a join run.
///
/// Per-record problems (malformed lines, bad geometry) are logged and
/// skipped instead; only storage enumeration, serialization, and sink
/// failures are fatal, since those would silently corrupt the output.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// Store enumeration failure.
    #[error("stripe store error: {0}")]
    Store(#[from] StoreError),

    /// Output destination failure.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Joined-record serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stripe worker panicked.
    #[error("join worker panicked")]
    WorkerPanic,
}

/// Immutable join configuration, constructed once at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct JoinConfig {
    /// Token order for rendered address text.
    pub sorting: AddrLevelsSorting,
    /// Worker thread count; `0` means available parallelism.
    pub threads: usize,
}

/// Counters from one join run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JoinStats {
    /// Stripes processed.
    pub stripes: u64,
    /// Joined records emitted.
    pub joined: u64,
    /// Records skipped with a logged warning.
    pub skipped: u64,
}

impl std::ops::AddAssign for JoinStats {
    fn add_assign(&mut self, rhs: Self) {
        self.stripes += rhs.stripes;
        self.joined += rhs.joined;
        self.skipped += rhs.skipped;
    }
}

/// The join engine: drives stripe workers over a store into a sink.
pub struct Joiner<'a> {
    store: &'a StripeStore,
    config: JoinConfig,
}

impl<'a> Joiner<'a> {
    /// A joiner over `store` with the given configuration.
    #[must_use]
    pub const fn new(store: &'a StripeStore, config: JoinConfig) -> Self {
        Self { store, config }
    }

    /// Joins every stripe in the store, emitting into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error on store enumeration failure, sink failure, or
    /// a worker panic. Per-record problems are skipped and logged.
    pub fn run(&self, sink: &dyn JoinOutHandler) -> Result<JoinStats, JoinError> {
        let mut keys = self.store.stripe_keys()?;
        // Workers pop from the back of the queue; reverse so stripes are
        // handed out in sorted key order.
        keys.reverse();
        let threads = match self.config.threads {
            0 => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            n => n,
        };

        log::info!(
            "joining {} stripes with {threads} worker(s), addr order {}",
            keys.len(),
            self.config.sorting
        );

        let queue = Mutex::new(keys);

        let results: Vec<Result<JoinStats, JoinError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(|| {
                        let mut stats = JoinStats::default();
                        loop {
                            let next = queue
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .pop();
                            let Some(key) = next else { break };
                            stats += self.join_stripe(key, sink)?;
                        }
                        Ok(stats)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(Err(JoinError::WorkerPanic)))
                .collect()
        });

        let mut total = JoinStats::default();
        for result in results {
            total += result?;
        }

        sink.all_done()?;
        log::info!(
            "join complete: {} records over {} stripes ({} skipped)",
            total.joined,
            total.stripes,
            total.skipped
        );

        Ok(total)
    }

    /// Joins one stripe's address points against its candidate tree.
    fn join_stripe(
        &self,
        key: StripeKey,
        sink: &dyn JoinOutHandler,
    ) -> Result<JoinStats, JoinError> {
        let mut stats = JoinStats {
            stripes: 1,
            ..JoinStats::default()
        };

        let lines = match self.store.read_stripe(key) {
            Ok(Some(lines)) => lines,
            Ok(None) => return Ok(stats),
            Err(e) => {
                // Other stripes must not be blocked by one bad file.
                log::warn!("home stripe {key} unreadable ({e}); skipping its addresses");
                return Ok(stats);
            }
        };

        let tree = boundaries::load_candidates(self.store, key);

        for line in lines {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("read error in stripe {key}, remainder skipped: {e}");
                    break;
                }
            };

            match codec::extract_ftype(&line) {
                Ok(ftype) if ftype == FeatureType::Addr.as_ref() => {}
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("skipping malformed record in stripe {key}: {e}");
                    stats.skipped += 1;
                    continue;
                }
            }

            match self.join_point(&line, &tree) {
                Ok(joined) => {
                    sink.handle(&joined, key)?;
                    stats.joined += 1;
                }
                Err(reason) => {
                    log::warn!("skipping address record ({reason}): {line}");
                    stats.skipped += 1;
                }
            }
        }

        sink.stripe_done(key)?;
        Ok(stats)
    }

    /// Resolves one address line into a serialized joined record, or a
    /// skip reason.
    fn join_point(
        &self,
        line: &str,
        tree: &rstar::RTree<boundaries::BoundaryEntry>,
    ) -> Result<String, String> {
        let record = codec::parse_record(line).map_err(|e| format!("unparseable: {e}"))?;

        let id = record.id.clone().ok_or_else(|| "record has no id".to_string())?;

        let geometry = record.geometry().map_err(|e| format!("bad geometry: {e}"))?;
        let geo::Geometry::Point(point) = geometry else {
            return Err("address record is not a point".to_string());
        };

        let result = address::resolve(
            &id,
            &record.properties,
            boundaries::containing(tree, point),
            self.config.sorting,
        );

        serde_json::to_string(&result).map_err(|e| format!("unserializable result: {e}"))
    }
}
