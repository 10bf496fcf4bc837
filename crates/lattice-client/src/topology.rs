//! Region topology: the key-to-shard map consumed by the fanout planner.
//!
//! A logical index is split into partitions; each partition's key range is
//! served by one or more regions. The [`TopologyCache`] trait is the contract
//! with the process-wide metadata cache: lookup by key, scan by range, and
//! invalidation used by the RPC controller for epoch refresh.
//!
//! [`StaticTopology`] is the in-memory implementation backing tests and the
//! benchmark harness; production deployments plug in a cache fed by the
//! cluster's metadata service.

use crate::codec::render_key;
use crate::error::{ClientError, Result};
use lattice_core::RegionId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A region's configuration epoch: `(conf_version, version)`.
///
/// Detects split/merge/config changes between client calls. Sent with every
/// RPC; a stale epoch is answered with [`ClientError::EpochMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RegionEpoch {
    pub conf_version: i64,
    pub version: i64,
}

impl RegionEpoch {
    pub fn new(conf_version: i64, version: i64) -> Self {
        Self {
            conf_version,
            version,
        }
    }
}

/// A half-open byte-key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: Vec<u8>, end: Vec<u8>) -> Self {
        Self { start, end }
    }

    /// True if `key` falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }

    /// True if the range overlaps `[start, end)`.
    pub fn intersects(&self, start: &[u8], end: &[u8]) -> bool {
        self.start.as_slice() < end && start < self.end.as_slice()
    }
}

/// A physical shard serving a contiguous key range.
///
/// Opaque to the task framework; supplied by the topology cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: RegionId,
    pub epoch: RegionEpoch,
    pub range: KeyRange,
}

impl Region {
    pub fn new(region_id: RegionId, epoch: RegionEpoch, range: KeyRange) -> Self {
        Self {
            region_id,
            epoch,
            range,
        }
    }
}

/// Contract with the process-wide metadata cache.
///
/// Implementations must be thread-safe readers; they are shared across all
/// in-flight tasks.
pub trait TopologyCache: Send + Sync {
    /// Returns the single region whose range contains `key`.
    fn lookup_region(&self, key: &[u8]) -> Result<Arc<Region>>;

    /// Returns all regions intersecting `[start, end)`, in key order, with
    /// gapless coverage of the requested range.
    fn scan_regions(&self, start: &[u8], end: &[u8]) -> Result<Vec<Arc<Region>>>;

    /// Drops the cached entry for a region so the next lookup refetches it.
    /// Called by the RPC controller on epoch mismatch.
    fn invalidate(&self, region_id: RegionId);
}

// =============================================================================
// Static topology (tests, benches, local development)
// =============================================================================

/// An in-memory, manually seeded topology.
///
/// Regions are kept sorted by start key. `invalidate` is a no-op unless a
/// replacement set was staged with [`StaticTopology::stage`], in which case
/// the staged set becomes visible. That is enough to exercise the
/// controller's epoch-refresh path without a metadata service.
pub struct StaticTopology {
    regions: RwLock<Vec<Arc<Region>>>,
    staged: RwLock<Option<Vec<Arc<Region>>>>,
}

impl StaticTopology {
    /// Creates a topology from a region list; sorts by start key.
    pub fn new(mut regions: Vec<Region>) -> Self {
        regions.sort_by(|a, b| a.range.start.cmp(&b.range.start));
        Self {
            regions: RwLock::new(regions.into_iter().map(Arc::new).collect()),
            staged: RwLock::new(None),
        }
    }

    /// Stages a replacement region set, installed on the next `invalidate`.
    pub fn stage(&self, mut regions: Vec<Region>) {
        regions.sort_by(|a, b| a.range.start.cmp(&b.range.start));
        *self.staged.write().unwrap() = Some(regions.into_iter().map(Arc::new).collect());
    }
}

impl TopologyCache for StaticTopology {
    fn lookup_region(&self, key: &[u8]) -> Result<Arc<Region>> {
        let regions = self.regions.read().unwrap();
        regions
            .iter()
            .find(|r| r.range.contains(key))
            .cloned()
            .ok_or_else(|| ClientError::RegionNotFound(render_key(key)))
    }

    fn scan_regions(&self, start: &[u8], end: &[u8]) -> Result<Vec<Arc<Region>>> {
        let regions = self.regions.read().unwrap();
        let hits: Vec<Arc<Region>> = regions
            .iter()
            .filter(|r| r.range.intersects(start, end))
            .cloned()
            .collect();

        if hits.is_empty() {
            return Err(ClientError::RangeNotCovered {
                start: render_key(start),
                end: render_key(end),
            });
        }

        // The scan contract requires gapless coverage of [start, end).
        let mut cursor = start.to_vec();
        for region in &hits {
            if region.range.start.as_slice() > cursor.as_slice() {
                return Err(ClientError::RangeNotCovered {
                    start: render_key(start),
                    end: render_key(end),
                });
            }
            if region.range.end.as_slice() > cursor.as_slice() {
                cursor = region.range.end.clone();
            }
        }
        if cursor.as_slice() < end {
            return Err(ClientError::RangeNotCovered {
                start: render_key(start),
                end: render_key(end),
            });
        }

        Ok(hits)
    }

    fn invalidate(&self, _region_id: RegionId) {
        if let Some(staged) = self.staged.write().unwrap().take() {
            *self.regions.write().unwrap() = staged;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
