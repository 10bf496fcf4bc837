//! Index descriptors and the descriptor cache.
//!
//! An [`IndexDescriptor`] is resolved once per task during `init()` and
//! drives routing: it knows the index kind, the partition list, and each
//! partition's key range. The [`IndexCache`] trait is the contract with the
//! process-wide descriptor cache; [`StaticIndexCache`] is the in-memory
//! implementation used by tests and the benchmark harness.

use crate::codec;
use crate::error::{ClientError, Result};
use crate::topology::KeyRange;
use lattice_core::{IndexId, IndexKind, PartitionId, ScalarSchema};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One partition of an index: its id, the first vector id it owns, and its
/// byte-key range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition_id: PartitionId,
    /// First vector id owned by this partition. Partitions are ordered by
    /// this value; a partition owns ids up to the next partition's start.
    pub start_vector_id: i64,
    pub range: KeyRange,
}

/// Resolved description of a logical index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub id: IndexId,
    pub kind: IndexKind,
    /// Partitions ordered by `start_vector_id`.
    partitions: Vec<PartitionInfo>,
    pub scalar_schema: Option<ScalarSchema>,
}

impl IndexDescriptor {
    /// Builds a range-partitioned descriptor.
    ///
    /// `separator_ids` split the id space: with separators `[s1, s2]` the
    /// first partition owns ids below `s1`, the second `[s1, s2)`, the third
    /// `[s2, ∞)`. `partition_ids.len()` must equal
    /// `separator_ids.len() + 1`.
    pub fn range_partitioned(
        id: IndexId,
        kind: IndexKind,
        partition_ids: Vec<PartitionId>,
        separator_ids: Vec<i64>,
        scalar_schema: Option<ScalarSchema>,
    ) -> Result<Self> {
        if partition_ids.is_empty() {
            return Err(ClientError::InvalidArgument(
                "index needs at least one partition".to_string(),
            ));
        }
        if partition_ids.len() != separator_ids.len() + 1 {
            return Err(ClientError::InvalidArgument(format!(
                "partition count {} does not match separator count {}",
                partition_ids.len(),
                separator_ids.len()
            )));
        }

        let mut partitions = Vec::with_capacity(partition_ids.len());
        for (i, &partition_id) in partition_ids.iter().enumerate() {
            let (start_vector_id, start_key) = if i == 0 {
                (0, codec::partition_start_key(partition_id))
            } else {
                let sep = separator_ids[i - 1];
                (sep, codec::partition_start_key_at(partition_id, sep))
            };
            partitions.push(PartitionInfo {
                partition_id,
                start_vector_id,
                range: KeyRange::new(start_key, codec::partition_end_key(partition_id)),
            });
        }
        partitions.sort_by_key(|p| p.start_vector_id);

        Ok(Self {
            id,
            kind,
            partitions,
            scalar_schema: scalar_schema.filter(|s| !s.cols.is_empty()),
        })
    }

    /// Partition ids in id-space order.
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.partitions.iter().map(|p| p.partition_id).collect()
    }

    /// The key range of a partition.
    pub fn partition_range(&self, partition_id: PartitionId) -> Result<&KeyRange> {
        self.partitions
            .iter()
            .find(|p| p.partition_id == partition_id)
            .map(|p| &p.range)
            .ok_or_else(|| {
                ClientError::InvalidArgument(format!(
                    "partition {partition_id} not in index {}",
                    self.id
                ))
            })
    }

    /// The partition owning a vector id: the last partition whose
    /// `start_vector_id` is not above the id.
    pub fn partition_for_id(&self, vector_id: i64) -> &PartitionInfo {
        let idx = match self
            .partitions
            .binary_search_by_key(&vector_id, |p| p.start_vector_id)
        {
            Ok(pos) => pos,
            Err(pos) => pos.saturating_sub(1),
        };
        &self.partitions[idx]
    }

    /// The routing key for a vector id.
    pub fn point_key_for(&self, vector_id: i64) -> Vec<u8> {
        let partition = self.partition_for_id(vector_id);
        codec::point_key(partition.partition_id, vector_id)
    }

    /// Whether the index carries a scalar schema usable for typed filters.
    pub fn has_scalar_schema(&self) -> bool {
        self.scalar_schema.is_some()
    }
}

/// Contract with the process-wide index descriptor cache.
pub trait IndexCache: Send + Sync {
    /// Resolves a descriptor by index id.
    fn get(&self, index_id: IndexId) -> Result<Arc<IndexDescriptor>>;
}

/// In-memory descriptor registry keyed by index id.
#[derive(Default)]
pub struct StaticIndexCache {
    descriptors: DashMap<IndexId, Arc<IndexDescriptor>>,
}

impl StaticIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a descriptor.
    pub fn insert(&self, descriptor: IndexDescriptor) {
        self.descriptors
            .insert(descriptor.id, Arc::new(descriptor));
    }
}

impl IndexCache for StaticIndexCache {
    fn get(&self, index_id: IndexId) -> Result<Arc<IndexDescriptor>> {
        self.descriptors
            .get(&index_id)
            .map(|d| Arc::clone(&d))
            .ok_or(ClientError::IndexNotFound(index_id))
    }
}

// =============================================================================
// Tests
// =============================================================================
