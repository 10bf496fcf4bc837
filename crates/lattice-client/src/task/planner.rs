//! Fanout planning: map a logical request onto per-region RPCs.
//!
//! Two grains exist. Id-keyed operations (upsert, batch query) group their
//! ids by the owning region, one RPC per group. Search fans out at the
//! partition grain: every region intersecting the partition's key range
//! receives the full query-vector set.
//!
//! Every routed id is covered by exactly one region in the plan, and groups
//! are pairwise disjoint; a failed lookup aborts the whole plan.

use crate::error::Result;
use crate::index::IndexDescriptor;
use crate::topology::{Region, TopologyCache};
use lattice_core::{PartitionId, RegionId};
use std::collections::HashMap;
use std::sync::Arc;

/// One planned RPC: the target region and the ids routed to it.
#[derive(Debug, Clone)]
pub(crate) struct RegionGroup {
    pub region: Arc<Region>,
    pub ids: Vec<i64>,
}

/// Groups ids by their owning region, in first-seen region order.
///
/// Each id is encoded through the index's key codec and resolved through the
/// topology cache. Lookup failures abort the plan with the cache's error.
pub(crate) fn group_by_owning_region(
    index: &IndexDescriptor,
    ids: impl IntoIterator<Item = i64>,
    topology: &dyn TopologyCache,
) -> Result<Vec<RegionGroup>> {
    let mut groups: Vec<RegionGroup> = Vec::new();
    let mut by_region: HashMap<RegionId, usize> = HashMap::new();

    for id in ids {
        let key = index.point_key_for(id);
        let region = topology.lookup_region(&key)?;

        match by_region.get(&region.region_id) {
            Some(&slot) => groups[slot].ids.push(id),
            None => {
                by_region.insert(region.region_id, groups.len());
                groups.push(RegionGroup {
                    region,
                    ids: vec![id],
                });
            }
        }
    }

    Ok(groups)
}

/// Regions covering a partition's key range, in key order.
pub(crate) fn partition_regions(
    index: &IndexDescriptor,
    partition_id: PartitionId,
    topology: &dyn TopologyCache,
) -> Result<Vec<Arc<Region>>> {
    let range = index.partition_range(partition_id)?;
    topology.scan_regions(&range.start, &range.end)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{partition_end_key, partition_start_key, point_key};
    use crate::error::ClientError;
    use crate::topology::{KeyRange, RegionEpoch, StaticTopology};
    use lattice_core::IndexKind;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn region(id: RegionId, start: Vec<u8>, end: Vec<u8>) -> Region {
        Region::new(id, RegionEpoch::new(1, 1), KeyRange::new(start, end))
    }

    /// Two partitions (ids 0 and 1, split at vector id 1000); partition 1 is
    /// itself split into two regions at vector id 5000.
    fn topology() -> StaticTopology {
        StaticTopology::new(vec![
            region(10, partition_start_key(0), partition_end_key(0)),
            region(20, point_key(1, 1000), point_key(1, 5000)),
            region(21, point_key(1, 5000), partition_end_key(1)),
        ])
    }

    fn index() -> IndexDescriptor {
        IndexDescriptor::range_partitioned(1, IndexKind::Flat, vec![0, 1], vec![1000], None)
            .unwrap()
    }

    #[test]
    fn test_groups_cover_input_and_are_disjoint() {
        let topology = topology();
        let index = index();
        let ids = vec![1, 999, 1000, 4999, 5000, 60_000];

        let groups = group_by_owning_region(&index, ids.clone(), &topology).unwrap();

        let mut seen = BTreeSet::new();
        for group in &groups {
            for id in &group.ids {
                assert!(seen.insert(*id), "id {id} routed twice");
            }
        }
        assert_eq!(seen, ids.into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn test_grouping_by_region() {
        let topology = topology();
        let index = index();

        let groups =
            group_by_owning_region(&index, vec![1, 2, 1000, 7000], &topology).unwrap();
        assert_eq!(groups.len(), 3);

        let find = |rid: RegionId| {
            groups
                .iter()
                .find(|g| g.region.region_id == rid)
                .map(|g| g.ids.clone())
        };
        assert_eq!(find(10), Some(vec![1, 2]));
        assert_eq!(find(20), Some(vec![1000]));
        assert_eq!(find(21), Some(vec![7000]));
    }

    #[test]
    fn test_lookup_failure_aborts_plan() {
        // Region 20/21 cover only ids >= 1000; drop region 10.
        let topology = StaticTopology::new(vec![
            region(20, point_key(1, 1000), point_key(1, 5000)),
            region(21, point_key(1, 5000), partition_end_key(1)),
        ]);
        let index = index();

        let err = group_by_owning_region(&index, vec![2000, 5], &topology).unwrap_err();
        assert!(matches!(err, ClientError::RegionNotFound(_)));
    }

    #[test]
    fn test_partition_regions_in_order() {
        let topology = topology();
        let index = index();

        let regions = partition_regions(&index, 1, &topology).unwrap();
        let ids: Vec<_> = regions.iter().map(|r| r.region_id).collect();
        assert_eq!(ids, vec![20, 21]);

        let regions = partition_regions(&index, 0, &topology).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].region_id, 10);
    }

    proptest! {
        // Property 1: the union of planned ids equals the input set and the
        // groups are pairwise disjoint, for arbitrary positive id sets.
        #[test]
        fn prop_plan_covers_ids(ids in proptest::collection::btree_set(1i64..100_000, 1..64)) {
            let topology = topology();
            let index = index();

            let groups = group_by_owning_region(&index, ids.iter().copied(), &topology).unwrap();

            let mut routed = BTreeSet::new();
            for group in &groups {
                for id in &group.ids {
                    prop_assert!(routed.insert(*id));
                    // Every routed id's key falls inside its region's range.
                    prop_assert!(group.region.range.contains(&index.point_key_for(*id)));
                }
            }
            prop_assert_eq!(routed, ids);
        }
    }
}
