//! Key codec for region routing.
//!
//! Encodes `(partition_id, vector_id)` into the byte key used to look up the
//! owning region. The layout is an interface contract with the topology
//! cache: one tag byte, the partition id as 8 big-endian bytes, and (for
//! point keys) the vector id as 8 big-endian bytes.
//!
//! Big-endian packing makes byte-wise order equal numeric order for the
//! positive id domain, so for a fixed partition `id1 < id2` implies
//! `encode(p, id1) < encode(p, id2)` lexicographically. Each partition
//! occupies the half-open range `[start_key(p), start_key(p + 1))`.

use lattice_core::PartitionId;

/// Tag byte for client-encoded raw keys.
pub const RAW_TAG: u8 = b'r';

/// Encodes a partition boundary key: `tag | partition_id`.
pub fn partition_start_key(partition_id: PartitionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(RAW_TAG);
    key.extend_from_slice(&partition_id.to_be_bytes());
    key
}

/// Encodes the exclusive end key of a partition: `tag | partition_id + 1`.
pub fn partition_end_key(partition_id: PartitionId) -> Vec<u8> {
    partition_start_key(partition_id + 1)
}

/// Encodes a point key: `tag | partition_id | vector_id`.
pub fn point_key(partition_id: PartitionId, vector_id: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.push(RAW_TAG);
    key.extend_from_slice(&partition_id.to_be_bytes());
    key.extend_from_slice(&vector_id.to_be_bytes());
    key
}

/// Encodes a partition start key with a lower separator id:
/// `tag | partition_id | separator_id`.
///
/// Used when a partition's range does not start at the partition boundary
/// (every partition after the first in a range-partitioned index).
pub fn partition_start_key_at(partition_id: PartitionId, separator_id: i64) -> Vec<u8> {
    point_key(partition_id, separator_id)
}

/// Renders a key for log and error messages.
pub fn render_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len() * 2);
    for b in key {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
