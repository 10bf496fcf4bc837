//! Logical wire messages and the raw-transport seam.
//!
//! The protobuf codec and the channel layer live outside this crate; these
//! structs are the logical request/response messages the task framework
//! exchanges with them, and [`RegionRpc`] is the seam a transport implements:
//! one request, one response, no retry policy. Retries, per-attempt
//! deadlines, and epoch refresh belong to [`crate::controller::RpcController`].

use crate::error::Result;
use crate::param::SearchParameter;
use crate::topology::RegionEpoch;
use async_trait::async_trait;
use lattice_core::{Document, RegionId, VectorWithDistance, VectorWithId};
use serde::{Deserialize, Serialize};

/// Routing header sent with every request: the target region and the epoch
/// the caller believes it has.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RpcContext {
    pub region_id: RegionId,
    pub epoch: RegionEpoch,
}

/// Strips the routing id (and attached scalars) from a query vector.
///
/// Search broadcasts the raw payload only; the id of a query vector carries
/// no meaning on the wire.
pub fn query_vector(vector: &VectorWithId) -> VectorWithId {
    VectorWithId {
        id: 0,
        vector: vector.vector.clone(),
        scalar_data: Default::default(),
    }
}

// =============================================================================
// Vector add (upsert)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorAddRequest {
    /// True for upsert semantics: existing ids are overwritten.
    pub is_update: bool,
    pub vectors: Vec<VectorWithId>,
}

/// Acknowledgement only; the add carries no payload back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VectorAddResponse {}

// =============================================================================
// Vector search
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSearchRequest {
    pub parameter: SearchParameter,
    /// The full query-vector set; search is a broadcast within a partition.
    pub vectors: Vec<VectorWithId>,
}

/// Candidate list for one query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BatchResult {
    pub hits: Vec<VectorWithDistance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VectorSearchResponse {
    /// `batch_results[q]` is the candidate list for query `q`; the server
    /// returns exactly one entry per request vector.
    pub batch_results: Vec<BatchResult>,
}

// =============================================================================
// Document batch query
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQueryRequest {
    pub document_ids: Vec<i64>,
    pub without_scalar_data: bool,
    pub selected_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DocumentQueryResponse {
    /// Exactly one entry per requested id; missing documents come back with
    /// `id == 0` and are dropped by the aggregator.
    pub documents: Vec<Document>,
}

// =============================================================================
// Transport seam
// =============================================================================

/// Raw per-region transport: one attempt per call.
///
/// Implementations must be thread-safe; one instance is shared by every
/// in-flight task in the process.
#[async_trait]
pub trait RegionRpc: Send + Sync {
    async fn vector_add(
        &self,
        ctx: &RpcContext,
        request: &VectorAddRequest,
    ) -> Result<VectorAddResponse>;

    async fn vector_search(
        &self,
        ctx: &RpcContext,
        request: &VectorSearchRequest,
    ) -> Result<VectorSearchResponse>;

    async fn document_query(
        &self,
        ctx: &RpcContext,
        request: &DocumentQueryRequest,
    ) -> Result<DocumentQueryResponse>;
}

// =============================================================================
// Tests
// =============================================================================
