//! In-memory cluster for network-free benchmark runs.
//!
//! Implements the SDK's raw-transport seam over per-region vector stores:
//! adds replace by id, searches brute-force scan the region, and document
//! queries project the stored scalar attributes. Good enough to drive the
//! whole client stack end to end on one machine.

use async_trait::async_trait;
use dashmap::DashMap;
use lattice_client::rpc::{
    BatchResult, DocumentQueryRequest, DocumentQueryResponse, RegionRpc, RpcContext,
    VectorAddRequest, VectorAddResponse, VectorSearchRequest, VectorSearchResponse,
};
use lattice_client::Result;
use lattice_core::{Document, MetricType, RegionId, VectorWithDistance, VectorWithId};
use ordered_float::OrderedFloat;

/// Region-id keyed vector stores.
#[derive(Default)]
pub struct InMemoryCluster {
    regions: DashMap<RegionId, Vec<VectorWithId>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total vectors stored across regions.
    pub fn len(&self) -> usize {
        self.regions.iter().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.iter().all(|r| r.is_empty())
    }
}

fn l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[async_trait]
impl RegionRpc for InMemoryCluster {
    async fn vector_add(
        &self,
        ctx: &RpcContext,
        request: &VectorAddRequest,
    ) -> Result<VectorAddResponse> {
        let mut region = self.regions.entry(ctx.region_id).or_default();
        for vector in &request.vectors {
            match region.iter_mut().find(|v| v.id == vector.id) {
                Some(existing) if request.is_update => *existing = vector.clone(),
                Some(_) => {}
                None => region.push(vector.clone()),
            }
        }
        Ok(VectorAddResponse::default())
    }

    async fn vector_search(
        &self,
        ctx: &RpcContext,
        request: &VectorSearchRequest,
    ) -> Result<VectorSearchResponse> {
        let region = self.regions.get(&ctx.region_id);
        let stored: &[VectorWithId] = region.as_deref().map(Vec::as_slice).unwrap_or(&[]);

        let top_n = request.parameter.top_n as usize;
        let batch_results = request
            .vectors
            .iter()
            .map(|query| {
                let mut hits: Vec<VectorWithDistance> = stored
                    .iter()
                    .map(|candidate| VectorWithDistance {
                        vector_data: if request.parameter.without_vector_data {
                            VectorWithId::new(candidate.id, Default::default())
                        } else {
                            candidate.clone()
                        },
                        distance: l2(&query.vector.float_values, &candidate.vector.float_values),
                        metric: MetricType::L2,
                    })
                    .collect();
                hits.sort_by_key(|h| OrderedFloat(h.distance));
                if !request.parameter.enable_range_search && top_n > 0 && hits.len() > top_n {
                    hits.truncate(top_n);
                }
                BatchResult { hits }
            })
            .collect();

        Ok(VectorSearchResponse { batch_results })
    }

    async fn document_query(
        &self,
        ctx: &RpcContext,
        request: &DocumentQueryRequest,
    ) -> Result<DocumentQueryResponse> {
        let region = self.regions.get(&ctx.region_id);
        let stored: &[VectorWithId] = region.as_deref().map(Vec::as_slice).unwrap_or(&[]);

        let documents = request
            .document_ids
            .iter()
            .map(|&id| match stored.iter().find(|v| v.id == id) {
                Some(vector) => {
                    let mut doc = Document::new(id);
                    if !request.without_scalar_data {
                        for (key, value) in &vector.scalar_data {
                            let selected = request.selected_keys.is_empty()
                                || request.selected_keys.iter().any(|k| k == key);
                            if selected {
                                doc.fields.insert(key.clone(), value.clone());
                            }
                        }
                    }
                    doc
                }
                // One slot per requested id; id 0 marks a miss.
                None => Document::new(0),
            })
            .collect();

        Ok(DocumentQueryResponse { documents })
    }
}

// =============================================================================
// Tests
// =============================================================================
