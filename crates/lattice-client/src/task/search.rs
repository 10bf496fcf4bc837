//! Two-level vector search task.
//!
//! The server routes search at region granularity, but merging must happen
//! at partition granularity: [`VectorSearchTask`] spawns one
//! [`VectorSearchPartTask`] per partition, and each part task broadcasts the
//! full query-vector set to every region covering its partition range.
//!
//! The part task's state machine:
//!
//! ```text
//!  CREATED --init()--> READY --run()--> PRIMARY_INFLIGHT
//!                                          |
//!                              (all N primary callbacks received)
//!                                          v
//!                                  PRIMARY_COMPLETE
//!                                   |              |
//!               (status!=OK or nodata empty)   (status=OK and nodata non-empty)
//!                                   v              v
//!                                 DONE       FALLBACK_INFLIGHT
//!                                                  |
//!                                      (all M fallback callbacks)
//!                                                  v
//!                                                DONE
//! ```
//!
//! A region answering `DiskAnnNoData` is queued instead of latched; after
//! the primary fan-in, the part task re-issues a brute-force search to
//! exactly those regions and merges their answers by the same rule.

use crate::error::{ClientError, Result};
use crate::expr;
use crate::index::IndexDescriptor;
use crate::param::{build_search_parameter, SearchParam, SearchParameter};
use crate::rpc::{query_vector, VectorSearchRequest, VectorSearchResponse};
use crate::task::{planner, FanIn, StatusCell, TaskContext};
use lattice_core::{IndexId, PartitionId, RegionId, SearchResult, VectorWithDistance, VectorWithId};
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, trace, warn};

/// Candidates per query index, accumulated across regions.
type PartialResults = HashMap<usize, Vec<VectorWithDistance>>;

// =============================================================================
// Top-level task
// =============================================================================

/// Single-use task: construct, `init()`, then `run().await`.
pub struct VectorSearchTask {
    context: TaskContext,
    index_id: IndexId,
    param: SearchParam,
    target_vectors: Arc<Vec<VectorWithId>>,
    index: RwLock<Option<Arc<IndexDescriptor>>>,
    parameter: RwLock<Option<SearchParameter>>,
    partial: RwLock<PartialResults>,
    status: StatusCell,
    fan_in: FanIn,
}

impl VectorSearchTask {
    pub fn new(
        context: TaskContext,
        index_id: IndexId,
        param: SearchParam,
        target_vectors: Vec<VectorWithId>,
    ) -> Self {
        Self {
            context,
            index_id,
            param,
            target_vectors: Arc::new(target_vectors),
            index: RwLock::new(None),
            parameter: RwLock::new(None),
            partial: RwLock::new(HashMap::new()),
            status: StatusCell::new(),
            fan_in: FanIn::new(),
        }
    }

    /// Resolves the index, lowers the search parameter to its wire form, and
    /// compiles the optional filter expression into the coprocessor blob.
    pub fn init(&self) -> Result<()> {
        if self.target_vectors.is_empty() {
            return Err(ClientError::InvalidArgument(
                "target_vectors is empty".to_string(),
            ));
        }

        let index = self.context.index_cache.get(self.index_id)?;
        let mut parameter = build_search_parameter(index.kind, &self.param)?;

        if !self.param.langchain_expr_json.is_empty() {
            parameter.coprocessor = expr::compile(
                &self.param.langchain_expr_json,
                index.scalar_schema.as_ref(),
            )?;
        }

        *self.parameter.write().unwrap() = Some(parameter);
        *self.index.write().unwrap() = Some(index);
        Ok(())
    }

    /// Runs one part task per partition and merges per-query results.
    pub async fn run(self: Arc<Self>) -> Result<Vec<SearchResult>> {
        let index = self
            .index
            .read()
            .unwrap()
            .clone()
            .expect("init() must succeed before run()");
        let parameter = self
            .parameter
            .read()
            .unwrap()
            .clone()
            .expect("init() must succeed before run()");

        let part_ids = index.partition_ids();
        if part_ids.is_empty() {
            return Ok(self.construct_results(HashMap::new()));
        }

        let done = self.fan_in.install();
        self.fan_in.arm(part_ids.len() as u32);

        for part_id in part_ids {
            let part = Arc::new(VectorSearchPartTask::new(
                self.context.clone(),
                Arc::clone(&index),
                part_id,
                parameter.clone(),
                Arc::clone(&self.target_vectors),
            ));
            let task = Arc::clone(&self);
            tokio::spawn(async move {
                let outcome = Arc::clone(&part).run().await;
                task.on_part_complete(part_id, outcome);
            });
        }

        let _ = done.await;
        self.status.snapshot()?;

        let partial = std::mem::take(&mut *self.partial.write().unwrap());
        Ok(self.construct_results(partial))
    }

    fn on_part_complete(&self, part_id: PartitionId, outcome: Result<PartialResults>) {
        match outcome {
            Err(err) => {
                warn!(part_id, error = %err, "search part task failed");
                self.status.latch(err);
            }
            Ok(results) => {
                let mut partial = self.partial.write().unwrap();
                for (query_idx, mut hits) in results {
                    partial.entry(query_idx).or_default().append(&mut hits);
                }
            }
        }

        if self.fan_in.complete_one() {
            self.fan_in.finish();
        }
    }

    /// Builds one [`SearchResult`] per input query, in input order: echo the
    /// query payload, sort candidates ascending by distance, and trim to
    /// `topk` unless range search keeps everything.
    fn construct_results(&self, partial: PartialResults) -> Vec<SearchResult> {
        let mut out: Vec<SearchResult> = self
            .target_vectors
            .iter()
            .map(|v| SearchResult {
                query_vector: query_vector(v),
                hits: Vec::new(),
            })
            .collect();

        for (query_idx, mut hits) in partial {
            if query_idx >= out.len() {
                warn!(
                    query_idx,
                    queries = out.len(),
                    "dropping result for out-of-range query index"
                );
                continue;
            }

            // Stable sort: ties keep insertion order.
            hits.sort_by_key(|hit| OrderedFloat(hit.distance));
            let topk = self.param.topk as usize;
            if !self.param.enable_range_search && topk > 0 && hits.len() > topk {
                hits.truncate(topk);
            }
            out[query_idx].hits = hits;
        }

        out
    }
}

// =============================================================================
// Per-partition task
// =============================================================================

/// Broadcasts the query set to every region covering one partition range and
/// concatenates per-query candidates, with the brute-force fallback round
/// for regions that report `DiskAnnNoData`.
pub(crate) struct VectorSearchPartTask {
    context: TaskContext,
    index: Arc<IndexDescriptor>,
    partition_id: PartitionId,
    parameter: SearchParameter,
    target_vectors: Arc<Vec<VectorWithId>>,
    regions: RwLock<HashMap<RegionId, Arc<crate::topology::Region>>>,
    results: RwLock<PartialResults>,
    nodata_region_ids: Mutex<Vec<RegionId>>,
    status: StatusCell,
    fan_in: FanIn,
}

/// Which fan-in round a search RPC belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Primary,
    Fallback,
}

impl VectorSearchPartTask {
    pub(crate) fn new(
        context: TaskContext,
        index: Arc<IndexDescriptor>,
        partition_id: PartitionId,
        parameter: SearchParameter,
        target_vectors: Arc<Vec<VectorWithId>>,
    ) -> Self {
        Self {
            context,
            index,
            partition_id,
            parameter,
            target_vectors,
            regions: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            nodata_region_ids: Mutex::new(Vec::new()),
            status: StatusCell::new(),
            fan_in: FanIn::new(),
        }
    }

    pub(crate) async fn run(self: Arc<Self>) -> Result<PartialResults> {
        let regions = planner::partition_regions(
            &self.index,
            self.partition_id,
            self.context.topology.as_ref(),
        )?;

        {
            let mut map = self.regions.write().unwrap();
            map.clear();
            for region in &regions {
                map.insert(region.region_id, Arc::clone(region));
            }
        }

        let done = self.fan_in.install();
        self.fan_in.arm(regions.len() as u32);

        let request = self.build_request(self.parameter.clone());
        for region in regions {
            let task = Arc::clone(&self);
            let request = request.clone();
            tokio::spawn(async move {
                let result = task
                    .context
                    .controller
                    .vector_search(&region, &request)
                    .await;
                task.on_search_rpc(region.region_id, &request, result, Round::Primary);
            });
        }

        let _ = done.await;
        self.status.snapshot()?;
        Ok(std::mem::take(&mut *self.results.write().unwrap()))
    }

    fn build_request(&self, parameter: SearchParameter) -> VectorSearchRequest {
        VectorSearchRequest {
            parameter,
            vectors: self.target_vectors.iter().map(query_vector).collect(),
        }
    }

    fn on_search_rpc(
        self: Arc<Self>,
        region_id: RegionId,
        request: &VectorSearchRequest,
        result: Result<VectorSearchResponse>,
        round: Round,
    ) {
        match result {
            Err(ClientError::DiskAnnNoData { .. }) if round == Round::Primary => {
                info!(region_id, "region has no diskann data, queued for brute force");
                self.nodata_region_ids.lock().unwrap().push(region_id);
            }
            Err(err) => {
                warn!(
                    region_id,
                    part_id = self.partition_id,
                    error = %err,
                    "vector search rpc failed"
                );
                self.status.latch(err);
            }
            Ok(response) => {
                trace!(
                    region_id,
                    request = ?request,
                    response = ?response,
                    "vector search rpc ok"
                );
                if response.batch_results.len() != request.vectors.len() {
                    warn!(
                        region_id,
                        requested = request.vectors.len(),
                        returned = response.batch_results.len(),
                        "batch result count mismatch in response"
                    );
                }

                let mut results = self.results.write().unwrap();
                for (query_idx, batch) in response.batch_results.iter().enumerate() {
                    results
                        .entry(query_idx)
                        .or_default()
                        .extend(batch.hits.iter().cloned());
                }
            }
        }

        if self.fan_in.complete_one() {
            match round {
                Round::Primary => self.check_nodata_region(),
                Round::Fallback => self.fan_in.finish(),
            }
        }
    }

    /// Completion owner of the primary round: finish, or enter the
    /// brute-force round for the queued regions.
    fn check_nodata_region(self: Arc<Self>) {
        let nodata = std::mem::take(&mut *self.nodata_region_ids.lock().unwrap());
        if !self.status.is_ok() || nodata.is_empty() {
            self.fan_in.finish();
            return;
        }
        self.search_by_brute_force(nodata);
    }

    /// Re-issues the search to the nodata regions with the DiskANN
    /// sub-message cleared and `use_brute_force` set.
    fn search_by_brute_force(self: Arc<Self>, nodata: Vec<RegionId>) {
        info!(
            part_id = self.partition_id,
            regions = nodata.len(),
            "retrying nodata regions with brute force"
        );

        let request = self.build_request(self.parameter.for_brute_force());
        self.fan_in.arm(nodata.len() as u32);

        for region_id in nodata {
            let region = self
                .regions
                .read()
                .unwrap()
                .get(&region_id)
                .cloned()
                .expect("nodata region was scanned in the primary round");
            let task = Arc::clone(&self);
            let request = request.clone();
            tokio::spawn(async move {
                let result = task
                    .context
                    .controller
                    .vector_search(&region, &request)
                    .await;
                task.on_search_rpc(region.region_id, &request, result, Round::Fallback);
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcConfig;
    use crate::controller::RpcController;
    use crate::index::StaticIndexCache;
    use crate::rpc::{
        DocumentQueryRequest, DocumentQueryResponse, RegionRpc, RpcContext, VectorAddRequest,
        VectorAddResponse,
    };
    use crate::topology::StaticTopology;
    use async_trait::async_trait;
    use lattice_core::{MetricType, Vector};
    use proptest::prelude::*;

    /// The merge tests never reach the transport.
    struct NoopTransport;

    #[async_trait]
    impl RegionRpc for NoopTransport {
        async fn vector_add(
            &self,
            _ctx: &RpcContext,
            _request: &VectorAddRequest,
        ) -> Result<VectorAddResponse> {
            unreachable!()
        }

        async fn vector_search(
            &self,
            _ctx: &RpcContext,
            _request: &VectorSearchRequest,
        ) -> Result<VectorSearchResponse> {
            unreachable!()
        }

        async fn document_query(
            &self,
            _ctx: &RpcContext,
            _request: &DocumentQueryRequest,
        ) -> Result<DocumentQueryResponse> {
            unreachable!()
        }
    }

    fn merge_task(param: SearchParam, queries: usize) -> VectorSearchTask {
        let topology = Arc::new(StaticTopology::new(Vec::new()));
        let controller = Arc::new(RpcController::new(
            Arc::clone(&topology) as Arc<dyn crate::topology::TopologyCache>,
            Arc::new(NoopTransport),
            RpcConfig::default(),
        ));
        let context = TaskContext::new(topology, Arc::new(StaticIndexCache::new()), controller);

        let target_vectors = (0..queries)
            .map(|i| VectorWithId::new(i as i64 + 1, Vector::from_floats(vec![i as f32])))
            .collect();
        VectorSearchTask::new(context, 1, param, target_vectors)
    }

    fn hits_with(distances: &[f32]) -> Vec<VectorWithDistance> {
        distances
            .iter()
            .map(|d| VectorWithDistance {
                vector_data: VectorWithId::default(),
                distance: *d,
                metric: MetricType::L2,
            })
            .collect()
    }

    #[test]
    fn test_queries_without_candidates_get_empty_hits() {
        let task = merge_task(SearchParam::default(), 3);
        let mut partial = PartialResults::new();
        partial.insert(1, hits_with(&[0.5]));

        let out = task.construct_results(partial);
        assert_eq!(out.len(), 3);
        assert!(out[0].hits.is_empty());
        assert_eq!(out[1].hits.len(), 1);
        assert!(out[2].hits.is_empty());
        // The echoed query has no routing id.
        assert_eq!(out[0].query_vector.id, 0);
    }

    #[test]
    fn test_out_of_range_query_index_is_dropped() {
        let task = merge_task(SearchParam::default(), 1);
        let mut partial = PartialResults::new();
        partial.insert(0, hits_with(&[0.5]));
        partial.insert(9, hits_with(&[0.1]));

        let out = task.construct_results(partial);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hits.len(), 1);
    }

    proptest! {
        // For a candidate multiset C the final list is
        // sort_asc(C)[..min(topk, |C|)], or all of sort_asc(C) under range
        // search.
        #[test]
        fn prop_merge_is_sorted_and_trimmed(
            distances in proptest::collection::vec(0.0f32..100.0, 0..64),
            topk in 0u32..16,
            enable_range_search in any::<bool>(),
        ) {
            let param = SearchParam {
                topk,
                enable_range_search,
                ..Default::default()
            };
            let task = merge_task(param, 1);

            let mut partial = PartialResults::new();
            partial.insert(0, hits_with(&distances));
            let out = task.construct_results(partial);

            let got: Vec<f32> = out[0].hits.iter().map(|h| h.distance).collect();
            let mut expected = distances.clone();
            expected.sort_by_key(|d| OrderedFloat(*d));
            if !enable_range_search && topk > 0 {
                expected.truncate(topk as usize);
            }
            prop_assert_eq!(got, expected);
        }
    }
}
