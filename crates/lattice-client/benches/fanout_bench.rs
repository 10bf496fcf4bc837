//! Fanout benchmark
//!
//! Measures the client-side cost of one logical operation end to end against
//! an in-process transport:
//! - Upsert planning (key encode + region lookup + grouping)
//! - Search merge (per-query concatenation, sort, top-K trim)

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_client::codec::{partition_end_key, partition_start_key, point_key};
use lattice_client::rpc::{
    BatchResult, DocumentQueryRequest, DocumentQueryResponse, RegionRpc, RpcContext,
    VectorAddRequest, VectorAddResponse, VectorSearchRequest, VectorSearchResponse,
};
use lattice_client::{
    ClientConfig, IndexDescriptor, KeyRange, LatticeClient, Region, RegionEpoch, Result,
    SearchParam, StaticIndexCache, StaticTopology,
};
use lattice_core::{IndexKind, MetricType, Vector, VectorWithDistance, VectorWithId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const DIMENSION: usize = 64;

/// Transport that answers instantly with deterministic pseudo-random hits.
struct SyntheticTransport {
    hits_per_region: usize,
}

#[async_trait]
impl RegionRpc for SyntheticTransport {
    async fn vector_add(
        &self,
        _ctx: &RpcContext,
        _request: &VectorAddRequest,
    ) -> Result<VectorAddResponse> {
        Ok(VectorAddResponse::default())
    }

    async fn vector_search(
        &self,
        ctx: &RpcContext,
        request: &VectorSearchRequest,
    ) -> Result<VectorSearchResponse> {
        let mut rng = StdRng::seed_from_u64(ctx.region_id as u64);
        let batch_results = (0..request.vectors.len())
            .map(|_| BatchResult {
                hits: (0..self.hits_per_region)
                    .map(|i| VectorWithDistance {
                        vector_data: VectorWithId::new(
                            i as i64 + 1,
                            Vector::from_floats(vec![0.0; DIMENSION]),
                        ),
                        distance: rng.r#gen::<f32>(),
                        metric: MetricType::L2,
                    })
                    .collect(),
            })
            .collect();
        Ok(VectorSearchResponse { batch_results })
    }

    async fn document_query(
        &self,
        _ctx: &RpcContext,
        _request: &DocumentQueryRequest,
    ) -> Result<DocumentQueryResponse> {
        Ok(DocumentQueryResponse::default())
    }
}

/// One partition split uniformly across `regions` regions; the 1024
/// benchmark ids spread over all of them.
fn fixture(regions: i64, hits_per_region: usize) -> LatticeClient {
    let step = (1024 / regions).max(1);
    let mut region_list = Vec::new();
    for r in 0..regions {
        let start = if r == 0 {
            partition_start_key(0)
        } else {
            point_key(0, r * step)
        };
        let end = if r == regions - 1 {
            partition_end_key(0)
        } else {
            point_key(0, (r + 1) * step)
        };
        region_list.push(Region::new(r + 1, RegionEpoch::new(1, 1), KeyRange::new(start, end)));
    }
    let topology = Arc::new(StaticTopology::new(region_list));

    let cache = StaticIndexCache::new();
    cache.insert(
        IndexDescriptor::range_partitioned(1, IndexKind::Hnsw, vec![0], vec![], None).unwrap(),
    );

    LatticeClient::new(
        topology,
        Arc::new(cache),
        Arc::new(SyntheticTransport { hits_per_region }),
        ClientConfig::default(),
    )
}

fn random_vectors(count: usize, seed: u64) -> Vec<VectorWithId> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let values: Vec<f32> = (0..DIMENSION).map(|_| rng.r#gen()).collect();
            VectorWithId::new(i as i64 + 1, Vector::from_floats(values))
        })
        .collect()
}

fn bench_upsert_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("upsert_fanout");

    for regions in [1i64, 4, 16] {
        let client = fixture(regions, 0);
        let vectors = random_vectors(1024, 7);

        group.bench_with_input(BenchmarkId::from_parameter(regions), &regions, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    client.upsert(1, black_box(vectors.clone())).await.unwrap();
                })
            })
        });
    }
    group.finish();
}

fn bench_search_merge(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("search_merge");

    for regions in [1i64, 4, 16] {
        let client = fixture(regions, 128);
        let queries = random_vectors(8, 11);

        group.bench_with_input(BenchmarkId::from_parameter(regions), &regions, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let param = SearchParam {
                        topk: 10,
                        ..Default::default()
                    };
                    let results = client
                        .search(1, param, black_box(queries.clone()))
                        .await
                        .unwrap();
                    black_box(results);
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_upsert_fanout, bench_search_merge);
criterion_main!(benches);
