//! Benchmark driver.
//!
//! Streams a JSON dataset through the SDK against the in-memory cluster:
//! upserts the train set (producer thread feeding a bounded queue), runs the
//! test queries, and reports throughput and recall.
//!
//! ```bash
//! lattice-bench wikipedia2212 ./datasets/wikipedia-22-12 --regions 4 --topk 10
//! ```

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lattice_bench::{BatchProducer, Dataset, InMemoryCluster, JsonDataset, TestEntry};
use lattice_client::codec::{partition_end_key, partition_start_key, point_key};
use lattice_client::{
    ClientConfig, IndexDescriptor, KeyRange, LatticeClient, Region, RegionEpoch, SearchParam,
    StaticIndexCache, StaticTopology,
};
use lattice_core::IndexKind;
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const INDEX_ID: i64 = 1;
const PARTITION_ID: i64 = 0;

struct Args {
    dataset: String,
    dirpath: PathBuf,
    regions: i64,
    topk: u32,
    config: Option<PathBuf>,
}

fn usage() -> ! {
    eprintln!(
        "usage: lattice-bench <dataset> <dir> [--regions N] [--topk K] [--config FILE]\n\
         datasets: wikipedia2212 | miracl | bioasq | openai_large"
    );
    std::process::exit(2);
}

fn parse_args() -> Args {
    let mut args = std::env::args().skip(1);
    let Some(dataset) = args.next() else { usage() };
    let Some(dirpath) = args.next() else { usage() };

    let mut parsed = Args {
        dataset,
        dirpath: PathBuf::from(dirpath),
        regions: 4,
        topk: 10,
        config: None,
    };

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--regions" => {
                parsed.regions = args.next().and_then(|v| v.parse().ok()).unwrap_or_else(|| usage())
            }
            "--topk" => {
                parsed.topk = args.next().and_then(|v| v.parse().ok()).unwrap_or_else(|| usage())
            }
            "--config" => parsed.config = Some(PathBuf::from(args.next().unwrap_or_else(|| usage()))),
            _ => usage(),
        }
    }
    if parsed.regions < 1 {
        usage();
    }
    parsed
}

/// One partition, `regions` regions splitting `[1, train_count]` uniformly.
fn build_topology(regions: i64, train_count: u32) -> StaticTopology {
    let step = ((train_count as i64).max(regions) / regions).max(1);
    let mut region_list = Vec::new();
    for r in 0..regions {
        let start = if r == 0 {
            partition_start_key(PARTITION_ID)
        } else {
            point_key(PARTITION_ID, r * step + 1)
        };
        let end = if r == regions - 1 {
            partition_end_key(PARTITION_ID)
        } else {
            point_key(PARTITION_ID, (r + 1) * step + 1)
        };
        region_list.push(Region::new(
            r + 1,
            RegionEpoch::new(1, 1),
            KeyRange::new(start, end),
        ));
    }
    StaticTopology::new(region_list)
}

/// Recall@k: overlap between the returned ids and the k closest
/// ground-truth neighbors.
fn recall_at_k(entry: &TestEntry, returned: &[i64], k: usize) -> f64 {
    let mut truth: Vec<(i64, f32)> = entry.neighbors.iter().map(|(id, d)| (*id, *d)).collect();
    truth.sort_by_key(|(_, d)| OrderedFloat(*d));
    truth.truncate(k);
    if truth.is_empty() {
        return 1.0;
    }

    let returned: HashSet<i64> = returned.iter().copied().collect();
    let found = truth.iter().filter(|(id, _)| returned.contains(id)).count();
    found as f64 / truth.len() as f64
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::load(args.config.as_deref())?;

    let Some(mut dataset) = JsonDataset::by_name(&args.dataset, &args.dirpath) else {
        usage()
    };
    dataset.init()?;
    let train_count = dataset.train_count();
    let dimension = dataset.dimension();
    let test_entries = dataset.test_data()?;

    println!(
        "{} {} ({} train, {} test, dim {})",
        "dataset".bold(),
        dataset.kind().cyan(),
        train_count,
        test_entries.len(),
        dimension
    );

    let topology = Arc::new(build_topology(args.regions, train_count));
    let index_cache = StaticIndexCache::new();
    index_cache.insert(IndexDescriptor::range_partitioned(
        INDEX_ID,
        IndexKind::Flat,
        vec![PARTITION_ID],
        vec![],
        None,
    )?);
    let cluster = Arc::new(InMemoryCluster::new());
    let client = LatticeClient::new(
        topology,
        Arc::new(index_cache),
        Arc::clone(&cluster) as Arc<dyn lattice_client::RegionRpc>,
        config.clone(),
    );

    // Load phase: the producer parses on its own thread while we upsert.
    let bar = ProgressBar::new(train_count as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("#>-"),
    );

    let producer = BatchProducer::spawn(
        Box::new(dataset),
        config.bench.batch_size as u32,
        config.bench.queue_depth,
    );

    let load_started = Instant::now();
    while let Some(batch) = producer.next() {
        let count = batch.len() as u64;
        client.upsert(INDEX_ID, batch).await?;
        bar.inc(count);
    }
    let produced = producer.join()?;
    bar.finish_with_message("loaded");
    let load_secs = load_started.elapsed().as_secs_f64();

    // Query phase.
    let query_started = Instant::now();
    let mut total_recall = 0.0;
    for entry in &test_entries {
        let param = SearchParam {
            topk: args.topk,
            with_vector_data: false,
            ..Default::default()
        };
        let results = client
            .search(INDEX_ID, param, vec![entry.vector_with_id.clone()])
            .await?;
        let returned: Vec<i64> = results[0].hits.iter().map(|h| h.vector_data.id).collect();
        total_recall += recall_at_k(entry, &returned, args.topk as usize);
    }
    let query_secs = query_started.elapsed().as_secs_f64();
    let queries = test_entries.len().max(1);

    println!();
    println!("{}", "results".bold().underline());
    println!(
        "  load:   {} vectors in {:.2}s ({:.0} vec/s) across {} regions",
        produced,
        load_secs,
        produced as f64 / load_secs.max(f64::EPSILON),
        args.regions
    );
    println!(
        "  query:  {} queries in {:.2}s ({:.0} qps)",
        queries,
        query_secs,
        queries as f64 / query_secs.max(f64::EPSILON)
    );
    let recall = total_recall / queries as f64;
    let recall_str = format!("{:.4}", recall);
    println!(
        "  recall@{}: {}",
        args.topk,
        if recall >= 0.9 {
            recall_str.green()
        } else {
            recall_str.yellow()
        }
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    lattice_client::logging::init();
    let args = parse_args();
    if let Err(err) = run(args).await {
        eprintln!("{} {}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}
