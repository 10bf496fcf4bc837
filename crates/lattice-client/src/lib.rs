//! # Lattice Client
//!
//! Client SDK for LatticeDB, a distributed, range-partitioned
//! vector/document database. Logical operations (upsert a vector batch,
//! search with query vectors, look up documents by id) are fanned out to the
//! regions owning the touched keys, executed concurrently, and merged into a
//! single answer.
//!
//! The crate's core is the task framework under [`task`]: key-to-region
//! planning over a cached topology, parallel RPC orchestration with fan-in
//! completion, type-specific result merging (ordered top-K for search,
//! identity for upsert/lookup), first-error latching, and the in-band
//! brute-force fallback for regions without a built DiskANN index.
//!
//! # Example
//!
//! ```ignore
//! use lattice_client::{ClientConfig, LatticeClient, SearchParam};
//! use std::sync::Arc;
//!
//! let client = LatticeClient::new(topology, index_cache, transport, ClientConfig::default());
//! client.upsert(index_id, vectors).await?;
//! let results = client.search(index_id, SearchParam::default(), queries).await?;
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod expr;
pub mod index;
pub mod logging;
pub mod param;
pub mod rpc;
pub mod task;
pub mod topology;

// Re-exports
pub use client::LatticeClient;
pub use config::{ClientConfig, RpcConfig};
pub use error::{ClientError, Result};
pub use index::{IndexCache, IndexDescriptor, StaticIndexCache};
pub use param::{ExtraKey, FilterSource, FilterType, SearchParam};
pub use rpc::RegionRpc;
pub use task::batch_query::BatchQueryParam;
pub use topology::{KeyRange, Region, RegionEpoch, StaticTopology, TopologyCache};
