//! # Lattice Bench
//!
//! Benchmark harness for the LatticeDB client SDK: dataset loaders, the
//! bounded-queue producer, and an in-memory cluster that lets the whole
//! client stack run end to end without a server.

pub mod dataset;
pub mod json_loader;
pub mod sim;

pub use dataset::{BatchProducer, Dataset, DatasetError, TestEntry};
pub use json_loader::JsonDataset;
pub use sim::InMemoryCluster;
