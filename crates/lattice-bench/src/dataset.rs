//! Dataset abstraction for the benchmark driver.
//!
//! A [`Dataset`] hands out the train vectors in batches and the test queries
//! with their ground-truth neighbors. Loaders are producers: the driver runs
//! one on its own thread through [`BatchProducer`], which buffers batches in
//! a bounded queue so parsing and upserting overlap.

use lattice_core::VectorWithId;
use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{error, info};

/// Errors raised by dataset loaders.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json parse error in {file}: {source}")]
    Json {
        file: String,
        source: serde_json::Error,
    },

    #[error("missing field \"{field}\" in {file}")]
    MissingField { field: String, file: String },

    #[error("dataset directory has no {0} files")]
    Empty(&'static str),
}

/// Result alias for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// One test query: the vector, its ground-truth neighbors, and the optional
/// filter attached to filtered-search runs.
#[derive(Debug, Clone, Default)]
pub struct TestEntry {
    pub vector_with_id: VectorWithId,
    /// Ground truth: neighbor id -> distance (0.0 when the source only
    /// lists ids).
    pub neighbors: HashMap<i64, f32>,
    /// LangChain structured-query JSON for filtered search; empty when the
    /// dataset carries no labels.
    pub filter_json: String,
    pub filter_vector_ids: Vec<i64>,
}

/// A benchmark dataset.
///
/// `init()` must be called before any other method. `next_batch` walks the
/// train set once; `test_data` returns every test query.
pub trait Dataset: Send {
    fn init(&mut self) -> Result<()>;

    fn dimension(&self) -> u32;
    fn train_count(&self) -> u32;
    fn test_count(&self) -> u32;

    /// Up to `batch_size` train vectors; the flag is true once the train
    /// set is exhausted.
    fn next_batch(&mut self, batch_size: u32) -> Result<(Vec<VectorWithId>, bool)>;

    /// All test queries.
    fn test_data(&mut self) -> Result<Vec<TestEntry>>;

    /// Loader name for reporting.
    fn kind(&self) -> &'static str;
}

// =============================================================================
// Producer thread with bounded queue
// =============================================================================

/// Handle to a dataset producer running on its own thread.
///
/// The producer fills a bounded queue; `next()` blocks until a batch is
/// ready and returns `None` once the train set is drained.
pub struct BatchProducer {
    receiver: Receiver<Vec<VectorWithId>>,
    handle: Option<JoinHandle<Result<u64>>>,
}

impl BatchProducer {
    /// Spawns the producer. `queue_depth` bounds the number of buffered
    /// batches; the producer blocks when the driver falls behind.
    pub fn spawn(
        mut dataset: Box<dyn Dataset>,
        batch_size: u32,
        queue_depth: usize,
    ) -> Self {
        let (sender, receiver): (SyncSender<_>, Receiver<_>) = sync_channel(queue_depth);

        let handle = std::thread::Builder::new()
            .name("dataset-producer".to_string())
            .spawn(move || -> Result<u64> {
                let mut produced: u64 = 0;
                loop {
                    let (batch, eof) = dataset.next_batch(batch_size)?;
                    if !batch.is_empty() {
                        produced += batch.len() as u64;
                        if sender.send(batch).is_err() {
                            // Driver hung up; stop producing.
                            return Ok(produced);
                        }
                    }
                    if eof {
                        info!(produced, "dataset producer finished");
                        return Ok(produced);
                    }
                }
            })
            .expect("failed to spawn dataset producer thread");

        Self {
            receiver,
            handle: Some(handle),
        }
    }

    /// The next buffered batch, or `None` when the producer is done.
    pub fn next(&self) -> Option<Vec<VectorWithId>> {
        self.receiver.recv().ok()
    }

    /// Waits for the producer and returns the number of vectors produced.
    pub fn join(mut self) -> Result<u64> {
        let handle = self.handle.take().expect("join called twice");
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                error!("dataset producer thread panicked");
                Ok(0)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::Vector;

    /// Emits `total` vectors in order, then eof.
    struct CountingDataset {
        total: u32,
        cursor: u32,
    }

    impl Dataset for CountingDataset {
        fn init(&mut self) -> Result<()> {
            Ok(())
        }

        fn dimension(&self) -> u32 {
            2
        }

        fn train_count(&self) -> u32 {
            self.total
        }

        fn test_count(&self) -> u32 {
            0
        }

        fn next_batch(&mut self, batch_size: u32) -> Result<(Vec<VectorWithId>, bool)> {
            let end = (self.cursor + batch_size).min(self.total);
            let batch = (self.cursor..end)
                .map(|i| VectorWithId::new(i as i64 + 1, Vector::from_floats(vec![i as f32, 0.0])))
                .collect();
            self.cursor = end;
            Ok((batch, self.cursor == self.total))
        }

        fn test_data(&mut self) -> Result<Vec<TestEntry>> {
            Ok(Vec::new())
        }

        fn kind(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn test_producer_delivers_everything_in_order() {
        let dataset = Box::new(CountingDataset {
            total: 100,
            cursor: 0,
        });
        let producer = BatchProducer::spawn(dataset, 7, 2);

        let mut seen = Vec::new();
        while let Some(batch) = producer.next() {
            assert!(batch.len() <= 7);
            seen.extend(batch.into_iter().map(|v| v.id));
        }
        assert_eq!(seen, (1..=100).collect::<Vec<i64>>());
        assert_eq!(producer.join().unwrap(), 100);
    }

    #[test]
    fn test_producer_with_slow_consumer() {
        // A tiny queue forces the producer to block on the consumer.
        let dataset = Box::new(CountingDataset {
            total: 50,
            cursor: 0,
        });
        let producer = BatchProducer::spawn(dataset, 5, 1);

        let mut count = 0;
        while let Some(batch) = producer.next() {
            std::thread::sleep(std::time::Duration::from_millis(1));
            count += batch.len();
        }
        assert_eq!(count, 50);
    }
}
