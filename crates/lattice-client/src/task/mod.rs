//! Task framework: fanout, fan-in, and shared task state.
//!
//! A task is the unit of one logical request. Its lifecycle:
//!
//! 1. `init()` - synchronous validation and descriptor resolution; every
//!    error here surfaces before any RPC is scheduled.
//! 2. `run()` - plans the fanout, spawns one future per region RPC, and
//!    awaits the fan-in. Each RPC completion merges its partial result (or
//!    latches the first error) under the task's write lock, then decrements
//!    the fan-in counter; the completion observing the 1 -> 0 transition owns
//!    the completion path and fires the oneshot exactly once.
//! 3. The awaited completion snapshots the latched status under the read
//!    lock; on failure, accumulated partial results are discarded.
//!
//! Tasks are single-use: one logical request per instance. Every spawned
//! callback holds an `Arc` of its task, so the task outlives all of its RPCs
//! without further coordination.

pub(crate) mod planner;

pub mod batch_query;
pub mod search;
pub mod upsert;

use crate::controller::RpcController;
use crate::error::{ClientError, Result};
use crate::index::IndexCache;
use crate::topology::TopologyCache;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::debug;

/// Shared collaborators injected into every task.
///
/// These replace process-wide singletons: the metadata cache, the descriptor
/// cache, and the retrying RPC controller are explicit dependencies.
#[derive(Clone)]
pub struct TaskContext {
    pub topology: Arc<dyn TopologyCache>,
    pub index_cache: Arc<dyn IndexCache>,
    pub controller: Arc<RpcController>,
}

impl TaskContext {
    pub fn new(
        topology: Arc<dyn TopologyCache>,
        index_cache: Arc<dyn IndexCache>,
        controller: Arc<RpcController>,
    ) -> Self {
        Self {
            topology,
            index_cache,
            controller,
        }
    }
}

// =============================================================================
// First-error latch
// =============================================================================

/// Holds the first non-OK result observed by a task.
///
/// All writers take the write lock, so latching is race-free; later failures
/// are logged and dropped. Arrival order among concurrent failures is
/// arbitrary.
pub(crate) struct StatusCell {
    inner: RwLock<Option<ClientError>>,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Latches `err` if no error is held yet.
    pub(crate) fn latch(&self, err: ClientError) {
        let mut guard = self.inner.write().unwrap();
        match guard.as_ref() {
            None => *guard = Some(err),
            Some(first) => {
                debug!(dropped = %err, kept = %first, "error already latched");
            }
        }
    }

    /// True while no error is latched.
    pub(crate) fn is_ok(&self) -> bool {
        self.inner.read().unwrap().is_none()
    }

    /// Snapshots the final status under the read lock.
    pub(crate) fn snapshot(&self) -> Result<()> {
        match self.inner.read().unwrap().as_ref() {
            None => Ok(()),
            Some(err) => Err(err.clone()),
        }
    }
}

// =============================================================================
// Fan-in
// =============================================================================

/// Atomic fan-in counter plus the completion signal.
///
/// `complete_one()` returns true for exactly one caller - the one that
/// decrements the counter to zero and therefore owns the completion path.
/// The search part task re-arms the counter for its brute-force round before
/// finally calling `finish()`.
pub(crate) struct FanIn {
    pending: AtomicU32,
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl FanIn {
    pub(crate) fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            done_tx: Mutex::new(None),
        }
    }

    /// Installs the completion signal; returns the receiver the task awaits.
    pub(crate) fn install(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.done_tx.lock().unwrap() = Some(tx);
        rx
    }

    /// Sets the number of in-flight sub-tasks for the next round.
    pub(crate) fn arm(&self, count: u32) {
        self.pending.store(count, Ordering::Release);
    }

    /// Records one completion; true if the caller observed the 1 -> 0
    /// transition and owns the completion path.
    pub(crate) fn complete_one(&self) -> bool {
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Fires the completion signal. Idempotent; only the first call sends.
    pub(crate) fn finish(&self) {
        if let Some(tx) = self.done_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
