//! Vector upsert task.
//!
//! Routes each input vector to the region owning its id and issues one
//! `VectorAdd(is_update = true)` RPC per region. Acknowledged ids leave the
//! pending set; the first failure is latched. The operation is idempotent at
//! the id level, so the still-pending set after a failure is safe to replay.

use crate::error::{ClientError, Result};
use crate::index::IndexDescriptor;
use crate::rpc::VectorAddRequest;
use crate::task::planner::{self, RegionGroup};
use crate::task::{FanIn, StatusCell, TaskContext};
use lattice_core::{IndexId, VectorWithId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{trace, warn};

/// Single-use task: construct, `init()`, then `run().await`.
pub struct VectorUpsertTask {
    context: TaskContext,
    index_id: IndexId,
    vectors: Vec<VectorWithId>,
    index: RwLock<Option<Arc<IndexDescriptor>>>,
    /// id -> position in `vectors`; acknowledged ids are removed.
    pending: RwLock<HashMap<i64, usize>>,
    status: StatusCell,
    fan_in: FanIn,
}

impl VectorUpsertTask {
    pub fn new(context: TaskContext, index_id: IndexId, vectors: Vec<VectorWithId>) -> Self {
        Self {
            context,
            index_id,
            vectors,
            index: RwLock::new(None),
            pending: RwLock::new(HashMap::new()),
            status: StatusCell::new(),
            fan_in: FanIn::new(),
        }
    }

    /// Validates the input and resolves the index descriptor.
    ///
    /// Rejects an empty input, any non-positive id, and duplicate ids
    /// before any RPC is scheduled.
    pub fn init(&self) -> Result<()> {
        if self.vectors.is_empty() {
            return Err(ClientError::InvalidArgument(
                "vectors is empty, nothing to upsert".to_string(),
            ));
        }

        let index = self.context.index_cache.get(self.index_id)?;
        *self.index.write().unwrap() = Some(index);

        for vector in &self.vectors {
            if vector.id <= 0 {
                return Err(ClientError::InvalidArgument(format!(
                    "vector id must be positive, got {}",
                    vector.id
                )));
            }
        }

        let mut pending = self.pending.write().unwrap();
        pending.clear();
        for (idx, vector) in self.vectors.iter().enumerate() {
            if pending.insert(vector.id, idx).is_some() {
                return Err(ClientError::InvalidArgument(format!(
                    "duplicate vector id: {}",
                    vector.id
                )));
            }
        }

        Ok(())
    }

    /// Fans the upsert out to the owning regions and awaits completion.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let index = self
            .index
            .read()
            .unwrap()
            .clone()
            .expect("init() must succeed before run()");

        let batch: Vec<i64> = {
            let pending = self.pending.write().unwrap();
            pending.keys().copied().collect()
        };
        if batch.is_empty() {
            return Ok(());
        }

        let groups =
            planner::group_by_owning_region(&index, batch, self.context.topology.as_ref())?;

        let done = self.fan_in.install();
        self.fan_in.arm(groups.len() as u32);

        for group in groups {
            let request = self.build_request(&group);
            let task = Arc::clone(&self);
            tokio::spawn(async move {
                let result = task
                    .context
                    .controller
                    .vector_add(&group.region, &request)
                    .await;
                task.on_add_complete(&group, &request, result);
            });
        }

        let _ = done.await;
        self.status.snapshot()
    }

    /// Ids not yet acknowledged; non-empty after a failed run and safe to
    /// replay.
    pub fn pending_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.pending.read().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn build_request(&self, group: &RegionGroup) -> VectorAddRequest {
        let pending = self.pending.read().unwrap();
        let vectors = group
            .ids
            .iter()
            .filter_map(|id| pending.get(id))
            .map(|&idx| self.vectors[idx].clone())
            .collect();
        VectorAddRequest {
            is_update: true,
            vectors,
        }
    }

    fn on_add_complete(
        &self,
        group: &RegionGroup,
        request: &VectorAddRequest,
        result: Result<crate::rpc::VectorAddResponse>,
    ) {
        match result {
            Err(err) => {
                warn!(
                    region_id = group.region.region_id,
                    error = %err,
                    "vector add rpc failed"
                );
                self.status.latch(err);
            }
            Ok(response) => {
                trace!(
                    region_id = group.region.region_id,
                    request = ?request,
                    response = ?response,
                    "vector add rpc ok"
                );
                let mut pending = self.pending.write().unwrap();
                for vector in &request.vectors {
                    pending.remove(&vector.id);
                }
            }
        }

        if self.fan_in.complete_one() {
            self.fan_in.finish();
        }
    }
}
