//! Document batch-query task.
//!
//! Looks up a set of documents by id: ids are grouped by owning region, one
//! RPC per region, and the surviving rows are concatenated. The server
//! returns exactly one entry per requested id; missing documents come back
//! with `id == 0` and are dropped. Output ordering is unspecified.

use crate::error::{ClientError, Result};
use crate::index::IndexDescriptor;
use crate::rpc::{DocumentQueryRequest, DocumentQueryResponse};
use crate::task::planner::{self, RegionGroup};
use crate::task::{FanIn, StatusCell, TaskContext};
use lattice_core::{Document, IndexId};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::{trace, warn};

/// Projection options for a batch query.
#[derive(Debug, Clone, Default)]
pub struct BatchQueryParam {
    pub with_scalar_data: bool,
    /// Honored only when `with_scalar_data` is set.
    pub selected_keys: Vec<String>,
}

/// Single-use task: construct, `init()`, then `run().await`.
pub struct DocumentBatchQueryTask {
    context: TaskContext,
    index_id: IndexId,
    doc_ids: Vec<i64>,
    param: BatchQueryParam,
    index: RwLock<Option<Arc<IndexDescriptor>>>,
    pending: RwLock<BTreeSet<i64>>,
    docs: RwLock<Vec<Document>>,
    status: StatusCell,
    fan_in: FanIn,
}

impl DocumentBatchQueryTask {
    pub fn new(
        context: TaskContext,
        index_id: IndexId,
        doc_ids: Vec<i64>,
        param: BatchQueryParam,
    ) -> Self {
        Self {
            context,
            index_id,
            doc_ids,
            param,
            index: RwLock::new(None),
            pending: RwLock::new(BTreeSet::new()),
            docs: RwLock::new(Vec::new()),
            status: StatusCell::new(),
            fan_in: FanIn::new(),
        }
    }

    /// Validates ids (non-empty, positive, unique) and resolves the index.
    pub fn init(&self) -> Result<()> {
        if self.doc_ids.is_empty() {
            return Err(ClientError::InvalidArgument(
                "doc_ids is empty, nothing to query".to_string(),
            ));
        }

        {
            let mut pending = self.pending.write().unwrap();
            pending.clear();
            for &id in &self.doc_ids {
                if id <= 0 {
                    return Err(ClientError::InvalidArgument(format!(
                        "invalid document id: {id}"
                    )));
                }
                if !pending.insert(id) {
                    return Err(ClientError::InvalidArgument(format!(
                        "duplicate document id: {id}"
                    )));
                }
            }
        }

        let index = self.context.index_cache.get(self.index_id)?;
        *self.index.write().unwrap() = Some(index);
        Ok(())
    }

    /// Fans the lookup out and returns the surviving documents.
    pub async fn run(self: Arc<Self>) -> Result<Vec<Document>> {
        let index = self
            .index
            .read()
            .unwrap()
            .clone()
            .expect("init() must succeed before run()");

        let batch: Vec<i64> = {
            let pending = self.pending.write().unwrap();
            pending.iter().copied().collect()
        };
        if batch.is_empty() {
            return Ok(Vec::new());
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
                    .document_query(&group.region, &request)
                    .await;
                task.on_query_complete(&group, &request, result);
            });
        }

        let _ = done.await;
        self.status.snapshot()?;
        Ok(std::mem::take(&mut *self.docs.write().unwrap()))
    }

    fn build_request(&self, group: &RegionGroup) -> DocumentQueryRequest {
        DocumentQueryRequest {
            document_ids: group.ids.clone(),
            without_scalar_data: !self.param.with_scalar_data,
            selected_keys: if self.param.with_scalar_data {
                self.param.selected_keys.clone()
            } else {
                Vec::new()
            },
        }
    }

    fn on_query_complete(
        &self,
        group: &RegionGroup,
        request: &DocumentQueryRequest,
        result: Result<DocumentQueryResponse>,
    ) {
        match result {
            Err(err) => {
                warn!(
                    region_id = group.region.region_id,
                    error = %err,
                    "document query rpc failed"
                );
                self.status.latch(err);
            }
            Ok(response) => {
                trace!(
                    region_id = group.region.region_id,
                    request = ?request,
                    response = ?response,
                    "document query rpc ok"
                );
                if response.documents.len() != request.document_ids.len() {
                    warn!(
                        region_id = group.region.region_id,
                        requested = request.document_ids.len(),
                        returned = response.documents.len(),
                        "document count mismatch in response"
                    );
                }

                let mut docs = self.docs.write().unwrap();
                for doc in &response.documents {
                    if doc.id > 0 {
                        docs.push(doc.clone());
                    }
                }
                drop(docs);

                let mut pending = self.pending.write().unwrap();
                for id in &request.document_ids {
                    pending.remove(id);
                }
            }
        }

        if self.fan_in.complete_one() {
            self.fan_in.finish();
        }
    }
}
