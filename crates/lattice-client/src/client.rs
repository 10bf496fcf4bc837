//! Client facade.
//!
//! Binds the injected collaborators (topology cache, index descriptor cache,
//! raw transport) to the retrying controller and exposes one method per
//! logical operation. Each call builds a single-use task, validates it
//! synchronously, then drives it to completion.

use crate::config::ClientConfig;
use crate::controller::RpcController;
use crate::error::Result;
use crate::index::IndexCache;
use crate::param::SearchParam;
use crate::rpc::RegionRpc;
use crate::task::batch_query::{BatchQueryParam, DocumentBatchQueryTask};
use crate::task::search::VectorSearchTask;
use crate::task::upsert::VectorUpsertTask;
use crate::task::TaskContext;
use crate::topology::TopologyCache;
use lattice_core::{Document, IndexId, SearchResult, VectorWithId};
use std::sync::Arc;
use tracing::warn;

/// Entry point of the SDK.
///
/// Cheap to clone; all collaborators are shared. Every dependency is
/// explicit; there are no process-wide singletons behind the API.
#[derive(Clone)]
pub struct LatticeClient {
    context: TaskContext,
}

impl LatticeClient {
    pub fn new(
        topology: Arc<dyn TopologyCache>,
        index_cache: Arc<dyn IndexCache>,
        transport: Arc<dyn RegionRpc>,
        config: ClientConfig,
    ) -> Self {
        let controller = Arc::new(RpcController::new(
            Arc::clone(&topology),
            transport,
            config.rpc.clone(),
        ));
        Self {
            context: TaskContext::new(topology, index_cache, controller),
        }
    }

    /// The shared task context, for callers constructing tasks directly
    /// (e.g. to read [`VectorUpsertTask::pending_ids`] after a failure).
    pub fn task_context(&self) -> TaskContext {
        self.context.clone()
    }

    /// Upserts a batch of vectors. Ids must be positive and unique.
    ///
    /// On failure the whole call fails; the acknowledged subset is durable
    /// on the server and replaying the full batch is safe.
    pub async fn upsert(&self, index_id: IndexId, vectors: Vec<VectorWithId>) -> Result<()> {
        let task = Arc::new(VectorUpsertTask::new(
            self.context.clone(),
            index_id,
            vectors,
        ));
        task.init()?;
        let outcome = Arc::clone(&task).run().await;
        if outcome.is_err() {
            warn!(
                index_id,
                pending = task.pending_ids().len(),
                "upsert failed with unacknowledged ids"
            );
        }
        outcome
    }

    /// Searches the index with a batch of query vectors; returns one result
    /// per query, in input order.
    pub async fn search(
        &self,
        index_id: IndexId,
        param: SearchParam,
        target_vectors: Vec<VectorWithId>,
    ) -> Result<Vec<SearchResult>> {
        let task = Arc::new(VectorSearchTask::new(
            self.context.clone(),
            index_id,
            param,
            target_vectors,
        ));
        task.init()?;
        task.run().await
    }

    /// Looks up documents by id. Ids must be positive and unique; missing
    /// documents are absent from the output.
    pub async fn batch_query(
        &self,
        index_id: IndexId,
        doc_ids: Vec<i64>,
        param: BatchQueryParam,
    ) -> Result<Vec<Document>> {
        let task = Arc::new(DocumentBatchQueryTask::new(
            self.context.clone(),
            index_id,
            doc_ids,
            param,
        ));
        task.init()?;
        task.run().await
    }
}
