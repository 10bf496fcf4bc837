//! Retrying RPC controller.
//!
//! Wraps the raw [`RegionRpc`] transport with the per-attempt deadline,
//! bounded retries with exponential backoff, and the epoch-refresh round:
//! on [`ClientError::EpochMismatch`] the cached region is invalidated and
//! re-looked-up once, then the request is re-sent against the fresh epoch.
//! A successful refresh is invisible to the task layer.

use crate::config::RpcConfig;
use crate::error::{ClientError, Result};
use crate::rpc::{
    DocumentQueryRequest, DocumentQueryResponse, RegionRpc, RpcContext, VectorAddRequest,
    VectorAddResponse, VectorSearchRequest, VectorSearchResponse,
};
use crate::topology::{Region, TopologyCache};
use std::future::Future;
use std::sync::Arc;
use tracing::{trace, warn};

/// Shared, thread-safe controller; one instance serves every task.
pub struct RpcController {
    topology: Arc<dyn TopologyCache>,
    transport: Arc<dyn RegionRpc>,
    config: RpcConfig,
}

impl RpcController {
    pub fn new(
        topology: Arc<dyn TopologyCache>,
        transport: Arc<dyn RegionRpc>,
        config: RpcConfig,
    ) -> Self {
        Self {
            topology,
            transport,
            config,
        }
    }

    pub async fn vector_add(
        &self,
        region: &Region,
        request: &VectorAddRequest,
    ) -> Result<VectorAddResponse> {
        self.call("VectorAdd", region, request, |rpc, ctx, req| async move {
            rpc.vector_add(&ctx, &req).await
        })
        .await
    }

    pub async fn vector_search(
        &self,
        region: &Region,
        request: &VectorSearchRequest,
    ) -> Result<VectorSearchResponse> {
        self.call("VectorSearch", region, request, |rpc, ctx, req| async move {
            rpc.vector_search(&ctx, &req).await
        })
        .await
    }

    pub async fn document_query(
        &self,
        region: &Region,
        request: &DocumentQueryRequest,
    ) -> Result<DocumentQueryResponse> {
        self.call("DocumentBatchQuery", region, request, |rpc, ctx, req| async move {
            rpc.document_query(&ctx, &req).await
        })
        .await
    }

    /// Drives one logical request to completion: deadline per attempt,
    /// backoff between transport failures, one epoch-refresh round.
    async fn call<Req, Resp, F, Fut>(
        &self,
        method: &'static str,
        region: &Region,
        request: &Req,
        send: F,
    ) -> Result<Resp>
    where
        Req: Clone,
        F: Fn(Arc<dyn RegionRpc>, RpcContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp>>,
    {
        let mut target = region.clone();
        let mut backoff = self.config.backoff();
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            let ctx = RpcContext {
                region_id: target.region_id,
                epoch: target.epoch,
            };
            trace!(
                method,
                region_id = target.region_id,
                attempt,
                "sending rpc"
            );

            let outcome = tokio::time::timeout(
                self.config.timeout(),
                send(Arc::clone(&self.transport), ctx, request.clone()),
            )
            .await
            .unwrap_or(Err(ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }));

            match outcome {
                Ok(response) => return Ok(response),
                Err(ClientError::EpochMismatch { region_id }) if !refreshed => {
                    refreshed = true;
                    self.topology.invalidate(region_id);
                    let fresh = self.topology.lookup_region(&target.range.start)?;
                    trace!(
                        method,
                        stale = region_id,
                        fresh = fresh.region_id,
                        "epoch refreshed"
                    );
                    target = (*fresh).clone();
                    // The refresh round does not consume a retry attempt.
                }
                Err(err) if err.is_retryable() && attempt + 1 < self.config.max_retries => {
                    warn!(
                        method,
                        region_id = target.region_id,
                        attempt,
                        error = %err,
                        "rpc attempt failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
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
    use crate::codec::{partition_end_key, partition_start_key};
    use crate::rpc::VectorAddRequest;
    use crate::topology::{KeyRange, RegionEpoch, StaticTopology};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn test_region(region_id: i64, version: i64) -> Region {
        Region::new(
            region_id,
            RegionEpoch::new(1, version),
            KeyRange::new(partition_start_key(0), partition_end_key(0)),
        )
    }

    /// Transport scripted with a per-call outcome sequence.
    struct ScriptedTransport {
        script: Mutex<Vec<Result<VectorAddResponse>>>,
        calls: AtomicU32,
        seen_epochs: Mutex<Vec<RegionEpoch>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<VectorAddResponse>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                seen_epochs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RegionRpc for ScriptedTransport {
        async fn vector_add(
            &self,
            ctx: &RpcContext,
            _request: &VectorAddRequest,
        ) -> Result<VectorAddResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_epochs.lock().unwrap().push(ctx.epoch);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(VectorAddResponse::default())
            } else {
                script.remove(0)
            }
        }

        async fn vector_search(
            &self,
            _ctx: &RpcContext,
            _request: &VectorSearchRequest,
        ) -> Result<VectorSearchResponse> {
            unimplemented!("not used in controller tests")
        }

        async fn document_query(
            &self,
            _ctx: &RpcContext,
            _request: &DocumentQueryRequest,
        ) -> Result<DocumentQueryResponse> {
            unimplemented!("not used in controller tests")
        }
    }

    fn controller(transport: Arc<ScriptedTransport>, topology: Arc<StaticTopology>) -> RpcController {
        let config = RpcConfig {
            timeout_ms: 200,
            max_retries: 3,
            backoff_ms: 1,
        };
        RpcController::new(topology, transport, config)
    }

    fn add_request() -> VectorAddRequest {
        VectorAddRequest {
            is_update: true,
            vectors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_retries_transport_errors() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ClientError::Transport("reset".into())),
            Err(ClientError::Transport("reset".into())),
            Ok(VectorAddResponse::default()),
        ]));
        let topology = Arc::new(StaticTopology::new(vec![test_region(10, 1)]));

        let result = controller(Arc::clone(&transport), topology)
            .vector_add(&test_region(10, 1), &add_request())
            .await;
        assert!(result.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bounded_attempts() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ClientError::Transport("reset".into())),
            Err(ClientError::Transport("reset".into())),
            Err(ClientError::Transport("reset".into())),
            Ok(VectorAddResponse::default()),
        ]));
        let topology = Arc::new(StaticTopology::new(vec![test_region(10, 1)]));

        let result = controller(Arc::clone(&transport), topology)
            .vector_add(&test_region(10, 1), &add_request())
            .await;
        assert_eq!(result, Err(ClientError::Transport("reset".into())));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(ClientError::Server {
            code: 30001,
            message: "region busy".into(),
        })]));
        let topology = Arc::new(StaticTopology::new(vec![test_region(10, 1)]));

        let result = controller(Arc::clone(&transport), topology)
            .vector_add(&test_region(10, 1), &add_request())
            .await;
        assert!(matches!(result, Err(ClientError::Server { code: 30001, .. })));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_epoch_refresh_then_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ClientError::EpochMismatch { region_id: 10 }),
            Ok(VectorAddResponse::default()),
        ]));
        let topology = Arc::new(StaticTopology::new(vec![test_region(10, 1)]));
        // The refreshed view carries a newer epoch for the same range.
        topology.stage(vec![test_region(10, 2)]);

        let result = controller(Arc::clone(&transport), Arc::clone(&topology))
            .vector_add(&test_region(10, 1), &add_request())
            .await;
        assert!(result.is_ok());

        let epochs = transport.seen_epochs.lock().unwrap();
        assert_eq!(epochs[0].version, 1);
        assert_eq!(epochs[1].version, 2);
    }

    #[tokio::test]
    async fn test_epoch_refresh_only_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(ClientError::EpochMismatch { region_id: 10 }),
            Err(ClientError::EpochMismatch { region_id: 10 }),
        ]));
        let topology = Arc::new(StaticTopology::new(vec![test_region(10, 1)]));
        topology.stage(vec![test_region(10, 2)]);

        let result = controller(Arc::clone(&transport), topology)
            .vector_add(&test_region(10, 1), &add_request())
            .await;
        assert_eq!(result, Err(ClientError::EpochMismatch { region_id: 10 }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
