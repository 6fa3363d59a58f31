use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hive_common::jobs::JobManager;
use hive_common::{NodeId, TransactionId};
use hive_net::Endpoint;

use crate::executor::ServiceExecutor;
use crate::model::{ExecutorId, ServiceRequest, ServiceResponse, ServiceStatus};
use crate::pending::PendingTable;

/// Stub executor created when a registration advertisement arrives from a
/// peer (C7). Forwards calls over the messaging layer and resolves once
/// the matching `service-response` arrives, or the pending-RPC sweeper
/// times it out.
pub struct RemoteServiceExecutor {
    executor_id: ExecutorId,
    service_name: String,
    peer_node_id: NodeId,
    endpoint: Arc<Endpoint>,
    pending: Arc<PendingTable>,
    call_timeout: Duration,
    callable: AtomicBool,
}

impl RemoteServiceExecutor {
    pub fn new(
        service_name: impl Into<String>,
        peer_node_id: NodeId,
        endpoint: Arc<Endpoint>,
        pending: Arc<PendingTable>,
        call_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            executor_id: ExecutorId::new(),
            service_name: service_name.into(),
            peer_node_id,
            endpoint,
            pending,
            call_timeout,
            callable: AtomicBool::new(true),
        })
    }

    pub fn peer_node_id(&self) -> NodeId {
        self.peer_node_id
    }

    /// Marks this stub uncallable once its connection is known to be
    /// gone, so the caller (C5) stops selecting it without needing to
    /// probe the connection on every call.
    pub fn mark_unreachable(&self) {
        self.callable.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceExecutor for RemoteServiceExecutor {
    fn executor_id(&self) -> ExecutorId {
        self.executor_id
    }

    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn is_local(&self) -> bool {
        false
    }

    fn is_callable(&self) -> bool {
        self.callable.load(Ordering::SeqCst) && self.endpoint.connection_for(self.peer_node_id).is_some()
    }

    async fn issue_call_as_job(
        &self,
        request: ServiceRequest,
        _job_manager: &JobManager,
    ) -> ServiceResponse {
        let transaction_id = TransactionId::new();
        let receiver = self.pending.register(transaction_id, self.call_timeout);
        let message = request.to_message(transaction_id);

        if let Err(err) = self.endpoint.send_to(self.peer_node_id, message).await {
            let response = ServiceResponse::error(ServiceStatus::InternalError, format!("call failed: {err}"));
            self.pending.complete(transaction_id, response.clone());
            return response;
        }

        receiver.await.unwrap_or_else(|_| {
            ServiceResponse::error(ServiceStatus::InternalError, "pending RPC dropped")
        })
    }
}
