use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use hive_common::jobs::{JobContinuation, JobManager, JobPhase, TimerJob};
use hive_common::NodeId;
use hive_net::{
    ConnectionInfo, ConsumerRegistry, Endpoint, Message, MessageConsumer, TYPE_SERVICE_REGISTRATION,
    TYPE_SERVICE_REQUEST, TYPE_SERVICE_RESPONSE,
};

use crate::caller::ServiceCaller;
use crate::executor::ServiceExecutor;
use crate::local::LocalServiceExecutor;
use crate::model::{ExecutorId, ServiceRequest, ServiceResponse, ServiceStatus};
use crate::pending::PendingTable;
use crate::remote::RemoteServiceExecutor;
use crate::retry::RetryPolicy;

/// Shared state behind the registry's three inbound consumers and its
/// public handle. Kept separate from [`ServiceRegistry`] itself so the
/// consumers can hold an `Arc<Inner>` without a reference cycle back
/// through the registry's own consumer list.
struct Inner {
    callers: DashMap<String, Arc<ServiceCaller>>,
    pending: Arc<PendingTable>,
    endpoint: Arc<Endpoint>,
    job_manager: JobManager,
    call_timeout: Duration,
}

impl Inner {
    fn caller_for(&self, service_name: &str) -> Arc<ServiceCaller> {
        self.callers
            .entry(service_name.to_string())
            .or_insert_with(|| ServiceCaller::new(service_name))
            .clone()
    }
}

/// Holds callers by service name, broadcasts local registrations, and
/// routes inbound requests/responses (C8).
pub struct ServiceRegistry {
    inner: Arc<Inner>,
    // Kept alive for as long as the registry is; dropping the registry
    // lets these consumers expire from `hive-net`'s weak-referenced table.
    _registration_consumer: Arc<dyn MessageConsumer>,
    _request_consumer: Arc<dyn MessageConsumer>,
    _response_consumer: Arc<dyn MessageConsumer>,
}

impl ServiceRegistry {
    pub fn new(
        endpoint: Arc<Endpoint>,
        consumer_registry: Arc<ConsumerRegistry>,
        job_manager: JobManager,
        call_timeout: Duration,
        sweep_interval: Duration,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            callers: DashMap::new(),
            pending: PendingTable::new(),
            endpoint,
            job_manager: job_manager.clone(),
            call_timeout,
        });

        let registration_consumer: Arc<dyn MessageConsumer> =
            Arc::new(RegistrationConsumer { inner: inner.clone() });
        let request_consumer: Arc<dyn MessageConsumer> =
            Arc::new(RequestConsumer { inner: inner.clone() });
        let response_consumer: Arc<dyn MessageConsumer> =
            Arc::new(ResponseConsumer { inner: inner.clone() });

        consumer_registry.register(&registration_consumer);
        consumer_registry.register(&request_consumer);
        consumer_registry.register(&response_consumer);

        let registry = Arc::new(Self {
            inner: inner.clone(),
            _registration_consumer: registration_consumer,
            _request_consumer: request_consumer,
            _response_consumer: response_consumer,
        });

        registry.start_pending_sweeper(sweep_interval);
        registry
    }

    fn start_pending_sweeper(&self, interval: Duration) {
        let inner = self.inner.clone();
        let job = TimerJob::shared(JobPhase::CleanUp, false, interval, move |_ctx| {
            let inner = inner.clone();
            async move {
                inner.pending.sweep_timed_out();
                JobContinuation::Requeue
            }
        });
        self.inner.job_manager.kick_job(job);
    }

    /// Registers `executor`. If it is local, broadcasts a
    /// `service-registration` message on every live connection so peers
    /// can build a [`RemoteServiceExecutor`] stub for it.
    pub async fn register(&self, executor: Arc<dyn ServiceExecutor>) {
        let caller = self.inner.caller_for(executor.service_name());
        let is_local = executor.is_local();
        let service_name = executor.service_name().to_string();
        caller.add_executor(executor);

        if is_local {
            let message = Message::new(TYPE_SERVICE_REGISTRATION)
                .with_attribute("service-name", service_name);
            self.inner.endpoint.broadcast(message).await;
        }
    }

    /// Convenience wrapper for registering a local function-backed
    /// service (C6).
    pub async fn register_local(
        &self,
        service_name: impl Into<String>,
        max_concurrent_calls: usize,
        function: crate::local::LocalServiceFn,
    ) -> Arc<LocalServiceExecutor> {
        let service_name = service_name.into();
        let executor = LocalServiceExecutor::new(service_name, max_concurrent_calls, function);
        self.register(executor.clone()).await;
        executor
    }

    pub fn unregister_all(&self, service_name: &str) {
        self.inner.callers.remove(service_name);
    }

    pub fn unregister(&self, service_name: &str, executor_id: ExecutorId) {
        if let Some(caller) = self.inner.callers.get(service_name) {
            caller.remove_executor(executor_id);
        }
    }

    /// Returns the caller for `name` if it is present and callable.
    /// "Callable" means at least one executor reports callable, and, if
    /// `only_local` is set, at least one *local* executor is callable.
    pub fn find(&self, name: &str, only_local: bool) -> Option<Arc<ServiceCaller>> {
        let caller = self.inner.callers.get(name)?.clone();
        let callable = if only_local {
            caller.contains_locally_callable()
        } else {
            caller.is_callable()
        };
        callable.then_some(caller)
    }

    pub async fn call(
        &self,
        request: ServiceRequest,
        only_local: bool,
        is_async: bool,
        retry_policy: RetryPolicy,
    ) -> ServiceResponse {
        match self.find(&request.service_name, only_local) {
            Some(caller) => {
                caller
                    .issue_call_as_job(request, &self.inner.job_manager, only_local, is_async, retry_policy)
                    .await
            }
            None => ServiceResponse::error(
                ServiceStatus::Gone,
                format!("no callable service {}", request.service_name),
            ),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }
}

struct RegistrationConsumer {
    inner: Arc<Inner>,
}

#[async_trait]
impl MessageConsumer for RegistrationConsumer {
    fn message_type(&self) -> &str {
        TYPE_SERVICE_REGISTRATION
    }

    async fn process_received_message(&self, message: Message, connection: ConnectionInfo) {
        let Some(service_name) = message.attributes.get("service-name") else {
            return;
        };
        let Some(peer_node_id) = connection.remote_node_id else {
            return;
        };

        let executor: Arc<dyn ServiceExecutor> = RemoteServiceExecutor::new(
            service_name.clone(),
            peer_node_id,
            self.inner.endpoint.clone(),
            self.inner.pending.clone(),
            self.inner.call_timeout,
        );
        self.inner.caller_for(service_name).add_executor(executor);
    }
}

struct RequestConsumer {
    inner: Arc<Inner>,
}

#[async_trait]
impl MessageConsumer for RequestConsumer {
    fn message_type(&self) -> &str {
        TYPE_SERVICE_REQUEST
    }

    async fn process_received_message(&self, message: Message, connection: ConnectionInfo) {
        let Some(transaction_id_raw) = message.attributes.get("transaction-id").cloned() else {
            return;
        };
        let Ok(transaction_id) = hive_common::TransactionId::parse(&transaction_id_raw) else {
            return;
        };
        let Some(peer_node_id) = connection.remote_node_id else {
            return;
        };
        let Some(request) = ServiceRequest::from_message(&message) else {
            return;
        };

        let response = match self.inner.callers.get(&request.service_name) {
            Some(caller) if caller.contains_locally_callable() => {
                caller
                    .clone()
                    .issue_call_as_job(request, &self.inner.job_manager, true, true, RetryPolicy::default())
                    .await
            }
            _ => ServiceResponse::error(ServiceStatus::Gone, "service not locally available"),
        };

        let response_message = response.to_message(transaction_id);
        if let Err(err) = self.inner.endpoint.send_to(peer_node_id, response_message).await {
            tracing::warn!(peer = %peer_node_id, error = %err, "failed to send service-response");
        }
    }
}

struct ResponseConsumer {
    inner: Arc<Inner>,
}

#[async_trait]
impl MessageConsumer for ResponseConsumer {
    fn message_type(&self) -> &str {
        TYPE_SERVICE_RESPONSE
    }

    async fn process_received_message(&self, message: Message, _connection: ConnectionInfo) {
        if let Some((transaction_id, response)) = ServiceResponse::from_message(&message) {
            self.inner.pending.complete(transaction_id, response);
        }
    }
}
