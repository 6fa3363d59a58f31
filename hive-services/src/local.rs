use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use hive_common::jobs::{Job, JobContinuation, JobManager, JobPhase};
use tokio::sync::oneshot;

use crate::executor::ServiceExecutor;
use crate::model::{ExecutorId, ServiceRequest, ServiceResponse, ServiceStatus};

pub type LocalServiceFn = Arc<dyn Fn(ServiceRequest) -> BoxFuture<'static, ServiceResponse> + Send + Sync>;

/// Wraps a function as a callable local service (C6), enforcing an
/// optional concurrency cap. `max_concurrent_calls == 0` means unlimited.
pub struct LocalServiceExecutor {
    executor_id: ExecutorId,
    service_name: String,
    function: LocalServiceFn,
    max_concurrent_calls: usize,
    current_concurrent_calls: AtomicUsize,
}

impl LocalServiceExecutor {
    pub fn new(
        service_name: impl Into<String>,
        max_concurrent_calls: usize,
        function: LocalServiceFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            executor_id: ExecutorId::new(),
            service_name: service_name.into(),
            function,
            max_concurrent_calls,
            current_concurrent_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ServiceExecutor for LocalServiceExecutor {
    fn executor_id(&self) -> ExecutorId {
        self.executor_id
    }

    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn is_local(&self) -> bool {
        true
    }

    fn is_callable(&self) -> bool {
        self.max_concurrent_calls == 0
            || self.current_concurrent_calls.load(Ordering::SeqCst) < self.max_concurrent_calls
    }

    async fn issue_call_as_job(
        &self,
        request: ServiceRequest,
        job_manager: &JobManager,
    ) -> ServiceResponse {
        // Atomically check-and-reserve a concurrency slot before kicking
        // the job, so two concurrent callers never both observe capacity.
        if self.max_concurrent_calls > 0 {
            let reserved = self
                .current_concurrent_calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    if current < self.max_concurrent_calls {
                        Some(current + 1)
                    } else {
                        None
                    }
                });
            if reserved.is_err() {
                return ServiceResponse::error(ServiceStatus::Busy, "executor at capacity");
            }
        } else {
            self.current_concurrent_calls.fetch_add(1, Ordering::SeqCst);
        }

        let function = self.function.clone();
        let (tx, rx) = oneshot::channel();
        // `oneshot::Sender::send` consumes `self`, but the workload closure
        // must stay callable (it needs `Fn`, not `FnOnce`, to support
        // `Requeue`); this job never requeues, so a `take()`'d option is
        // sent exactly once on its single execution.
        let tx = Arc::new(Mutex::new(Some(tx)));
        let job = Job::shared(JobPhase::Main, true, move |_ctx| {
            let function = function.clone();
            let request = request.clone();
            let tx = tx.clone();
            async move {
                let response = std::panic::AssertUnwindSafe(function(request))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        ServiceResponse::error(ServiceStatus::InternalError, "service call panicked")
                    });
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(response);
                }
                JobContinuation::Dispose
            }
        });
        job_manager.kick_job(job);

        let response = rx.await.unwrap_or_else(|_| {
            ServiceResponse::error(ServiceStatus::InternalError, "service call job was dropped")
        });
        self.current_concurrent_calls.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_common::jobs::JobManagerConfig;
    use hive_common::ValueMap;

    #[tokio::test]
    async fn saturated_executor_answers_busy_then_recovers() {
        let manager = JobManager::new(JobManagerConfig::default());
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate_wait = gate.clone();

        let function: LocalServiceFn = Arc::new(move |_req| {
            let gate_wait = gate_wait.clone();
            Box::pin(async move {
                gate_wait.notified().await;
                ServiceResponse::ok(ValueMap::new())
            })
        });

        let executor = LocalServiceExecutor::new("echo", 1, function);

        let manager_a = manager.clone();
        let executor_a = executor.clone();
        let first = tokio::spawn(async move {
            executor_a
                .issue_call_as_job(ServiceRequest::new("echo", ValueMap::new()), &manager_a)
                .await
        });

        // Give the first call's job a chance to reserve its slot.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        manager.invoke_cycle_and_wait().await;

        let busy = executor
            .issue_call_as_job(ServiceRequest::new("echo", ValueMap::new()), &manager)
            .await;
        assert_eq!(busy.status, ServiceStatus::Busy);

        gate.notify_one();
        manager.invoke_cycle_and_wait().await;
        let ok = first.await.unwrap();
        assert_eq!(ok.status, ServiceStatus::Ok);
    }
}
