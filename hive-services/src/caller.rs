use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hive_common::jobs::{Job, JobContinuation, JobManager, JobPhase};
use tokio::sync::oneshot;

use crate::executor::ServiceExecutor;
use crate::model::{ExecutorId, ServiceRequest, ServiceResponse, ServiceStatus};
use crate::retry::{RetryMode, RetryPolicy};

/// Load-balances over every executor currently advertising one service
/// name (C5). Selection is round-robin, skipping non-callable executors
/// and, if requested, remote ones.
pub struct ServiceCaller {
    service_name: String,
    executors: Mutex<Vec<Arc<dyn ServiceExecutor>>>,
    next_index: AtomicUsize,
}

impl ServiceCaller {
    pub fn new(service_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            service_name: service_name.into(),
            executors: Mutex::new(Vec::new()),
            next_index: AtomicUsize::new(0),
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Adds `executor`, replacing any existing entry with the same id.
    pub fn add_executor(&self, executor: Arc<dyn ServiceExecutor>) {
        let mut executors = self.executors.lock().unwrap();
        executors.retain(|existing| existing.executor_id() != executor.executor_id());
        executors.push(executor);
    }

    pub fn remove_executor(&self, executor_id: ExecutorId) {
        self.executors
            .lock()
            .unwrap()
            .retain(|executor| executor.executor_id() != executor_id);
    }

    pub fn is_callable(&self) -> bool {
        self.executors.lock().unwrap().iter().any(|e| e.is_callable())
    }

    pub fn contains_locally_callable(&self) -> bool {
        self.executors
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.is_local() && e.is_callable())
    }

    pub fn get_callable_count(&self) -> usize {
        self.executors.lock().unwrap().iter().filter(|e| e.is_callable()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.lock().unwrap().is_empty()
    }

    /// Round-robins across the internal vector, skipping non-callable
    /// executors and (if `only_local`) remote ones. At most one full
    /// traversal is made; returns `None` if nothing qualifies.
    pub fn select_next_callable_executor(&self, only_local: bool) -> Option<Arc<dyn ServiceExecutor>> {
        let executors = self.executors.lock().unwrap();
        let len = executors.len();
        if len == 0 {
            return None;
        }
        let start = self.next_index.fetch_add(1, Ordering::SeqCst) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let candidate = &executors[index];
            if candidate.is_callable() && (!only_local || candidate.is_local()) {
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Builds and kicks the service-call job described in §4.5: selects an
    /// executor, awaits its response, and on `BUSY` either retries the
    /// same executor after `retry_policy.retry_interval` or moves to the
    /// next one, per `retry_policy.mode`, until attempts are exhausted.
    pub async fn issue_call_as_job(
        self: &Arc<Self>,
        request: ServiceRequest,
        job_manager: &JobManager,
        only_local: bool,
        is_async: bool,
        retry_policy: RetryPolicy,
    ) -> ServiceResponse {
        let (tx, rx) = oneshot::channel();
        // See the matching comment in `LocalServiceExecutor::issue_call_as_job`:
        // the workload must be `Fn` to support `Requeue`, so the single-use
        // sender is wrapped to be `take()`'n on this job's one execution.
        let tx = Arc::new(Mutex::new(Some(tx)));
        let caller = self.clone();
        let manager_for_job = job_manager.clone();
        let job = Job::shared(JobPhase::Main, is_async, move |_ctx| {
            let caller = caller.clone();
            let manager_for_job = manager_for_job.clone();
            let request = request.clone();
            let tx = tx.clone();
            async move {
                let response = caller
                    .drive_call(request, &manager_for_job, only_local, retry_policy)
                    .await;
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(response);
                }
                JobContinuation::Dispose
            }
        });
        job_manager.kick_job(job);

        rx.await.unwrap_or_else(|_| {
            ServiceResponse::error(ServiceStatus::InternalError, "service-call job was dropped")
        })
    }

    async fn drive_call(
        self: &Arc<Self>,
        request: ServiceRequest,
        job_manager: &JobManager,
        only_local: bool,
        retry_policy: RetryPolicy,
    ) -> ServiceResponse {
        let Some(mut executor) = self.select_next_callable_executor(only_local) else {
            return ServiceResponse::error(
                ServiceStatus::Gone,
                format!("no callable executor for service {}", self.service_name),
            );
        };

        let mut attempts_left = retry_policy.max_attempts;
        loop {
            let response = executor.issue_call_as_job(request.clone(), job_manager).await;
            if !response.status.is_retryable() || attempts_left <= 1 {
                return response;
            }
            attempts_left -= 1;

            match retry_policy.mode {
                RetryMode::TryNextExecutor => match self.select_next_callable_executor(only_local) {
                    Some(next) => executor = next,
                    None => return response,
                },
                RetryMode::RetrySame => {
                    tokio::time::sleep(retry_policy.retry_interval).await;
                }
            }
        }
    }
}
