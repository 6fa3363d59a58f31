use async_trait::async_trait;
use hive_common::jobs::JobManager;

use crate::model::{ExecutorId, ServiceRequest, ServiceResponse};

/// A callable service implementation, local or remote (C6/C7). Wrapped by
/// a [`crate::caller::ServiceCaller`], which load-balances across all
/// executors currently advertising one service name.
#[async_trait]
pub trait ServiceExecutor: Send + Sync {
    fn executor_id(&self) -> ExecutorId;

    fn service_name(&self) -> &str;

    fn is_local(&self) -> bool;

    /// Whether this executor can currently accept a call. Local executors
    /// answer from their concurrency counter; remote stubs are callable as
    /// long as their connection is open.
    fn is_callable(&self) -> bool;

    async fn issue_call_as_job(
        &self,
        request: ServiceRequest,
        job_manager: &JobManager,
    ) -> ServiceResponse;
}
