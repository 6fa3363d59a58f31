use std::future::Future;

use super::counter::JobCounter;
use super::job::SharedJob;
use super::manager::JobManager;

/// Passed to every workload. Lets a job kick further jobs and suspend on
/// counters or arbitrary futures without ever blocking the worker thread it
/// runs on.
#[derive(Clone)]
pub struct JobContext {
    manager: JobManager,
    cycle: u64,
}

impl JobContext {
    pub(crate) fn new(manager: JobManager, cycle: u64) -> Self {
        Self { manager, cycle }
    }

    /// The cycle number this job is executing within.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn job_manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn kick_job(&self, job: SharedJob) {
        self.manager.kick_job(job);
    }

    pub fn kick_job_for_next_cycle(&self, job: SharedJob) {
        self.manager.kick_job_for_next_cycle(job);
    }

    /// Suspends the calling job until `counter` reaches zero. This is the
    /// only correct way to wait from inside a workload: it yields rather
    /// than blocking the underlying worker thread.
    pub async fn wait_for_completion(&self, counter: &JobCounter) {
        counter.wait().await;
    }

    /// Suspends the calling job until `fut` resolves. Equivalent to
    /// `fut.await`; provided so call sites read uniformly with
    /// [`JobContext::wait_for_completion`].
    pub async fn wait_for_future<F: Future>(&self, fut: F) -> F::Output {
        fut.await
    }
}
