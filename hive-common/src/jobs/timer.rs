use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::context::JobContext;
use super::counter::JobCounter;
use super::job::{Job, JobContinuation, JobId, JobPhase, JobState, Schedulable, SharedJob, Workload};

/// A job that skips execution until a fixed duration has elapsed since the
/// first time it was offered for scheduling (not since construction). Once
/// it fires, the timer resets, so a `Requeue`d timer job fires again after
/// another full `duration`.
pub struct TimerJob {
    inner: Job,
    duration: Duration,
    timer: Mutex<Option<Instant>>,
}

impl TimerJob {
    pub fn new<F, Fut>(phase: JobPhase, r#async: bool, duration: Duration, workload: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobContinuation> + Send + 'static,
    {
        Self {
            inner: Job::new(phase, r#async, workload),
            duration,
            timer: Mutex::new(None),
        }
    }

    pub fn shared<F, Fut>(
        phase: JobPhase,
        r#async: bool,
        duration: Duration,
        workload: F,
    ) -> SharedJob
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobContinuation> + Send + 'static,
    {
        Arc::new(Self::new(phase, r#async, duration, workload))
    }
}

impl Schedulable for TimerJob {
    fn id(&self) -> &JobId {
        self.inner.id()
    }

    fn phase(&self) -> JobPhase {
        self.inner.phase()
    }

    fn is_async(&self) -> bool {
        self.inner.is_async()
    }

    fn state(&self) -> JobState {
        self.inner.state()
    }

    fn set_state(&self, state: JobState) {
        self.inner.set_state(state)
    }

    fn add_counter(&self, counter: Arc<JobCounter>) {
        self.inner.add_counter(counter)
    }

    fn workload(&self) -> Workload {
        self.inner.workload()
    }

    fn finish(&self) {
        self.inner.finish()
    }

    fn is_ready_for_execution(&self) -> bool {
        let mut timer = self.timer.lock().unwrap();
        let start = *timer.get_or_insert_with(Instant::now);
        let elapsed = start.elapsed();
        let ready = elapsed >= self.duration;
        if ready {
            // restart timer so the next requeue begins a fresh interval.
            *timer = None;
        }
        ready
    }
}
