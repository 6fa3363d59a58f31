use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use thiserror::Error;

use super::context::JobContext;
use super::counter::JobCounter;
use super::job::{JobId, JobPhase, JobState, SharedJob};

/// A workload that takes longer than this is logged as an advisory warning
/// (it should probably be marked `async`), per §5 of the runtime contract.
const SLOW_JOB_WARNING_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum JobError {
    #[error(
        "cannot synchronously wait for completion from within a job on a single-threaded job manager"
    )]
    SyncWaitFromWithinJob,
}

#[derive(Debug, Clone, Copy)]
pub struct JobManagerConfig {
    /// Worker-thread count backing the ambient async runtime. A value of 1
    /// puts the manager into the single-threaded fallback: `Job`s may still
    /// run, but [`JobManager::wait_for_completion_blocking`] refuses to
    /// block from inside a job, since there is no other worker to make
    /// progress on.
    pub concurrency: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

struct PhaseQueues {
    init: Mutex<VecDeque<SharedJob>>,
    main: Mutex<VecDeque<SharedJob>>,
    clean_up: Mutex<VecDeque<SharedJob>>,
}

impl PhaseQueues {
    fn new() -> Self {
        Self {
            init: Mutex::new(VecDeque::new()),
            main: Mutex::new(VecDeque::new()),
            clean_up: Mutex::new(VecDeque::new()),
        }
    }

    fn for_phase(&self, phase: JobPhase) -> &Mutex<VecDeque<SharedJob>> {
        match phase {
            JobPhase::Init => &self.init,
            JobPhase::Main => &self.main,
            JobPhase::CleanUp => &self.clean_up,
        }
    }
}

#[derive(Clone)]
struct CycleCounters {
    init: Arc<JobCounter>,
    main: Arc<JobCounter>,
    clean_up: Arc<JobCounter>,
}

impl CycleCounters {
    fn new() -> Self {
        Self {
            init: JobCounter::new(),
            main: JobCounter::new(),
            clean_up: JobCounter::new(),
        }
    }

    fn for_phase(&self, phase: JobPhase) -> Arc<JobCounter> {
        match phase {
            JobPhase::Init => self.init.clone(),
            JobPhase::Main => self.main.clone(),
            JobPhase::CleanUp => self.clean_up.clone(),
        }
    }
}

struct Inner {
    config: JobManagerConfig,
    queues: PhaseQueues,
    next_cycle_queue: Mutex<VecDeque<SharedJob>>,
    blacklist: Mutex<HashSet<JobId>>,
    current_phase: Mutex<Option<JobPhase>>,
    counters: Mutex<Option<CycleCounters>>,
    total_cycles: AtomicU64,
    running: AtomicBool,
}

/// Cooperative job scheduler: runs phased cycles (INIT -> MAIN -> CLEAN_UP)
/// over jobs kicked onto it, using the ambient tokio runtime's work-stealing
/// task scheduler in place of stackful fibers (see Design Notes: "Fibers vs.
/// task primitives").
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(config: JobManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queues: PhaseQueues::new(),
                next_cycle_queue: Mutex::new(VecDeque::new()),
                blacklist: Mutex::new(HashSet::new()),
                current_phase: Mutex::new(None),
                counters: Mutex::new(None),
                total_cycles: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> JobManagerConfig {
        self.inner.config
    }

    pub fn total_cycles(&self) -> u64 {
        self.inner.total_cycles.load(Ordering::SeqCst)
    }

    /// Marks the manager as accepting cycles. The manager itself does not
    /// own a thread pool (that's the ambient tokio runtime's job, sized from
    /// `jobs.concurrency` at node start-up); this flag is consulted by the
    /// node's cycle-driving loop.
    pub fn start_execution(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
    }

    pub fn stop_execution(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Places `job` into the queue for its declared phase. If that phase is
    /// currently executing, the job is scheduled immediately instead of
    /// waiting for the next cycle.
    pub fn kick_job(&self, job: SharedJob) {
        {
            let mut blacklist = self.inner.blacklist.lock().unwrap();
            blacklist.remove(job.id());
        }

        job.set_state(JobState::Queued);
        let phase = job.phase();
        self.inner
            .queues
            .for_phase(phase)
            .lock()
            .unwrap()
            .push_back(job);

        let current = *self.inner.current_phase.lock().unwrap();
        if current == Some(phase) {
            self.drain_phase(phase);
        }
    }

    /// Enqueues `job` for the cycle after the current one, unless its id is
    /// currently blacklisted by [`JobManager::detach_job`].
    pub fn kick_job_for_next_cycle(&self, job: SharedJob) {
        if self.inner.blacklist.lock().unwrap().contains(job.id()) {
            return;
        }
        self.inner.next_cycle_queue.lock().unwrap().push_back(job);
    }

    /// Removes `id` from every non-executing queue and blacklists it so a
    /// pending requeue is silently dropped. An in-flight execution of the
    /// same id still runs to completion; only its requeue is suppressed.
    pub fn detach_job(&self, id: &JobId) {
        remove_matching(&self.inner.next_cycle_queue, id);
        remove_matching(self.inner.queues.for_phase(JobPhase::Init), id);
        remove_matching(self.inner.queues.for_phase(JobPhase::Main), id);
        remove_matching(self.inner.queues.for_phase(JobPhase::CleanUp), id);

        self.inner.blacklist.lock().unwrap().insert(id.clone());
    }

    fn reset_blacklist(&self) {
        self.inner.blacklist.lock().unwrap().clear();
    }

    fn drain_phase(&self, phase: JobPhase) {
        let counters = self.inner.counters.lock().unwrap().clone();
        let Some(counters) = counters else {
            return;
        };
        let counter = counters.for_phase(phase);

        let jobs: Vec<SharedJob> = {
            let mut queue = self.inner.queues.for_phase(phase).lock().unwrap();
            queue.drain(..).collect()
        };

        for job in jobs {
            if !job.is_ready_for_execution() {
                self.kick_job_for_next_cycle(job);
                continue;
            }
            self.spawn_job(job, counter.clone());
        }
    }

    fn spawn_job(&self, job: SharedJob, counter: Arc<JobCounter>) {
        job.add_counter(counter);
        job.set_state(JobState::AwaitingExecution);

        let manager = self.clone();
        let cycle = self.inner.total_cycles.load(Ordering::SeqCst);

        tokio::spawn(async move {
            let workload = job.workload();

            job.set_state(JobState::InExecution);
            let ctx = JobContext::new(manager.clone(), cycle);
            let started = Instant::now();

            let outcome = AssertUnwindSafe(workload(ctx)).catch_unwind().await;
            let elapsed = started.elapsed();
            if !job.is_async() && elapsed > SLOW_JOB_WARNING_THRESHOLD {
                tracing::warn!(
                    job_id = %job.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "synchronous job took long to execute; consider marking it async",
                );
            }

            match outcome {
                Ok(continuation) => {
                    job.set_state(JobState::ExecutionFinished);
                    job.finish();
                    if continuation == super::job::JobContinuation::Requeue {
                        manager.kick_job_for_next_cycle(job.clone());
                    }
                }
                Err(panic) => {
                    job.set_state(JobState::Failed);
                    job.finish();
                    tracing::error!(
                        job_id = %job.id(),
                        "job workload panicked: {}",
                        panic_message(&panic),
                    );
                }
            }
        });
    }

    /// Runs one full cycle (INIT, MAIN, CLEAN_UP) to completion: drains each
    /// phase's queue, waits for its counter to reach zero, then advances.
    pub async fn invoke_cycle_and_wait(&self) {
        self.reset_blacklist();

        let pending: Vec<SharedJob> = {
            let mut queue = self.inner.next_cycle_queue.lock().unwrap();
            queue.drain(..).collect()
        };
        for job in pending {
            self.kick_job(job);
        }

        self.inner.total_cycles.fetch_add(1, Ordering::SeqCst);
        let counters = CycleCounters::new();
        *self.inner.counters.lock().unwrap() = Some(counters.clone());

        for phase in JobPhase::ALL {
            *self.inner.current_phase.lock().unwrap() = Some(phase);
            self.drain_phase(phase);
            counters.for_phase(phase).wait().await;
        }

        *self.inner.current_phase.lock().unwrap() = None;
        self.reset_blacklist();
    }

    /// Suspends until `counter` reaches zero without ever blocking the
    /// calling worker thread. Safe to call from inside a job workload or
    /// from any other async context.
    pub async fn wait_for_completion(&self, counter: &JobCounter) {
        counter.wait().await;
    }

    /// Suspends until `fut` resolves, matching [`JobContext::wait_for_future`]
    /// for callers that hold a `JobManager` but no `JobContext` (e.g. code
    /// driving a cycle from outside any job workload).
    pub async fn wait_for_future<F: Future>(&self, fut: F) -> F::Output {
        fut.await
    }

    /// Blocking variant for callers with no async context of their own
    /// (e.g. a plain OS thread driving the manager). Refuses to run from
    /// inside a job on a single-threaded manager, since there would be no
    /// other worker left to make progress.
    pub fn wait_for_completion_blocking(&self, counter: &JobCounter) -> Result<(), JobError> {
        if self.inner.config.concurrency <= 1 && tokio::runtime::Handle::try_current().is_ok() {
            return Err(JobError::SyncWaitFromWithinJob);
        }
        while !counter.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

fn remove_matching(queue: &Mutex<VecDeque<SharedJob>>, id: &JobId) {
    let mut guard = queue.lock().unwrap();
    guard.retain(|job| job.id() != id);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn _assert_future_is_send<F: Future + Send>(_f: F) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{Job, JobContinuation};
    use std::sync::Mutex as StdMutex;

    fn manager() -> JobManager {
        JobManager::new(JobManagerConfig::default())
    }

    /// E1: jobs kicked into INIT, MAIN and CLEAN_UP append to a shared
    /// vector in phase order, regardless of kick order.
    #[tokio::test]
    async fn phase_order_is_init_then_main_then_clean_up() {
        let manager = manager();
        let trace = Arc::new(StdMutex::new(Vec::new()));

        let push = |phase: JobPhase, value: u8, trace: Arc<StdMutex<Vec<u8>>>| {
            Job::shared(phase, false, move |_ctx| {
                let trace = trace.clone();
                async move {
                    trace.lock().unwrap().push(value);
                    JobContinuation::Dispose
                }
            })
        };

        // Kicked out of phase order on purpose: CLEAN_UP, then INIT, then MAIN.
        manager.kick_job(push(JobPhase::CleanUp, 2, trace.clone()));
        manager.kick_job(push(JobPhase::Init, 0, trace.clone()));
        manager.kick_job(push(JobPhase::Main, 1, trace.clone()));

        manager.invoke_cycle_and_wait().await;

        assert_eq!(*trace.lock().unwrap(), vec![0, 1, 2]);
    }

    /// Requeue semantics: a job returning `Requeue` executes exactly once
    /// per cycle until it is disposed.
    #[tokio::test]
    async fn requeued_job_executes_once_per_cycle_until_disposed() {
        let manager = manager();
        let count = Arc::new(AtomicU64::new(0));
        let max_runs = 3;

        let count_for_job = count.clone();
        let job = Job::shared(JobPhase::Main, false, move |ctx| {
            let count = count_for_job.clone();
            async move {
                let runs = count.fetch_add(1, Ordering::SeqCst) + 1;
                if runs < max_runs {
                    JobContinuation::Requeue
                } else {
                    let _ = ctx;
                    JobContinuation::Dispose
                }
            }
        });
        manager.kick_job(job);

        for _ in 0..max_runs {
            manager.invoke_cycle_and_wait().await;
        }

        assert_eq!(count.load(Ordering::SeqCst), max_runs);

        // A further cycle must not run it again: it disposed on the last one.
        manager.invoke_cycle_and_wait().await;
        assert_eq!(count.load(Ordering::SeqCst), max_runs);
    }

    /// E5: detaching a job id suppresses its requeue even though the
    /// in-flight execution that issued the requeue already ran.
    #[tokio::test]
    async fn detach_suppresses_pending_requeue() {
        let manager = manager();
        let count = Arc::new(AtomicU64::new(0));

        let count_for_job = count.clone();
        let job = Job::shared(JobPhase::Main, false, move |_ctx| {
            let count = count_for_job.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                JobContinuation::Requeue
            }
        });
        let job_id = job.id().clone();
        manager.kick_job(job);

        // First cycle: job runs once and requeues itself for cycle 2.
        manager.invoke_cycle_and_wait().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Give the job's own requeue (kicked right after its counter
        // decrement) a moment to land in the next-cycle queue.
        tokio::time::sleep(Duration::from_millis(20)).await;

        manager.detach_job(&job_id);

        // Second cycle: the requeued job must have been dropped, not run.
        manager.invoke_cycle_and_wait().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// E2-style: a timer job does not fire before its duration elapses,
    /// and fires once that wall-clock duration has passed.
    #[tokio::test]
    async fn timer_job_does_not_fire_before_duration_elapses() {
        let manager = manager();
        let count = Arc::new(AtomicU64::new(0));

        let count_for_job = count.clone();
        let timer = crate::jobs::TimerJob::shared(
            JobPhase::Main,
            false,
            Duration::from_millis(200),
            move |_ctx| {
                let count = count_for_job.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    JobContinuation::Dispose
                }
            },
        );
        manager.kick_job(timer);

        // Several tight cycles well under the timer's duration: it must
        // bounce to the next-cycle queue without firing.
        for _ in 0..3 {
            manager.invoke_cycle_and_wait().await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        manager.invoke_cycle_and_wait().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// A job kicked for a phase that is currently draining is scheduled
    /// immediately into that same phase's run, not held for next cycle.
    #[tokio::test]
    async fn job_kicked_into_its_own_currently_draining_phase_runs_this_cycle() {
        let manager = manager();
        let count = Arc::new(AtomicU64::new(0));
        let count_for_outer = count.clone();

        let outer = Job::shared(JobPhase::Main, false, move |ctx| {
            let count = count_for_outer.clone();
            async move {
                let count_for_inner = count.clone();
                let inner = Job::shared(JobPhase::Main, false, move |_ctx| {
                    let count = count_for_inner.clone();
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        JobContinuation::Dispose
                    }
                });
                ctx.kick_job(inner);
                JobContinuation::Dispose
            }
        });
        manager.kick_job(outer);
        manager.invoke_cycle_and_wait().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
