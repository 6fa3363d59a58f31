use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::context::JobContext;
use super::counter::JobCounter;

/// Unique identifier of a [`Job`], assigned once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The phase of the cycle a job belongs to. Phases execute strictly in this
/// order within one cycle: `Init` happens-before `Main` happens-before
/// `CleanUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPhase {
    Init,
    Main,
    CleanUp,
}

impl JobPhase {
    pub const ALL: [JobPhase; 3] = [JobPhase::Init, JobPhase::Main, JobPhase::CleanUp];
}

/// Lifecycle state of a job. States only advance in the order listed here;
/// `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Detached,
    Queued,
    AwaitingExecution,
    InExecution,
    ExecutionFinished,
    Failed,
}

/// What the job scheduler should do with a job once its workload returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobContinuation {
    /// The job is done; drop it.
    Dispose,
    /// Re-kick the job for the next cycle.
    Requeue,
}

pub type JobFuture = Pin<Box<dyn Future<Output = JobContinuation> + Send>>;

/// A workload is a re-runnable factory: each execution hands it a fresh
/// [`JobContext`] and polls the future it returns. A job that comes back
/// `Requeue`d is re-kicked as the *same* [`SharedJob`], so the workload must
/// stay callable for as many cycles as it keeps requeuing itself, not be
/// consumed on first use.
pub type Workload = Arc<dyn Fn(JobContext) -> JobFuture + Send + Sync>;

/// A schedulable unit of work. [`Job`] is the base implementation; timer jobs
/// ([`super::timer::TimerJob`]) wrap a `Job` and override readiness.
///
/// Modeled as a trait (rather than a template/CRTP hierarchy) per the
/// "CRTP job-executor interface" redesign note: virtual dispatch is
/// acceptable here since the hot path is fiber/task context switching, not
/// dispatch through this trait.
pub trait Schedulable: Send + Sync {
    fn id(&self) -> &JobId;
    fn phase(&self) -> JobPhase;
    fn is_async(&self) -> bool;
    fn state(&self) -> JobState;
    fn set_state(&self, state: JobState);
    fn add_counter(&self, counter: Arc<JobCounter>);
    fn workload(&self) -> Workload;
    fn finish(&self);

    /// Whether the job is ready to execute this cycle. Regular jobs are
    /// always ready; [`super::timer::TimerJob`] overrides this.
    fn is_ready_for_execution(&self) -> bool {
        true
    }
}

pub type SharedJob = Arc<dyn Schedulable>;

struct JobInner {
    id: JobId,
    phase: JobPhase,
    r#async: bool,
    state: Mutex<JobState>,
    workload: Workload,
    counters: Mutex<Vec<Arc<JobCounter>>>,
}

/// The base job implementation: an id, a phase, a re-runnable workload and
/// the set of counters it must decrement on completion.
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    /// Creates a job whose workload is an async closure taking a
    /// [`JobContext`] and resolving to a [`JobContinuation`]. `workload` must
    /// be callable more than once: a job that requeues itself runs the same
    /// closure again on its next ready cycle.
    pub fn new<F, Fut>(phase: JobPhase, r#async: bool, workload: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobContinuation> + Send + 'static,
    {
        let workload: Workload = Arc::new(move |ctx| Box::pin(workload(ctx)) as JobFuture);
        Self {
            inner: Arc::new(JobInner {
                id: JobId::new(),
                phase,
                r#async,
                state: Mutex::new(JobState::Detached),
                workload,
                counters: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn shared<F, Fut>(phase: JobPhase, r#async: bool, workload: F) -> SharedJob
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobContinuation> + Send + 'static,
    {
        Arc::new(Self::new(phase, r#async, workload))
    }
}

impl Schedulable for Job {
    fn id(&self) -> &JobId {
        &self.inner.id
    }

    fn phase(&self) -> JobPhase {
        self.inner.phase
    }

    fn is_async(&self) -> bool {
        self.inner.r#async
    }

    fn state(&self) -> JobState {
        *self.inner.state.lock().unwrap()
    }

    fn set_state(&self, state: JobState) {
        *self.inner.state.lock().unwrap() = state;
    }

    fn add_counter(&self, counter: Arc<JobCounter>) {
        counter.increase();
        self.inner.counters.lock().unwrap().push(counter);
    }

    fn workload(&self) -> Workload {
        self.inner.workload.clone()
    }

    fn finish(&self) {
        let counters: Vec<_> = self.inner.counters.lock().unwrap().drain(..).collect();
        for counter in counters {
            counter.decrease();
        }
    }
}
