//! Cooperative job system (C1): phased cycles, counters and timer jobs.
//!
//! Everything else in the hive runtime schedules jobs rather than running
//! loops or blocking waits; see [`JobManager`].

pub mod context;
pub mod counter;
pub mod job;
pub mod manager;
pub mod timer;

pub use context::JobContext;
pub use counter::JobCounter;
pub use job::{Job, JobContinuation, JobId, JobPhase, JobState, Schedulable, SharedJob};
pub use manager::{JobError, JobManager, JobManagerConfig};
pub use timer::TimerJob;
