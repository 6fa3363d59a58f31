//! Shared substrate for hive nodes: the cooperative job system (C1), the
//! in-process event broker (C2), and the ambient configuration/error/
//! tracing/id types every other `hive-*` crate builds on.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod jobs;
pub mod tracing_setup;
pub mod value;

pub use config::{ConfigLoader, HiveConfig};
pub use error::EventError;
pub use ids::{NodeId, TransactionId};
pub use jobs::{JobManager, JobManagerConfig};
pub use value::{Value, ValueMap};
