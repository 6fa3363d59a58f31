use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use hive_common::jobs::{Job, JobContinuation, JobManager, JobPhase};

use crate::message::Message;

/// Identifies the connection a message arrived on, handed to consumers
/// alongside the message itself.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub remote_addr: String,
    pub remote_node_id: Option<hive_common::NodeId>,
}

/// A subscriber for one message type (C4). Weak-or-strong reference
/// semantics are permitted by the spec; the registry always stores a weak
/// handle and prunes dead ones lazily, mirroring [`hive_common::events`].
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    fn message_type(&self) -> &str;

    async fn process_received_message(&self, message: Message, connection: ConnectionInfo);
}

type WeakConsumer = Weak<dyn MessageConsumer>;

/// Routes incoming messages by type to consumer lists (C4). On dispatch,
/// kicks one job per non-expired consumer registered for the message's
/// type.
pub struct ConsumerRegistry {
    job_manager: JobManager,
    consumers: DashMap<String, Mutex<Vec<WeakConsumer>>>,
}

impl ConsumerRegistry {
    pub fn new(job_manager: JobManager) -> Arc<Self> {
        Arc::new(Self {
            job_manager,
            consumers: DashMap::new(),
        })
    }

    pub fn register(&self, consumer: &Arc<dyn MessageConsumer>) {
        let entry = self
            .consumers
            .entry(consumer.message_type().to_string())
            .or_insert_with(|| Mutex::new(Vec::new()));
        entry.lock().unwrap().push(Arc::downgrade(consumer));
    }

    /// Kicks a `process_received_message` job per live consumer of
    /// `message.message_type`. Expired consumers are pruned as part of the
    /// same lookup.
    pub fn dispatch(&self, message: Message, connection: ConnectionInfo) {
        let Some(entry) = self.consumers.get(&message.message_type) else {
            return;
        };

        let live: Vec<Arc<dyn MessageConsumer>> = {
            let mut list = entry.lock().unwrap();
            list.retain(|weak| weak.strong_count() > 0);
            list.iter().filter_map(|weak| weak.upgrade()).collect()
        };
        drop(entry);

        for consumer in live {
            let message = message.clone();
            let connection = connection.clone();
            let job = Job::shared(JobPhase::Main, true, move |_ctx| {
                let consumer = consumer.clone();
                let message = message.clone();
                let connection = connection.clone();
                async move {
                    consumer
                        .process_received_message(message, connection)
                        .await;
                    JobContinuation::Dispose
                }
            });
            self.job_manager.kick_job(job);
        }
    }
}
