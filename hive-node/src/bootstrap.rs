use std::sync::Arc;

use hive_common::jobs::{JobManager, JobManagerConfig};
use hive_common::{events::EventBroker, HiveConfig, NodeId};
use hive_net::{ConsumerRegistry, Endpoint};
use hive_services::ServiceRegistry;

use crate::error::HiveError;

/// Everything a running node needs, wired up from [`HiveConfig`]: the job
/// system (C1), the event broker (C2), the messaging endpoint and consumer
/// registry (C3/C4), and the service registry (C5-C8). Mirrors the
/// `Services` aggregator-struct pattern, minus the database layer this node
/// has no use for.
#[derive(Clone)]
pub struct Services {
    pub node_id: NodeId,
    pub job_manager: JobManager,
    pub event_broker: Arc<EventBroker>,
    pub consumer_registry: Arc<ConsumerRegistry>,
    pub endpoint: Arc<Endpoint>,
    pub service_registry: Arc<ServiceRegistry>,
}

impl Services {
    /// Builds every subsystem and, if `config.net.auto_init` is set, starts
    /// listening for inbound connections. Does not start the cycle-driving
    /// loop; the caller owns that.
    pub async fn new(config: &HiveConfig) -> Result<Self, HiveError> {
        let node_id = NodeId::new();

        let job_manager = JobManager::new(JobManagerConfig {
            concurrency: config.jobs.concurrency,
        });

        let event_broker = EventBroker::new(job_manager.clone());
        event_broker.start_cleanup_timer(config.events.cleanup_interval());

        let consumer_registry = ConsumerRegistry::new(job_manager.clone());
        let endpoint = Endpoint::new(node_id, consumer_registry.clone());

        if config.net.auto_init {
            endpoint.start_server(config.net.port).await?;
            tracing::info!(port = config.net.port, "listening for inbound connections");
        }

        let service_registry = ServiceRegistry::new(
            endpoint.clone(),
            consumer_registry.clone(),
            job_manager.clone(),
            config.rpc.timeout(),
            config.rpc.sweep_interval(),
        );

        Ok(Self {
            node_id,
            job_manager,
            event_broker,
            consumer_registry,
            endpoint,
            service_registry,
        })
    }
}
