use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hive_common::jobs::{JobManager, JobManagerConfig};
use hive_common::NodeId;
use hive_net::{ConnectionInfo, ConsumerRegistry, Endpoint, Message, MessageConsumer};
use tokio::sync::Notify;
use url::Url;

struct RecordingConsumer {
    message_type: String,
    notify: Arc<Notify>,
    received: Arc<tokio::sync::Mutex<Vec<Message>>>,
}

#[async_trait]
impl MessageConsumer for RecordingConsumer {
    fn message_type(&self) -> &str {
        &self.message_type
    }

    async fn process_received_message(&self, message: Message, _connection: ConnectionInfo) {
        self.received.lock().await.push(message);
        self.notify.notify_one();
    }
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn client_server_handshake_then_send_is_delivered() {
    let port = free_port().await;

    let job_manager = JobManager::new(JobManagerConfig::default());
    let server_registry = ConsumerRegistry::new(job_manager.clone());
    let server_node_id = NodeId::new();
    let server = Endpoint::new(server_node_id, server_registry.clone());
    server.start_server(port).await.unwrap();

    let received = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let notify = Arc::new(Notify::new());
    let consumer: Arc<dyn MessageConsumer> = Arc::new(RecordingConsumer {
        message_type: "greeting".to_string(),
        notify: notify.clone(),
        received: received.clone(),
    });
    server_registry.register(&consumer);

    let client_job_manager = JobManager::new(JobManagerConfig::default());
    let client_registry = ConsumerRegistry::new(client_job_manager);
    let client = Endpoint::new(NodeId::new(), client_registry);

    let uri = Url::parse(&format!("ws://127.0.0.1:{port}/")).unwrap();
    let connection = client.establish_connection_to(&uri).await.unwrap();
    assert_eq!(connection.remote_node_id(), server_node_id);

    connection
        .send(Message::new("greeting").with_attribute("from", "client"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), notify.notified())
        .await
        .expect("message was not delivered in time");

    let received = received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].attributes.get("from").unwrap(), "client");
}

#[tokio::test]
async fn establishing_same_uri_concurrently_yields_one_connection() {
    let port = free_port().await;

    let server_job_manager = JobManager::new(JobManagerConfig::default());
    let server_registry = ConsumerRegistry::new(server_job_manager);
    let server = Endpoint::new(NodeId::new(), server_registry);
    server.start_server(port).await.unwrap();

    let client_job_manager = JobManager::new(JobManagerConfig::default());
    let client_registry = ConsumerRegistry::new(client_job_manager);
    let client = Endpoint::new(NodeId::new(), client_registry);

    let uri = Url::parse(&format!("ws://127.0.0.1:{port}/")).unwrap();
    let (first, second) = tokio::join!(
        client.establish_connection_to(&uri),
        client.establish_connection_to(&uri)
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.remote_node_id(), second.remote_node_id());
    assert_eq!(client.live_connections().len(), 1);
}
