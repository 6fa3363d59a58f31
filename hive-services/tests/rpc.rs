use std::sync::Arc;
use std::time::Duration;

use hive_common::jobs::{JobManager, JobManagerConfig};
use hive_common::{NodeId, Value, ValueMap};
use hive_net::{ConsumerRegistry, Endpoint};
use hive_services::{RetryPolicy, ServiceRegistry, ServiceRequest, ServiceStatus};
use url::Url;

fn drive_cycles(manager: JobManager) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            manager.invoke_cycle_and_wait().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

/// E4: node A registers a local `add(a, b)` service; node B discovers it
/// through the registration broadcast and calls it remotely, getting back
/// `sum = a + b` matched by transaction-id.
#[tokio::test]
async fn remote_call_round_trip() {
    let port = free_port().await;

    let manager_a = JobManager::new(JobManagerConfig::default());
    let consumers_a = ConsumerRegistry::new(manager_a.clone());
    let node_a = NodeId::new();
    let endpoint_a = Endpoint::new(node_a, consumers_a.clone());
    endpoint_a.start_server(port).await.unwrap();
    let registry_a = ServiceRegistry::new(
        endpoint_a.clone(),
        consumers_a.clone(),
        manager_a.clone(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    );

    let manager_b = JobManager::new(JobManagerConfig::default());
    let consumers_b = ConsumerRegistry::new(manager_b.clone());
    let node_b = NodeId::new();
    let endpoint_b = Endpoint::new(node_b, consumers_b.clone());
    let registry_b = ServiceRegistry::new(
        endpoint_b.clone(),
        consumers_b.clone(),
        manager_b.clone(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    );

    let uri = Url::parse(&format!("ws://127.0.0.1:{port}/")).unwrap();
    endpoint_b.establish_connection_to(&uri).await.unwrap();

    let cycle_a = drive_cycles(manager_a.clone());
    let cycle_b = drive_cycles(manager_b.clone());

    registry_a
        .register_local(
            "add",
            0,
            Arc::new(|request: ServiceRequest| {
                Box::pin(async move {
                    let a = request
                        .params
                        .get("a")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<i64>().ok())
                        .unwrap_or(0);
                    let b = request
                        .params
                        .get("b")
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse::<i64>().ok())
                        .unwrap_or(0);
                    let mut results = ValueMap::new();
                    results.insert("sum".to_string(), Value::Int(a + b));
                    hive_services::ServiceResponse::ok(results)
                }) as futures::future::BoxFuture<'static, hive_services::ServiceResponse>
            }),
        )
        .await;

    // Give the registration broadcast time to reach node B and for B's
    // registration consumer job to run.
    let mut params = ValueMap::new();
    params.insert("a".to_string(), Value::Int(5));
    params.insert("b".to_string(), Value::Int(6));
    let request = ServiceRequest::new("add", params);

    let response = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = registry_b
                .call(request.clone(), false, true, RetryPolicy::default())
                .await;
            if response.status == ServiceStatus::Ok {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("remote call did not complete in time");

    assert_eq!(response.status, ServiceStatus::Ok);
    assert_eq!(response.results.get("sum").unwrap().as_str(), Some("11"));

    cycle_a.abort();
    cycle_b.abort();
}
