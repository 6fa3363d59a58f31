use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use hive_common::NodeId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use url::Url;

use crate::connection::Connection;
use crate::consumers::ConsumerRegistry;
use crate::error::NetError;
use crate::handshake::{client_handshake, server_handshake};
use crate::message::Message;

enum EstablishState {
    Connecting(Arc<Notify>),
    Connected(Arc<Connection>),
}

/// Maintains the set of persistent connections to other nodes (C3). Holds
/// at most one live connection per peer node-id; concurrent
/// `establish_connection_to` calls to the same URI are deduplicated so they
/// all resolve to the same connection.
pub struct Endpoint {
    local_node_id: NodeId,
    connections: DashMap<NodeId, Arc<Connection>>,
    establishing: Mutex<HashMap<String, EstablishState>>,
    consumer_registry: Arc<ConsumerRegistry>,
}

impl Endpoint {
    pub fn new(local_node_id: NodeId, consumer_registry: Arc<ConsumerRegistry>) -> Arc<Self> {
        Arc::new(Self {
            local_node_id,
            connections: DashMap::new(),
            establishing: Mutex::new(HashMap::new()),
            consumer_registry,
        })
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    pub fn connection_for(&self, node_id: NodeId) -> Option<Arc<Connection>> {
        self.connections.get(&node_id).map(|entry| entry.clone())
    }

    pub fn live_connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| entry.clone()).collect()
    }

    /// Client role (§4.3): parse the uri, resolve the host, open a TCP
    /// connection, upgrade to WebSocket, perform the node handshake, then
    /// register the connection and start its read loop. Calling this twice
    /// concurrently for the same uri, or once a connection already exists,
    /// resolves both callers to the same `Connection` without dialing
    /// twice.
    pub async fn establish_connection_to(
        self: &Arc<Self>,
        uri: &Url,
    ) -> Result<Arc<Connection>, NetError> {
        let key = uri.to_string();

        loop {
            let mut guard = self.establishing.lock().await;
            match guard.get(&key) {
                Some(EstablishState::Connected(conn)) => return Ok(conn.clone()),
                Some(EstablishState::Connecting(notify)) => {
                    let notify = notify.clone();
                    // Register (and `enable`) the `Notified` future while
                    // still holding `guard`, so a `notify_waiters()` call
                    // that lands between here and `.await` below cannot be
                    // missed: `Notify` stores no permit for callers that
                    // haven't registered yet.
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    drop(guard);
                    notified.await;
                    continue;
                }
                None => {
                    guard.insert(key.clone(), EstablishState::Connecting(Arc::new(Notify::new())));
                    break;
                }
            }
        }

        let result = self.dial(uri).await;

        let mut guard = self.establishing.lock().await;
        let notify = match guard.remove(&key) {
            Some(EstablishState::Connecting(notify)) => Some(notify),
            other => {
                if let Some(state) = other {
                    guard.insert(key.clone(), state);
                }
                None
            }
        };
        if let Ok(conn) = &result {
            self.connections.insert(conn.remote_node_id(), conn.clone());
            guard.insert(key, EstablishState::Connected(conn.clone()));
        }
        drop(guard);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }

        result
    }

    async fn dial(self: &Arc<Self>, uri: &Url) -> Result<Arc<Connection>, NetError> {
        let host = uri
            .host_str()
            .ok_or_else(|| NetError::InvalidUri(uri.to_string()))?;
        let port = uri
            .port_or_known_default()
            .ok_or_else(|| NetError::InvalidUri(uri.to_string()))?;

        let mut addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|_| NetError::CannotResolveHost(host.to_string()))?;
        let addr = addrs
            .next()
            .ok_or_else(|| NetError::CannotResolveHost(host.to_string()))?;

        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|err| NetError::ConnectionFailed(err.to_string()))?;

        let (mut ws, _response) = tokio_tungstenite::client_async(uri.as_str(), tcp)
            .await
            .map_err(|err| NetError::HandshakeFailed(err.to_string()))?;

        let remote_node_id = client_handshake(&mut ws, self.local_node_id).await?;

        let endpoint = self.clone();
        Ok(Connection::spawn(
            ws,
            addr.to_string(),
            remote_node_id,
            self.consumer_registry.clone(),
            move |node_id| endpoint.remove_connection(node_id),
        ))
    }

    /// Server role (§4.3): binds `port`, listens with a bounded backlog,
    /// and spawns a task accepting connections forever. Each accepted
    /// socket is upgraded, handshaken, and handed into the live connection
    /// map the same way a client-established connection is.
    pub async fn start_server(self: &Arc<Self>, port: u16) -> Result<(), NetError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|err| NetError::ConnectionFailed(err.to_string()))?;

        let endpoint = self.clone();
        tokio::spawn(async move {
            loop {
                let (tcp, remote_addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept() failed, continuing");
                        continue;
                    }
                };
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    if let Err(err) = endpoint.accept_one(tcp, remote_addr.to_string()).await {
                        tracing::warn!(peer = %remote_addr, error = %err, "inbound handshake failed");
                    }
                });
            }
        });

        Ok(())
    }

    async fn accept_one(self: &Arc<Self>, tcp: TcpStream, remote_addr: String) -> Result<(), NetError> {
        let mut ws = tokio_tungstenite::accept_async(tcp)
            .await
            .map_err(|err| NetError::HandshakeFailed(err.to_string()))?;

        let remote_node_id = server_handshake(&mut ws, self.local_node_id).await?;

        let endpoint = self.clone();
        let connection = Connection::spawn(
            ws,
            remote_addr,
            remote_node_id,
            self.consumer_registry.clone(),
            move |node_id| endpoint.remove_connection(node_id),
        );
        self.connections.insert(remote_node_id, connection);
        Ok(())
    }

    fn remove_connection(&self, node_id: NodeId) {
        self.connections.remove(&node_id);
    }

    /// Sends `message` to the named peer, failing with
    /// [`NetError::NoSuchPeer`] if there is no live connection to it.
    pub async fn send_to(&self, node_id: NodeId, message: Message) -> Result<(), NetError> {
        let connection = self
            .connection_for(node_id)
            .ok_or_else(|| NetError::NoSuchPeer(node_id.to_string()))?;
        connection.send(message).await
    }

    /// Broadcasts `message` to every live connection, logging (but not
    /// propagating) individual send failures.
    pub async fn broadcast(&self, message: Message) {
        for connection in self.live_connections() {
            if let Err(err) = connection.send(message.clone()).await {
                tracing::warn!(
                    peer = %connection.remote_node_id(),
                    error = %err,
                    "broadcast send failed"
                );
            }
        }
    }
}
