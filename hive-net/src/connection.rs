use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hive_common::NodeId;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use crate::consumers::{ConnectionInfo, ConsumerRegistry};
use crate::error::NetError;
use crate::message::Message;

pub(crate) type WsStream = WebSocketStream<TcpStream>;

struct SendRequest {
    message: Message,
    reply: oneshot::Sender<Result<(), NetError>>,
}

/// One persistent connection to a peer node. Reads and writes are
/// serialized on a per-connection strand (§4.3): the writer task below is
/// the only place that touches the WebSocket sink, so concurrent `send`
/// callers never interleave frames.
pub struct Connection {
    remote_addr: String,
    remote_node_id: NodeId,
    outbound: mpsc::UnboundedSender<SendRequest>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Wraps an already-handshaken WebSocket stream, spawning its writer
    /// and reader tasks. `on_close` is invoked exactly once, from the
    /// reader task, the moment the peer's stream closes or a fatal read
    /// error occurs — this is how the owning [`crate::endpoint::Endpoint`]
    /// learns to remove the connection from its live map.
    pub(crate) fn spawn(
        stream: WsStream,
        remote_addr: String,
        remote_node_id: NodeId,
        consumer_registry: Arc<ConsumerRegistry>,
        on_close: impl FnOnce(NodeId) + Send + 'static,
    ) -> Arc<Self> {
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<SendRequest>();
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(request) = outbound_rx.recv().await {
                let bytes = match request.message.to_json_bytes() {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        let _ = request.reply.send(Err(err));
                        continue;
                    }
                };
                let result = sink
                    .send(WsMessage::Binary(bytes))
                    .await
                    .map_err(|err| NetError::MessageSendingException(err.to_string()));
                let _ = request.reply.send(result);
            }
        });

        let reader_closed = closed.clone();
        let reader_node_id = remote_node_id;
        let reader_addr = remote_addr.clone();
        tokio::spawn(async move {
            loop {
                match source.next().await {
                    Some(Ok(WsMessage::Binary(bytes))) => match Message::from_json_bytes(&bytes) {
                        Ok(message) => {
                            consumer_registry.dispatch(
                                message,
                                ConnectionInfo {
                                    remote_addr: reader_addr.clone(),
                                    remote_node_id: Some(reader_node_id),
                                },
                            );
                        }
                        Err(err) => {
                            tracing::warn!(peer = %reader_addr, error = %err, "dropping malformed frame");
                        }
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ping/Pong/Text frames carry no application payload here.
                    }
                    Some(Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed))
                    | Some(Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed)) => break,
                    Some(Err(err)) => {
                        tracing::warn!(peer = %reader_addr, error = %err, "transient read error, continuing");
                    }
                }
            }
            reader_closed.store(true, Ordering::SeqCst);
            on_close(reader_node_id);
        });

        Arc::new(Self {
            remote_addr,
            remote_node_id,
            outbound: outbound_tx,
            closed,
        })
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn remote_node_id(&self) -> NodeId {
        self.remote_node_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends `message` over this connection. Fails with
    /// [`NetError::ConnectionClosed`] if the connection is already closed,
    /// or [`NetError::MessageSendingException`] if the frame write itself
    /// fails; neither tears the connection down (§4.3).
    pub async fn send(&self, message: Message) -> Result<(), NetError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NetError::ConnectionClosed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.outbound
            .send(SendRequest {
                message,
                reply: reply_tx,
            })
            .map_err(|_| NetError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| NetError::ConnectionClosed)?
    }
}
