use futures_util::{SinkExt, StreamExt};
use hive_common::NodeId;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::connection::WsStream;
use crate::error::NetError;

/// Node handshake (§4.3, authoritative per the Open Question on handshake
/// order): the client writes its node-id as a single binary frame first,
/// then the server replies with its own. Both sides key the resulting
/// [`crate::connection::Connection`] by the peer's id once this completes.
pub(crate) async fn client_handshake(
    stream: &mut WsStream,
    local_node_id: NodeId,
) -> Result<NodeId, NetError> {
    write_node_id(stream, local_node_id).await?;
    read_node_id(stream).await
}

pub(crate) async fn server_handshake(
    stream: &mut WsStream,
    local_node_id: NodeId,
) -> Result<NodeId, NetError> {
    let peer = read_node_id(stream).await?;
    write_node_id(stream, local_node_id).await?;
    Ok(peer)
}

async fn write_node_id(stream: &mut WsStream, id: NodeId) -> Result<(), NetError> {
    stream
        .send(WsMessage::Binary(id.to_string().into_bytes()))
        .await
        .map_err(|err| NetError::NodeHandshakeFailed(err.to_string()))
}

async fn read_node_id(stream: &mut WsStream) -> Result<NodeId, NetError> {
    match stream.next().await {
        Some(Ok(WsMessage::Binary(bytes))) => {
            let text = String::from_utf8(bytes)
                .map_err(|err| NetError::NodeHandshakeFailed(err.to_string()))?;
            NodeId::parse(&text).map_err(|err| NetError::NodeHandshakeFailed(err.to_string()))
        }
        Some(Ok(other)) => Err(NetError::NodeHandshakeFailed(format!(
            "expected a binary node-id frame, got {other:?}"
        ))),
        Some(Err(err)) => Err(NetError::NodeHandshakeFailed(err.to_string())),
        None => Err(NetError::NodeHandshakeFailed(
            "peer closed before completing handshake".to_string(),
        )),
    }
}
