use thiserror::Error;

/// Transient wire errors (§7): reported to the initiator of the operation
/// that failed. The endpoint itself stays healthy and keeps accepting new
/// work.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("cannot resolve host {0}")]
    CannotResolveHost(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("websocket handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("node handshake failed: {0}")]
    NodeHandshakeFailed(String),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("no connection to peer {0}")]
    NoSuchPeer(String),

    #[error("message sending failed: {0}")]
    MessageSendingException(String),

    #[error("invalid message frame: {0}")]
    InvalidMessage(String),

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::InvalidMessage(err.to_string())
    }
}
