//! Peer-to-peer messaging layer: persistent WebSocket connections with a
//! node-identity handshake (C3), and typed message dispatch to registered
//! consumers (C4).

pub mod connection;
pub mod consumers;
pub mod endpoint;
pub mod error;
mod handshake;
pub mod message;

pub use connection::Connection;
pub use consumers::{ConnectionInfo, ConsumerRegistry, MessageConsumer};
pub use endpoint::Endpoint;
pub use error::NetError;
pub use message::{Message, TYPE_SERVICE_REGISTRATION, TYPE_SERVICE_REQUEST, TYPE_SERVICE_RESPONSE};
