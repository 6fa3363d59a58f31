use thiserror::Error;

/// Top-level error composed from each component's own error type, raised
/// only at node start-up; once running, component errors are handled
/// locally (logged, retried, or surfaced through an RPC response) rather
/// than propagated here.
#[derive(Debug, Error)]
pub enum HiveError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("networking error: {0}")]
    Net(#[from] hive_net::NetError),
}
