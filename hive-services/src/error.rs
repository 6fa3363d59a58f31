use thiserror::Error;

/// Service-layer errors (§7): these always surface through the caller's
/// response future, never as job failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no callable executor found for service {0}")]
    NoCallableServiceFound(String),

    #[error("call failed: {0}")]
    CallFailed(String),

    #[error("call timed out")]
    CallTimedOut,

    #[error("messaging error: {0}")]
    Net(#[from] hive_net::NetError),
}
