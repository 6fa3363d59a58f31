use hive_common::{NodeId, TransactionId, Value, ValueMap};
use hive_net::{Message, TYPE_SERVICE_REQUEST, TYPE_SERVICE_RESPONSE};

/// Response status carried on the wire by `service-response` messages
/// (§6). `Gone` means the registry had no local caller for the requested
/// service; `Busy` means every executor was saturated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Ok,
    Busy,
    Gone,
    ParameterError,
    InternalError,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Ok => "OK",
            ServiceStatus::Busy => "BUSY",
            ServiceStatus::Gone => "GONE",
            ServiceStatus::ParameterError => "PARAMETER_ERROR",
            ServiceStatus::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(ServiceStatus::Ok),
            "BUSY" => Some(ServiceStatus::Busy),
            "GONE" => Some(ServiceStatus::Gone),
            "PARAMETER_ERROR" => Some(ServiceStatus::ParameterError),
            "INTERNAL_ERROR" => Some(ServiceStatus::InternalError),
            _ => None,
        }
    }

    /// Whether the caller (C5) should consider retrying with another
    /// attempt. Only `Busy` is retryable per §4.5.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceStatus::Busy)
    }
}

/// A request to invoke a named service. `params` is carried over the wire
/// as `p:<name>` string attributes (§6); locally this is a tagged
/// [`Value`] map so in-process callers keep their typed values.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub service_name: String,
    pub params: ValueMap,
}

impl ServiceRequest {
    pub fn new(service_name: impl Into<String>, params: ValueMap) -> Self {
        Self {
            service_name: service_name.into(),
            params,
        }
    }

    pub fn to_message(&self, transaction_id: TransactionId) -> Message {
        let mut message = Message::new(TYPE_SERVICE_REQUEST)
            .with_attribute("service-name", self.service_name.clone())
            .with_attribute("transaction-id", transaction_id.to_string());
        for (name, value) in &self.params {
            message.set_param(name, value);
        }
        message
    }

    pub fn from_message(message: &Message) -> Option<Self> {
        let service_name = message.attributes.get("service-name")?.clone();
        let params = message
            .params()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Some(Self { service_name, params })
    }
}

/// A service call's outcome, either produced locally or decoded from an
/// inbound `service-response` message.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: ServiceStatus,
    pub status_message: Option<String>,
    pub results: ValueMap,
}

impl ServiceResponse {
    pub fn ok(results: ValueMap) -> Self {
        Self {
            status: ServiceStatus::Ok,
            status_message: None,
            results,
        }
    }

    pub fn error(status: ServiceStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            status_message: Some(message.into()),
            results: ValueMap::new(),
        }
    }

    pub fn to_message(&self, transaction_id: TransactionId) -> Message {
        let mut message = Message::new(TYPE_SERVICE_RESPONSE)
            .with_attribute("transaction-id", transaction_id.to_string())
            .with_attribute("status", self.status.as_str());
        if let Some(status_message) = &self.status_message {
            message = message.with_attribute("status-message", status_message.clone());
        }
        for (name, value) in &self.results {
            message.set_result(name, value);
        }
        message
    }

    pub fn from_message(message: &Message) -> Option<(TransactionId, Self)> {
        let transaction_id = message.attributes.get("transaction-id")?;
        let transaction_id = TransactionId::parse(transaction_id).ok()?;
        let status = ServiceStatus::parse(message.attributes.get("status")?)?;
        let status_message = message.attributes.get("status-message").cloned();
        let results = message
            .results()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Some((
            transaction_id,
            Self {
                status,
                status_message,
                results,
            },
        ))
    }
}

/// Identifies the executor-or-caller side of a registration; used by
/// [`crate::registry::ServiceRegistry`] when routing an inbound request
/// back to the connection it arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutorId(uuid::Uuid);

impl ExecutorId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// The peer a remote executor forwards calls to.
#[derive(Debug, Clone, Copy)]
pub struct RemotePeer {
    pub node_id: NodeId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_message() {
        let mut params = ValueMap::new();
        params.insert("a".to_string(), Value::Int(5));
        params.insert("b".to_string(), Value::Int(6));
        let request = ServiceRequest::new("add", params);
        let txn = TransactionId::new();
        let message = request.to_message(txn);
        let decoded = ServiceRequest::from_message(&message).unwrap();
        assert_eq!(decoded.service_name, "add");
        assert_eq!(decoded.params.get("a").unwrap().as_str(), Some("5"));
    }

    #[test]
    fn response_round_trips_through_message() {
        let mut results = ValueMap::new();
        results.insert("sum".to_string(), Value::Int(11));
        let response = ServiceResponse::ok(results);
        let txn = TransactionId::new();
        let message = response.to_message(txn);
        let (decoded_txn, decoded) = ServiceResponse::from_message(&message).unwrap();
        assert_eq!(decoded_txn, txn);
        assert_eq!(decoded.status, ServiceStatus::Ok);
        assert_eq!(decoded.results.get("sum").unwrap().as_str(), Some("11"));
    }
}
