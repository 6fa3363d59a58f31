use thiserror::Error;

pub use crate::jobs::JobError;

/// Errors raised by the event broker (C2).
#[derive(Debug, Error)]
pub enum EventError {
    #[error("listener {0} is already registered for this topic")]
    DuplicateListener(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_error_displays_listener_id() {
        let err = EventError::DuplicateListener("abc".to_string());
        assert_eq!(err.to_string(), "listener abc is already registered for this topic");
    }
}
