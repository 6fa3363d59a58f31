use async_trait::async_trait;
use uuid::Uuid;

use super::event::Event;

/// Identifies an [`EventListener`] independent of the weak handle the broker
/// holds to it, so `HasListener`/`RemoveListener` can address a listener
/// whose strong owner may already be gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A topic subscriber. Per the "weak references to listeners" redesign
/// note, strong ownership sits with whatever component instantiated the
/// listener; the broker only ever holds a [`std::sync::Weak`] handle to it
/// and prunes dead ones lazily.
#[async_trait]
pub trait EventListener: Send + Sync {
    fn id(&self) -> ListenerId;

    async fn handle_event(&self, event: Event);
}
