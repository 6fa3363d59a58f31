use uuid::Uuid;

use crate::value::ValueMap;

/// A fired event: a topic, a unique id, and a payload map of tagged values.
/// Created by a producer, fired into the [`super::EventBroker`], and
/// discarded once the last listener job for it finishes.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub id: Uuid,
    pub payload: ValueMap,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: ValueMap) -> Self {
        Self {
            topic: topic.into(),
            id: Uuid::new_v4(),
            payload,
        }
    }
}
