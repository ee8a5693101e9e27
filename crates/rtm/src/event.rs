use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event kind carried by conversational messages.
pub const EVENT_TYPE_MESSAGE: &str = "message";

/// A single inbound occurrence from the realtime stream.
///
/// Slack delivers events as open JSON objects rather than a closed schema,
/// so the dynamic shape is kept: an insertion-ordered map with typed
/// accessors for the fields the dispatch layer cares about. Events are
/// immutable once read and cloned into every matching handler invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn of_type(event_type: &str) -> Self {
        Self::new().with("type", event_type)
    }

    /// Builder-style field setter, used by transports and tests.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    pub fn is_message(&self) -> bool {
        self.event_type() == Some(EVENT_TYPE_MESSAGE)
    }

    pub fn text(&self) -> Option<&str> {
        self.str_field("text")
    }

    pub fn channel(&self) -> Option<&str> {
        self.str_field("channel")
    }

    pub fn user(&self) -> Option<&str> {
        self.str_field("user")
    }

    pub fn ts(&self) -> Option<&str> {
        self.str_field("ts")
    }

    pub fn team(&self) -> Option<&str> {
        self.str_field("team")
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}
