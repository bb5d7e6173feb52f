//! Rows carried on the `events` stream.
//!
//! Each row is prefixed on the wire by its type tag, e.g.
//!
//! ```text
//! RDATA events 12345 ["ev", ["$event:id", "!room:id", "m.type", null, null]]
//! ```
//!
//! An `ev` row is sent for each new event. Its fields, in order, are the
//! event id, the room id, the event type, the state key (state events only)
//! and the id of the event redacted by this one.

use super::registry::{optional_string, required_string, RowDescriptor, RowRegistry, StreamRow};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A new event was persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub room_id: String,
    /// Event type, e.g. `m.room.message`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Present only for state events.
    pub state_key: Option<String>,
    /// Id of an earlier event this one redacts.
    pub redacts: Option<String>,
}

impl EventRow {
    pub const TYPE_TAG: &'static str = "ev";
    pub const FIELD_COUNT: usize = 5;

    pub const DESCRIPTOR: RowDescriptor<EventsStreamRow> =
        RowDescriptor::new(Self::TYPE_TAG, Self::FIELD_COUNT, decode_event);

    pub fn new(
        event_id: impl Into<String>,
        room_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            room_id: room_id.into(),
            kind: kind.into(),
            state_key: None,
            redacts: None,
        }
    }

    pub fn with_state_key(mut self, state_key: impl Into<String>) -> Self {
        self.state_key = Some(state_key.into());
        self
    }

    pub fn with_redacts(mut self, event_id: impl Into<String>) -> Self {
        self.redacts = Some(event_id.into());
        self
    }

    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    fn from_positional(data: &[Value]) -> Result<Self> {
        let tag = Self::TYPE_TAG;
        Ok(Self {
            event_id: required_string(tag, data, 0, "event_id")?,
            room_id: required_string(tag, data, 1, "room_id")?,
            kind: required_string(tag, data, 2, "type")?,
            state_key: optional_string(tag, data, 3, "state_key")?,
            redacts: optional_string(tag, data, 4, "redacts")?,
        })
    }

    fn to_positional(&self) -> Vec<Value> {
        let optional = |v: &Option<String>| v.clone().map_or(Value::Null, Value::String);
        vec![
            Value::String(self.event_id.clone()),
            Value::String(self.room_id.clone()),
            Value::String(self.kind.clone()),
            optional(&self.state_key),
            optional(&self.redacts),
        ]
    }
}

fn decode_event(data: &[Value]) -> Result<EventsStreamRow> {
    EventRow::from_positional(data).map(EventsStreamRow::Event)
}

/// Every row variant of the `events` stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventsStreamRow {
    Event(EventRow),
}

impl EventsStreamRow {
    /// Registry of all `events` stream variants.
    pub fn registry() -> Result<RowRegistry<Self>> {
        RowRegistry::with_descriptors([EventRow::DESCRIPTOR])
    }
}

impl StreamRow for EventsStreamRow {
    fn type_tag(&self) -> &'static str {
        match self {
            EventsStreamRow::Event(_) => EventRow::TYPE_TAG,
        }
    }

    fn to_positional(&self) -> Vec<Value> {
        match self {
            EventsStreamRow::Event(row) => row.to_positional(),
        }
    }
}

impl From<EventRow> for EventsStreamRow {
    fn from(row: EventRow) -> Self {
        EventsStreamRow::Event(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use serde_json::json;

    #[test]
    fn test_positional_layout() {
        let row = EventRow::new("$b", "!r1", "m.room.redaction").with_redacts("$a");
        assert_eq!(
            row.to_positional(),
            vec![
                json!("$b"),
                json!("!r1"),
                json!("m.room.redaction"),
                json!(null),
                json!("$a")
            ]
        );
    }

    #[test]
    fn test_state_event() {
        let row = EventRow::new("$s", "!r1", "m.room.name").with_state_key("");
        assert!(row.is_state());
        assert_eq!(row.to_positional()[3], json!(""));
        assert!(!EventRow::new("$m", "!r1", "m.room.message").is_state());
    }

    #[test]
    fn test_registry_contains_ev() {
        let registry = EventsStreamRow::registry().unwrap();
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["ev"]);

        let row = registry
            .lookup("ev")
            .unwrap()
            .from_positional(&[json!("$a"), json!("!r1"), json!("m.text"), json!(null), json!(null)])
            .unwrap();
        assert_eq!(row, EventsStreamRow::Event(EventRow::new("$a", "!r1", "m.text")));
    }

    #[test]
    fn test_required_fields_reject_null() {
        let result = EventRow::DESCRIPTOR.from_positional(&[
            json!("$a"),
            json!(null),
            json!("m.text"),
            json!(null),
            json!(null),
        ]);
        assert!(matches!(result, Err(FeedError::MalformedRow { .. })));
    }
}
