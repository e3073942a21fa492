//! Event data model for the taglog event log.
//!
//! An [`Event`] is what a writer proposes: an id, a type, an opaque payload,
//! a set of tags and free-form metadata. The log turns it into a
//! [`SequencedEvent`] exactly once, at append time, by assigning a
//! [`SequencePosition`] and a recorded timestamp.
//!
//! Payload encoding and id generation belong to the caller; the log only
//! checks that ids are well-formed and that payloads fit the configured size.

pub mod types;

pub use types::{EventType, EventTypes};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;
use crate::position::SequencePosition;
use crate::tag::Tags;

/// Caller-assigned event identifier (typically a UUID string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEventId`] for empty ids or ids that
    /// contain whitespace.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidEventId { raw });
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque event payload. Usually JSON, never interpreted by the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(String);

impl EventData {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Encode a serializable value as the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the value cannot be serialized.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Free-form infrastructure context (correlation ids, causation ids, ...).
pub type EventMetadata = BTreeMap<String, serde_json::Value>;

/// An event proposed for appending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,

    #[serde(rename = "type")]
    pub event_type: EventType,

    pub data: EventData,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: EventMetadata,
}

impl Event {
    /// Create an untagged event without metadata.
    #[must_use]
    pub fn new(id: EventId, event_type: EventType, data: EventData) -> Self {
        Self {
            id,
            event_type,
            data,
            tags: Tags::new(),
            metadata: EventMetadata::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t[{}]", self.id, self.event_type, self.tags)
    }
}

/// A non-empty batch of events appended atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Events(Vec<Event>);

impl Events {
    #[must_use]
    pub fn single(event: Event) -> Self {
        Self(vec![event])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with collections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.0.iter()
    }
}

impl From<Event> for Events {
    fn from(event: Event) -> Self {
        Self::single(event)
    }
}

impl TryFrom<Vec<Event>> for Events {
    type Error = ValidationError;

    fn try_from(events: Vec<Event>) -> Result<Self, Self::Error> {
        if events.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(Self(events))
    }
}

impl IntoIterator for Events {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// An event as recorded by the log. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub position: SequencePosition,
    pub recorded_at: DateTime<Utc>,
    pub event: Event,
}

impl fmt::Display for SequencedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}",
            self.position,
            self.recorded_at.to_rfc3339(),
            self.event
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_event() -> Event {
        Event::new(
            EventId::new("e-1").expect("id"),
            EventType::new("CourseDefined").expect("type"),
            EventData::new(r#"{"capacity":10}"#),
        )
        .with_tags(Tags::try_from_strings(["course:c1"]).expect("tags"))
        .with_metadata("correlation", json!("abc"))
    }

    #[test]
    fn event_id_rejects_blank() {
        assert!(EventId::new("").is_err());
        assert!(EventId::new("a b").is_err());
        assert_eq!(EventId::new("7f3a").expect("id").as_str(), "7f3a");
    }

    #[test]
    fn event_data_from_json() {
        let data = EventData::from_json(&json!({"a": 1})).expect("json");
        assert_eq!(data.as_str(), r#"{"a":1}"#);
        assert_eq!(data.len(), 7);
    }

    #[test]
    fn events_batch_rejects_empty() {
        assert_eq!(Events::try_from(Vec::new()), Err(ValidationError::EmptyBatch));
        let batch = Events::try_from(vec![sample_event(), sample_event()]).expect("batch");
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = sample_event();
        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains(r#""type":"CourseDefined""#));
        assert!(json.contains(r#""tags":["course:c1"]"#));
        let back: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[test]
    fn event_serde_defaults_tags_and_metadata() {
        let back: Event =
            serde_json::from_str(r#"{"id":"e","type":"T","data":""}"#).expect("deserialize");
        assert!(back.tags.is_empty());
        assert!(back.metadata.is_empty());
    }

    #[test]
    fn event_serde_rejects_invalid_id() {
        assert!(serde_json::from_str::<Event>(r#"{"id":"","type":"T","data":""}"#).is_err());
    }

    #[test]
    fn sequenced_event_display() {
        let recorded = SequencedEvent {
            position: SequencePosition::try_new(4).expect("position"),
            recorded_at: Utc.timestamp_opt(1_700_000_000, 0).single().expect("ts"),
            event: sample_event(),
        };
        let display = recorded.to_string();
        assert!(display.starts_with("4\t2023-11-14"));
        assert!(display.contains("CourseDefined"));
        assert!(display.contains("course:c1"));
    }
}
