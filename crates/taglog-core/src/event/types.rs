//! Event type names and canonical sets of them.
//!
//! Event types are free-form identifiers chosen by the application
//! (`CourseDefined`, `student.subscribed`, ...). Sets of event types are kept
//! sorted and deduplicated, the same canonical form as [`crate::tag::Tags`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum length of an event type name.
pub const MAX_EVENT_TYPE_LEN: usize = 100;

/// Name of the kind of fact an event records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventType(String);

impl EventType {
    /// Validate and wrap an event type name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEventType`] if the name is empty,
    /// longer than [`MAX_EVENT_TYPE_LEN`], or uses characters outside
    /// `[A-Za-z0-9_.:-]`.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::InvalidEventType {
                raw,
                reason: "must be non-empty",
            });
        }
        if raw.chars().count() > MAX_EVENT_TYPE_LEN {
            return Err(ValidationError::InvalidEventType {
                raw,
                reason: "must be at most 100 characters",
            });
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-'))
        {
            return Err(ValidationError::InvalidEventType {
                raw,
                reason: "only ASCII letters, digits, '_', '.', ':' and '-' are allowed",
            });
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for EventType {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// Custom serde: validate on the way in.
impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// A canonical, deduplicated set of [`EventType`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTypes(BTreeSet<EventType>);

impl EventTypes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(event_type: EventType) -> Self {
        Self(BTreeSet::from([event_type]))
    }

    /// Parse and normalize a list of event type names.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn try_from_strings<I, S>(raw: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .map(|s| EventType::new(s.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    /// Union of both sets. Returns `self` untouched when `other` adds nothing.
    #[must_use]
    pub fn merge(self, other: &Self) -> Self {
        if other.0.is_subset(&self.0) {
            return self;
        }
        let mut merged = self.0;
        merged.extend(other.0.iter().cloned());
        Self(merged)
    }

    #[must_use]
    pub fn contains(&self, event_type: &EventType) -> bool {
        self.0.contains(event_type)
    }

    /// Whether the sets share at least one event type.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.0.iter().any(|t| other.0.contains(t))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventType> {
        self.0.iter()
    }

    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl FromIterator<EventType> for EventTypes {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<EventType> for EventTypes {
    fn from(event_type: EventType) -> Self {
        Self::single(event_type)
    }
}

impl<'a> IntoIterator for &'a EventTypes {
    type Item = &'a EventType;
    type IntoIter = std::collections::btree_set::Iter<'a, EventType>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
