//! A single OR-branch of a query: tags AND event types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::event::{Event, EventType, EventTypes};
use crate::tag::Tags;

/// Serialized properties of a criterion, in canonical field order.
///
/// This is both the `properties` object of the query JSON format and the
/// input of the criterion hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CriterionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<EventTypes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub only_last_event: bool,
}

/// Predicate matching events that carry at least one of `tags` and whose
/// type is one of `event_types`. An absent field places no restriction, but
/// at least one of the two must be present.
///
/// `only_last_event` does not change [`Criterion::matches`]; it tells readers
/// of a whole log to keep only the highest-position match of this criterion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Criterion {
    event_types: Option<EventTypes>,
    tags: Option<Tags>,
    only_last_event: bool,
    hash: String,
}

impl Criterion {
    /// # Errors
    ///
    /// - [`ValidationError::EmptyCriterion`] when both fields are absent.
    /// - [`ValidationError::EmptyEventTypeSet`] / [`ValidationError::EmptyTagSet`]
    ///   when a present set has no elements.
    pub fn new(
        event_types: Option<EventTypes>,
        tags: Option<Tags>,
        only_last_event: bool,
    ) -> Result<Self, ValidationError> {
        if event_types.is_none() && tags.is_none() {
            return Err(ValidationError::EmptyCriterion);
        }
        if event_types.as_ref().is_some_and(EventTypes::is_empty) {
            return Err(ValidationError::EmptyEventTypeSet);
        }
        if tags.as_ref().is_some_and(Tags::is_empty) {
            return Err(ValidationError::EmptyTagSet);
        }
        Ok(Self::build(event_types, tags, only_last_event))
    }

    /// Match events carrying any of `tags`, regardless of type.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTagSet`] if `tags` is empty.
    pub fn tagged(tags: Tags) -> Result<Self, ValidationError> {
        Self::new(None, Some(tags), false)
    }

    /// Match events of any of `event_types`, regardless of tags.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEventTypeSet`] if `event_types` is empty.
    pub fn of_types(event_types: EventTypes) -> Result<Self, ValidationError> {
        Self::new(Some(event_types), None, false)
    }

    /// Same predicate, flagged so readers keep only its last match.
    #[must_use]
    pub fn only_last_event(self) -> Self {
        Self::build(self.event_types, self.tags, true)
    }

    fn build(event_types: Option<EventTypes>, tags: Option<Tags>, only_last_event: bool) -> Self {
        let hash = hash_properties(event_types.as_ref(), tags.as_ref(), only_last_event);
        Self {
            event_types,
            tags,
            only_last_event,
            hash,
        }
    }

    #[must_use]
    pub fn event_types(&self) -> Option<&EventTypes> {
        self.event_types.as_ref()
    }

    #[must_use]
    pub fn tags(&self) -> Option<&Tags> {
        self.tags.as_ref()
    }

    #[must_use]
    pub fn is_only_last_event(&self) -> bool {
        self.only_last_event
    }

    /// Content hash of the criterion (blake3 hex of its canonical properties).
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.matches_parts(&event.event_type, &event.tags)
    }

    pub(crate) fn matches_parts(&self, event_type: &EventType, tags: &Tags) -> bool {
        let tags_ok = self.tags.as_ref().is_none_or(|wanted| wanted.intersects(tags));
        let type_ok = self
            .event_types
            .as_ref()
            .is_none_or(|wanted| wanted.contains(event_type));
        tags_ok && type_ok
    }

    /// Two criteria can be folded into one when they share the flag and the
    /// exact tag set: `(T ∧ A) ∨ (T ∧ B)` is `T ∧ (A ∪ B)`.
    #[must_use]
    pub fn is_mergeable_with(&self, other: &Self) -> bool {
        self.only_last_event == other.only_last_event && self.tags == other.tags
    }

    /// Fold two mergeable criteria. An absent type set means "any type" and
    /// absorbs the other side.
    #[must_use]
    pub(crate) fn merged_with(&self, other: &Self) -> Self {
        debug_assert!(self.is_mergeable_with(other));
        let event_types = match (&self.event_types, &other.event_types) {
            (Some(left), Some(right)) => Some(left.clone().merge(right)),
            _ => None,
        };
        Self::build(event_types, self.tags.clone(), self.only_last_event)
    }

    pub(crate) fn properties(&self) -> CriterionProperties {
        CriterionProperties {
            event_types: self.event_types.clone(),
            tags: self.tags.clone(),
            only_last_event: self.only_last_event,
        }
    }

    pub(crate) fn from_properties(
        properties: CriterionProperties,
    ) -> Result<Self, ValidationError> {
        Self::new(
            properties.event_types,
            properties.tags,
            properties.only_last_event,
        )
    }
}

fn hash_properties(
    event_types: Option<&EventTypes>,
    tags: Option<&Tags>,
    only_last_event: bool,
) -> String {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Borrowed<'a> {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_types: Option<&'a EventTypes>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<&'a Tags>,
        only_last_event: bool,
    }

    // Serializing sets of validated strings cannot fail; fall back to the
    // Debug form rather than panic if it ever does.
    let canonical = serde_json::to_string(&Borrowed {
        event_types,
        tags,
        only_last_event,
    })
    .unwrap_or_else(|_| format!("{event_types:?}|{tags:?}|{only_last_event}"));
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if let Some(types) = &self.event_types {
            parts.push(format!("types=[{}]", types.to_strings().join(",")));
        }
        if let Some(tags) = &self.tags {
            parts.push(format!("tags=[{tags}]"));
        }
        if self.only_last_event {
            parts.push("last".to_string());
        }
        f.write_str(&parts.join(" "))
    }
}
