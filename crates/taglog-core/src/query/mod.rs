//! Queries: disjunctions of [`Criterion`]s selecting a slice of the log.
//!
//! The same [`Query`] filters reads and scopes the consistency check of a
//! conditional append. [`Query::All`] is the wildcard; it is an explicit
//! variant rather than an empty criteria list.
//!
//! # Merging
//!
//! [`Query::merge`] returns a query matching exactly the events matched by
//! either input. Criteria sharing their tag set and `only_last_event` flag
//! are folded into one criterion with the union of their event types, every
//! other criterion is carried over as-is, and structurally equal results are
//! emitted once.

pub mod codec;
pub mod criterion;

pub use criterion::Criterion;

use std::collections::HashSet;
use std::fmt;

use crate::error::ValidationError;
use crate::event::{Event, EventTypes};
use crate::tag::Tags;

/// A non-empty, ordered list of criteria combined with OR.
///
/// Order does not change matching; it is kept so serialization is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Criteria(Vec<Criterion>);

impl Criteria {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCriteria`] if `criteria` is empty.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, ValidationError> {
        if criteria.is_empty() {
            return Err(ValidationError::EmptyCriteria);
        }
        Ok(Self(criteria))
    }

    #[must_use]
    pub fn single(criterion: Criterion) -> Self {
        Self(vec![criterion])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a `Criteria` value holds at least one criterion.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Criterion> {
        self.0.iter()
    }

    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.0.iter().any(|c| c.matches(event))
    }

    /// Many-to-many merge: each left criterion folds with every still-unused
    /// mergeable right criterion; leftovers on both sides pass through.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut used = vec![false; other.0.len()];
        let mut merged = Vec::with_capacity(self.0.len() + other.0.len());

        for left in &self.0 {
            let mut folded = false;
            for (slot, right) in used.iter_mut().zip(&other.0) {
                if *slot || !left.is_mergeable_with(right) {
                    continue;
                }
                merged.push(left.merged_with(right));
                *slot = true;
                folded = true;
            }
            if !folded {
                merged.push(left.clone());
            }
        }

        merged.extend(
            other
                .0
                .iter()
                .zip(&used)
                .filter(|(_, used)| !**used)
                .map(|(right, _)| right.clone()),
        );

        let mut seen = HashSet::with_capacity(merged.len());
        merged.retain(|c| seen.insert(c.hash().to_string()));

        tracing::trace!(
            left = self.0.len(),
            right = other.0.len(),
            result = merged.len(),
            "merged criteria"
        );
        Self(merged)
    }
}

impl<'a> IntoIterator for &'a Criteria {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Selection of events from the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Every event matches.
    All,
    /// Events matching at least one criterion.
    Matching(Criteria),
}

impl Query {
    #[must_use]
    pub const fn all() -> Self {
        Self::All
    }

    /// Build a query from criteria; an empty list is the wildcard.
    #[must_use]
    pub fn from_criteria(criteria: Vec<Criterion>) -> Self {
        Criteria::new(criteria).map_or(Self::All, Self::Matching)
    }

    /// Events carrying any of `tags`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTagSet`] if `tags` is empty.
    pub fn for_tags(tags: Tags) -> Result<Self, ValidationError> {
        Criterion::tagged(tags).map(|c| Self::Matching(Criteria::single(c)))
    }

    /// Events of any of `event_types`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEventTypeSet`] if `event_types` is empty.
    pub fn for_event_types(event_types: EventTypes) -> Result<Self, ValidationError> {
        Criterion::of_types(event_types).map(|c| Self::Matching(Criteria::single(c)))
    }

    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Criteria of this query; `None` for the wildcard.
    #[must_use]
    pub const fn criteria(&self) -> Option<&Criteria> {
        match self {
            Self::All => None,
            Self::Matching(criteria) => Some(criteria),
        }
    }

    #[must_use]
    pub fn matches_event(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Matching(criteria) => criteria.matches(event),
        }
    }

    /// Whether any criterion restricts reads to its last match.
    #[must_use]
    pub fn has_only_last_event(&self) -> bool {
        self.criteria()
            .is_some_and(|c| c.iter().any(Criterion::is_only_last_event))
    }

    /// Query matching the events of `self` OR `other`. The wildcard absorbs.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Matching(left), Self::Matching(right)) => Self::Matching(left.merge(right)),
        }
    }
}

impl From<Criterion> for Query {
    fn from(criterion: Criterion) -> Self {
        Self::Matching(Criteria::single(criterion))
    }
}

impl From<Criteria> for Query {
    fn from(criteria: Criteria) -> Self {
        Self::Matching(criteria)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Matching(criteria) => {
                let parts: Vec<String> = criteria.iter().map(|c| format!("({c})")).collect();
                f.write_str(&parts.join(" | "))
            }
        }
    }
}
