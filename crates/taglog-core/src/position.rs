//! Global log positions and the expectation half of an append condition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

use crate::error::ValidationError;

/// Position of an event in the global log.
///
/// Positions start at 1 for the first event ever appended and increase by
/// exactly one per event. "No event" is expressed with `Option`, never with a
/// zero sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequencePosition(NonZeroU64);

impl SequencePosition {
    /// Position of the first event in any log.
    pub const FIRST: Self = Self(NonZeroU64::MIN);

    /// Create a position, returning `None` for zero.
    ///
    /// There is no infallible constructor: zero is never a position, and
    /// "nothing observed" is [`ExpectedHighestSequenceNumber::None`].
    #[must_use]
    pub const fn try_new(value: u64) -> Option<Self> {
        match NonZeroU64::new(value) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// The position immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Zero-based index of this position in an in-memory log.
    #[must_use]
    pub fn index(self) -> usize {
        usize::try_from(self.0.get() - 1).unwrap_or(usize::MAX)
    }
}

impl TryFrom<u64> for SequencePosition {
    type Error = ValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or(ValidationError::ZeroPosition)
    }
}

impl fmt::Display for SequencePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the writer believes about the slice of the log its query selects.
///
/// Three states, deliberately not collapsed into `Option<SequencePosition>`:
/// "nothing may match" and "don't check" are both legitimate intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "position", rename_all = "snake_case")]
pub enum ExpectedHighestSequenceNumber {
    /// No event may match the query.
    None,
    /// No check at all.
    Any,
    /// The highest matching event must be at or before this position.
    Position(SequencePosition),
}

impl ExpectedHighestSequenceNumber {
    /// Build the expectation from the highest matching position a reader
    /// observed: `None` when nothing matched.
    #[must_use]
    pub const fn from_position(highest: Option<SequencePosition>) -> Self {
        match highest {
            Some(position) => Self::Position(position),
            None => Self::None,
        }
    }

    #[must_use]
    pub const fn is_any(self) -> bool {
        matches!(self, Self::Any)
    }
}

impl From<SequencePosition> for ExpectedHighestSequenceNumber {
    fn from(position: SequencePosition) -> Self {
        Self::Position(position)
    }
}

impl fmt::Display for ExpectedHighestSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Any => f.write_str("any"),
            Self::Position(p) => write!(f, "{p}"),
        }
    }
}
