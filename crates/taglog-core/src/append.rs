//! The optimistic-concurrency guard passed to append.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConditionalAppendFailed;
use crate::position::{ExpectedHighestSequenceNumber, SequencePosition};
use crate::query::Query;

/// "No event matching `query` may exist beyond `expected`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCondition {
    pub query: Query,
    pub expected: ExpectedHighestSequenceNumber,
}

impl AppendCondition {
    #[must_use]
    pub const fn new(query: Query, expected: ExpectedHighestSequenceNumber) -> Self {
        Self { query, expected }
    }

    /// Fail if any event matches `query`.
    #[must_use]
    pub const fn fail_if_events_match(query: Query) -> Self {
        Self::new(query, ExpectedHighestSequenceNumber::None)
    }

    /// Fail if an event matching `query` exists after `position`.
    #[must_use]
    pub const fn after(query: Query, position: SequencePosition) -> Self {
        Self::new(query, ExpectedHighestSequenceNumber::Position(position))
    }

    /// Evaluate the expectation against the highest position that currently
    /// matches the query.
    ///
    /// Storage backends must compute `highest` and commit the append as one
    /// serializable unit; this function only decides.
    ///
    /// # Errors
    ///
    /// - [`ConditionalAppendFailed::MatchingEventsExist`] when nothing was
    ///   expected and a match exists.
    /// - [`ConditionalAppendFailed::MatchingEventsExistAfter`] when a match
    ///   exists beyond the expected position.
    pub fn check(&self, highest: Option<SequencePosition>) -> Result<(), ConditionalAppendFailed> {
        match (self.expected, highest) {
            (ExpectedHighestSequenceNumber::Any, _) | (_, None) => Ok(()),
            (ExpectedHighestSequenceNumber::None, Some(highest)) => {
                Err(ConditionalAppendFailed::MatchingEventsExist { highest })
            }
            (ExpectedHighestSequenceNumber::Position(expected), Some(highest)) => {
                if highest > expected {
                    Err(ConditionalAppendFailed::MatchingEventsExistAfter { expected, highest })
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Display for AppendCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= {}", self.query, self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(v: u64) -> SequencePosition {
        SequencePosition::try_new(v).expect("position")
    }

    #[test]
    fn none_expected_passes_on_empty_slice() {
        let cond = AppendCondition::fail_if_events_match(Query::all());
        assert_eq!(cond.check(None), Ok(()));
    }

    #[test]
    fn none_expected_fails_on_any_match() {
        let cond = AppendCondition::fail_if_events_match(Query::all());
        assert_eq!(
            cond.check(Some(pos(1))),
            Err(ConditionalAppendFailed::MatchingEventsExist { highest: pos(1) })
        );
    }

    #[test]
    fn any_never_fails() {
        let cond = AppendCondition::new(Query::all(), ExpectedHighestSequenceNumber::Any);
        assert_eq!(cond.check(None), Ok(()));
        assert_eq!(cond.check(Some(pos(99))), Ok(()));
    }

    #[test]
    fn position_expected_allows_up_to_and_including() {
        let cond = AppendCondition::after(Query::all(), pos(5));
        assert_eq!(cond.check(None), Ok(()));
        assert_eq!(cond.check(Some(pos(4))), Ok(()));
        assert_eq!(cond.check(Some(pos(5))), Ok(()));
    }

    #[test]
    fn position_expected_fails_when_stale() {
        let cond = AppendCondition::after(Query::all(), pos(5));
        assert_eq!(
            cond.check(Some(pos(6))),
            Err(ConditionalAppendFailed::MatchingEventsExistAfter {
                expected: pos(5),
                highest: pos(6),
            })
        );
    }

    #[test]
    fn serde_roundtrip() {
        let cond = AppendCondition::after(Query::all(), pos(3));
        let json = serde_json::to_string(&cond).expect("ser");
        let back: AppendCondition = serde_json::from_str(&json).expect("de");
        assert_eq!(back, cond);
    }
}
