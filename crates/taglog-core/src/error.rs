use std::fmt;

use crate::event::EventId;
use crate::position::SequencePosition;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidTag,
    InvalidEventType,
    InvalidEventId,
    InvalidCriterion,
    EmptyBatch,
    InvalidPosition,
    MatchingEventsExist,
    MatchingEventsExistAfter,
    BatchTooLarge,
    PayloadTooLarge,
    MalformedQueryJson,
    UnsupportedQueryVersion,
    UnknownCriterionType,
    CriterionHashMismatch,
    ConfigParseError,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidTag => "E1001",
            Self::InvalidEventType => "E1002",
            Self::InvalidEventId => "E1003",
            Self::InvalidCriterion => "E1004",
            Self::EmptyBatch => "E1005",
            Self::InvalidPosition => "E1006",
            Self::MatchingEventsExist => "E2001",
            Self::MatchingEventsExistAfter => "E2002",
            Self::BatchTooLarge => "E2003",
            Self::PayloadTooLarge => "E2004",
            Self::MalformedQueryJson => "E3001",
            Self::UnsupportedQueryVersion => "E3002",
            Self::UnknownCriterionType => "E3003",
            Self::CriterionHashMismatch => "E3004",
            Self::ConfigParseError => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidTag => "Invalid tag",
            Self::InvalidEventType => "Invalid event type",
            Self::InvalidEventId => "Invalid event id",
            Self::InvalidCriterion => "Invalid query criterion",
            Self::EmptyBatch => "Empty event batch",
            Self::InvalidPosition => "Invalid sequence position",
            Self::MatchingEventsExist => "Matching events exist",
            Self::MatchingEventsExistAfter => "Matching events exist after expected position",
            Self::BatchTooLarge => "Event batch too large",
            Self::PayloadTooLarge => "Event payload too large",
            Self::MalformedQueryJson => "Malformed query JSON",
            Self::UnsupportedQueryVersion => "Unsupported query version",
            Self::UnknownCriterionType => "Unknown criterion type",
            Self::CriterionHashMismatch => "Criterion hash mismatch",
            Self::ConfigParseError => "Config file parse error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidTag => {
                Some("Tags are `key:value`: a key of 1-50 [A-Za-z0-9_-], a value of 1-50 [A-Za-z0-9_:-].")
            }
            Self::InvalidEventType => {
                Some("Event types are 1-100 characters of [A-Za-z0-9_.:-].")
            }
            Self::InvalidEventId => Some("Event ids must be non-empty and contain no whitespace."),
            Self::InvalidCriterion => {
                Some("Give each criterion at least one non-empty tag set or event type set.")
            }
            Self::EmptyBatch => Some("Append at least one event."),
            Self::InvalidPosition => {
                Some("Positions start at 1. Expect `None` when nothing matched.")
            }
            Self::MatchingEventsExist | Self::MatchingEventsExistAfter => {
                Some("Re-read the query, rebuild the decision, and retry the append.")
            }
            Self::BatchTooLarge => Some("Split the batch or raise `max_batch_size`."),
            Self::PayloadTooLarge => Some("Store large payloads elsewhere and reference them."),
            Self::MalformedQueryJson => None,
            Self::UnsupportedQueryVersion => {
                Some("Re-serialize the query with the current library version.")
            }
            Self::UnknownCriterionType => None,
            Self::CriterionHashMismatch => {
                Some("The criterion properties were edited after serialization.")
            }
            Self::ConfigParseError => Some("Fix syntax in the store config file and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A value failed validation at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid tag '{raw}': {reason}")]
    InvalidTag { raw: String, reason: &'static str },

    #[error("invalid event type '{raw}': {reason}")]
    InvalidEventType { raw: String, reason: &'static str },

    #[error("invalid event id '{raw}': must be non-empty without whitespace")]
    InvalidEventId { raw: String },

    #[error("criterion needs at least one of event types or tags")]
    EmptyCriterion,

    #[error("criterion tag set must not be empty")]
    EmptyTagSet,

    #[error("criterion event type set must not be empty")]
    EmptyEventTypeSet,

    #[error("criteria must contain at least one criterion; use Query::all() for a wildcard")]
    EmptyCriteria,

    #[error("an event batch must contain at least one event")]
    EmptyBatch,

    #[error("sequence positions start at 1")]
    ZeroPosition,
}

impl ValidationError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTag { .. } => ErrorCode::InvalidTag,
            Self::InvalidEventType { .. } => ErrorCode::InvalidEventType,
            Self::InvalidEventId { .. } => ErrorCode::InvalidEventId,
            Self::EmptyCriterion
            | Self::EmptyTagSet
            | Self::EmptyEventTypeSet
            | Self::EmptyCriteria => ErrorCode::InvalidCriterion,
            Self::EmptyBatch => ErrorCode::EmptyBatch,
            Self::ZeroPosition => ErrorCode::InvalidPosition,
        }
    }
}

/// The append condition did not hold against the current log.
///
/// Both variants carry the highest position that currently matches the
/// condition's query, so the caller can decide whether to re-read and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConditionalAppendFailed {
    /// Expected no matching event, found at least one.
    #[error("expected no events matching the query, but the highest match is at {highest}")]
    MatchingEventsExist { highest: SequencePosition },

    /// An event matching the query was appended after the expected position.
    #[error("expected highest matching position {expected}, but found a match at {highest}")]
    MatchingEventsExistAfter {
        expected: SequencePosition,
        highest: SequencePosition,
    },
}

impl ConditionalAppendFailed {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MatchingEventsExist { .. } => ErrorCode::MatchingEventsExist,
            Self::MatchingEventsExistAfter { .. } => ErrorCode::MatchingEventsExistAfter,
        }
    }

    /// Highest position matching the query at the time of the failed append.
    #[must_use]
    pub const fn highest(&self) -> SequencePosition {
        match self {
            Self::MatchingEventsExist { highest }
            | Self::MatchingEventsExistAfter { highest, .. } => *highest,
        }
    }
}

/// Reasons an append can be rejected. Nothing is committed in any case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppendError {
    #[error(transparent)]
    ConditionFailed(#[from] ConditionalAppendFailed),

    #[error("batch of {len} events exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("event {event_id} payload is {len} bytes, exceeds the limit of {max} bytes")]
    PayloadTooLarge {
        event_id: EventId,
        len: usize,
        max: usize,
    },
}

impl AppendError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ConditionFailed(inner) => inner.code(),
            Self::BatchTooLarge { .. } => ErrorCode::BatchTooLarge,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// The conditional-append failure, if that is why the append was rejected.
    #[must_use]
    pub const fn as_condition_failed(&self) -> Option<&ConditionalAppendFailed> {
        match self {
            Self::ConditionFailed(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Errors raised while decoding or encoding a serialized query.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("malformed query JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported query version '{found}', expected '{expected}'")]
    UnsupportedVersion {
        found: String,
        expected: &'static str,
    },

    #[error("unknown criterion type '{0}'")]
    UnknownCriterionType(String),

    #[error("criterion hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: String, computed: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl SerializationError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Json(_) => ErrorCode::MalformedQueryJson,
            Self::UnsupportedVersion { .. } => ErrorCode::UnsupportedQueryVersion,
            Self::UnknownCriterionType(_) => ErrorCode::UnknownCriterionType,
            Self::HashMismatch { .. } => ErrorCode::CriterionHashMismatch,
            Self::Invalid(inner) => inner.code(),
        }
    }
}
