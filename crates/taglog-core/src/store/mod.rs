//! The event store contract: filtered reads and conditional appends.
//!
//! [`memory::InMemoryEventStore`] is the reference implementation. It is
//! single-writer and not thread-safe. A durable backend must give the same
//! observable behaviour and additionally run "compute the highest matching
//! position, check the condition, commit" as one serializable unit, with a
//! gapless position counter shared by all writers.

pub mod memory;
pub mod stream;

pub use memory::InMemoryEventStore;
pub use stream::EventStream;

use serde::{Deserialize, Serialize};

use crate::append::AppendCondition;
use crate::error::AppendError;
use crate::event::{Events, SequencedEvent};
use crate::position::SequencePosition;
use crate::query::Query;

/// Direction, lower/upper bound and size cap of a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Inclusive starting position: the lower bound when reading forwards,
    /// the upper bound when reading backwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<SequencePosition>,
    /// Maximum number of events returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub backwards: bool,
}

impl ReadOptions {
    /// Ascending from the first event, no cap.
    #[must_use]
    pub const fn forwards() -> Self {
        Self {
            from: None,
            limit: None,
            backwards: false,
        }
    }

    /// Descending from the last event, no cap.
    #[must_use]
    pub const fn backwards() -> Self {
        Self {
            from: None,
            limit: None,
            backwards: true,
        }
    }

    #[must_use]
    pub const fn from_position(mut self, from: SequencePosition) -> Self {
        self.from = Some(from);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read/append contract shared by every event log backend.
pub trait EventStore {
    /// Lazy, finite sequence of matching events. Cloning a fresh stream
    /// yields an independent cursor over the same result.
    type Stream<'a>: Iterator<Item = SequencedEvent> + Clone
    where
        Self: 'a;

    /// Events matching `query`, honouring `only_last_event` criteria, in the
    /// direction and window given by `options`.
    fn read(&self, query: &Query, options: ReadOptions) -> Self::Stream<'_>;

    /// Append `events` atomically, guarded by `condition` when given.
    ///
    /// Returns the position assigned to the last event of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError`] when the condition fails or a configured limit
    /// is exceeded; nothing is committed in that case.
    fn append(
        &mut self,
        events: Events,
        condition: Option<AppendCondition>,
    ) -> Result<SequencePosition, AppendError>;

    /// Highest position currently matching `query`, if any.
    fn highest_matching(&self, query: &Query) -> Option<SequencePosition> {
        self.read(query, ReadOptions::backwards().with_limit(1))
            .next()
            .map(|event| event.position)
    }

    /// Position of the most recently appended event.
    fn last_position(&self) -> Option<SequencePosition> {
        self.highest_matching(&Query::All)
    }
}
