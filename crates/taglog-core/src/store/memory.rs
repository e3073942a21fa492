//! Reference in-memory event log.
//!
//! Single-writer and not thread-safe: every operation runs to completion on
//! the caller's thread. It exists to pin down the observable contract of
//! [`EventStore`] and to back tests and simulations.

use tracing::{debug, warn};

use super::{EventStore, EventStream, ReadOptions};
use crate::append::AppendCondition;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::AppendError;
use crate::event::{Events, SequencedEvent};
use crate::position::{ExpectedHighestSequenceNumber, SequencePosition};
use crate::query::Query;

/// Append-only log kept in a `Vec`. Index `i` holds position `i + 1`.
#[derive(Debug)]
pub struct InMemoryEventStore<C: Clock = SystemClock> {
    events: Vec<SequencedEvent>,
    config: StoreConfig,
    clock: C,
}

impl InMemoryEventStore<SystemClock> {
    /// Empty store with default limits and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default(), SystemClock)
    }
}

impl Default for InMemoryEventStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryEventStore<C> {
    /// Empty store with default limits and the given clock.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self::with_config(StoreConfig::default(), clock)
    }

    #[must_use]
    pub fn with_config(config: StoreConfig, clock: C) -> Self {
        Self {
            events: Vec::new(),
            config,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of events recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every recorded event, in position order.
    #[must_use]
    pub fn as_slice(&self) -> &[SequencedEvent] {
        &self.events
    }

    fn check_limits(&self, events: &Events) -> Result<(), AppendError> {
        if events.len() > self.config.max_batch_size {
            return Err(AppendError::BatchTooLarge {
                len: events.len(),
                max: self.config.max_batch_size,
            });
        }
        if let Some(oversized) = events
            .iter()
            .find(|e| e.data.len() > self.config.max_payload_bytes)
        {
            return Err(AppendError::PayloadTooLarge {
                event_id: oversized.id.clone(),
                len: oversized.data.len(),
                max: self.config.max_payload_bytes,
            });
        }
        Ok(())
    }

    fn check_condition(&self, condition: &AppendCondition) -> Result<(), AppendError> {
        if condition.expected == ExpectedHighestSequenceNumber::Any {
            return Ok(());
        }
        let highest = self.highest_matching(&condition.query);
        condition.check(highest).map_err(|failure| {
            warn!(
                code = %failure.code(),
                expected = %condition.expected,
                highest = %failure.highest(),
                query = %condition.query,
                "conditional append rejected"
            );
            AppendError::from(failure)
        })
    }
}

impl<C: Clock> EventStore for InMemoryEventStore<C> {
    type Stream<'a>
        = EventStream<'a>
    where
        Self: 'a;

    fn read(&self, query: &Query, options: ReadOptions) -> Self::Stream<'_> {
        debug!(
            %query,
            backwards = options.backwards,
            from = ?options.from,
            limit = ?options.limit,
            "read"
        );
        EventStream::new(&self.events, query, options)
    }

    fn append(
        &mut self,
        events: Events,
        condition: Option<AppendCondition>,
    ) -> Result<SequencePosition, AppendError> {
        self.check_limits(&events)?;
        if let Some(condition) = &condition {
            self.check_condition(condition)?;
        }

        // Everything that can fail has been checked; commit the whole batch.
        let recorded_at = self.clock.now();
        let first = self
            .events
            .last()
            .map_or(SequencePosition::FIRST, |e| e.position.next());
        let mut position = first;
        let count = events.len();
        self.events.reserve(count);
        for event in events {
            self.events.push(SequencedEvent {
                position,
                recorded_at,
                event,
            });
            position = position.next();
        }

        let last = self.events.last().map_or(first, |e| e.position);
        debug!(
            count,
            first = %first,
            last = %last,
            conditional = condition.is_some(),
            "appended events"
        );
        Ok(last)
    }

    fn highest_matching(&self, query: &Query) -> Option<SequencePosition> {
        self.events
            .iter()
            .rev()
            .find(|e| query.matches_event(&e.event))
            .map(|e| e.position)
    }

    fn last_position(&self) -> Option<SequencePosition> {
        self.events.last().map(|e| e.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{ConditionalAppendFailed, ErrorCode};
    use crate::event::{Event, EventData, EventId, EventType, EventTypes};
    use crate::query::Criterion;
    use crate::tag::Tags;
    use chrono::{TimeZone, Utc};

    fn clock() -> FixedClock {
        FixedClock::new(Utc.timestamp_opt(1_700_000_000, 0).single().expect("ts"))
    }

    fn event(id: &str, event_type: &str, tags: &[&str]) -> Event {
        Event::new(
            EventId::new(id).expect("id"),
            EventType::new(event_type).expect("type"),
            EventData::new("{}"),
        )
        .with_tags(Tags::try_from_strings(tags).expect("tags"))
    }

    fn type_query(t: &str) -> Query {
        Query::for_event_types(EventTypes::try_from_strings([t]).expect("types")).expect("query")
    }

    #[test]
    fn first_event_gets_position_one() {
        let mut store = InMemoryEventStore::with_clock(clock());
        let pos = store.append(event("a", "T", &[]).into(), None).expect("append");
        assert_eq!(pos, SequencePosition::FIRST);
        assert_eq!(store.last_position(), Some(SequencePosition::FIRST));
    }

    #[test]
    fn batch_positions_are_contiguous() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "T", &[]).into(), None).expect("append");
        let batch = Events::try_from(vec![
            event("b", "T", &[]),
            event("c", "T", &[]),
            event("d", "T", &[]),
        ])
        .expect("batch");
        let last = store.append(batch, None).expect("append");
        assert_eq!(last.get(), 4);
        let positions: Vec<u64> = store.as_slice().iter().map(|e| e.position.get()).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn recorded_at_comes_from_clock() {
        let clock = clock();
        let start = clock.now();
        let mut store = InMemoryEventStore::with_clock(&clock);
        store.append(event("a", "T", &[]).into(), None).expect("append");
        clock.advance(chrono::Duration::seconds(30));
        store.append(event("b", "T", &[]).into(), None).expect("append");
        let stamps: Vec<_> = store.as_slice().iter().map(|e| e.recorded_at).collect();
        assert_eq!(stamps, vec![start, start + chrono::Duration::seconds(30)]);
    }

    #[test]
    fn expected_none_fails_when_match_exists() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "X", &[]).into(), None).expect("append");
        let err = store
            .append(
                event("b", "X", &[]).into(),
                Some(AppendCondition::fail_if_events_match(type_query("X"))),
            )
            .unwrap_err();
        assert_eq!(
            err,
            AppendError::ConditionFailed(ConditionalAppendFailed::MatchingEventsExist {
                highest: SequencePosition::FIRST
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn zero_observation_guards_like_nothing_seen() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "X", &[]).into(), None).expect("append");

        assert!(SequencePosition::try_new(0).is_none());
        let expected = ExpectedHighestSequenceNumber::from_position(SequencePosition::try_new(0));
        assert_eq!(expected, ExpectedHighestSequenceNumber::None);

        let err = store
            .append(
                event("b", "X", &[]).into(),
                Some(AppendCondition::new(type_query("X"), expected)),
            )
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MatchingEventsExist);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn stale_position_fails_and_commits_nothing() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "X", &[]).into(), None).expect("append");
        let seen = store.highest_matching(&type_query("X")).expect("seen");
        store.append(event("b", "X", &[]).into(), None).expect("append");

        let batch = Events::try_from(vec![event("c", "X", &[]), event("d", "Y", &[])]).expect("batch");
        let err = store
            .append(batch, Some(AppendCondition::after(type_query("X"), seen)))
            .unwrap_err();
        assert!(matches!(
            err.as_condition_failed(),
            Some(ConditionalAppendFailed::MatchingEventsExistAfter { expected, highest })
                if expected.get() == 1 && highest.get() == 2
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unrelated_appends_do_not_invalidate_condition() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "X", &[]).into(), None).expect("append");
        let seen = store.highest_matching(&type_query("X")).expect("seen");
        store.append(event("b", "Y", &[]).into(), None).expect("append");

        let pos = store
            .append(
                event("c", "X", &[]).into(),
                Some(AppendCondition::after(type_query("X"), seen)),
            )
            .expect("append");
        assert_eq!(pos.get(), 3);
    }

    #[test]
    fn expected_any_skips_the_check() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "X", &[]).into(), None).expect("append");
        let cond = AppendCondition::new(type_query("X"), ExpectedHighestSequenceNumber::Any);
        assert!(store.append(event("b", "X", &[]).into(), Some(cond)).is_ok());
    }

    #[test]
    fn batch_limit_enforced() {
        let config = StoreConfig {
            max_batch_size: 1,
            ..StoreConfig::default()
        };
        let mut store = InMemoryEventStore::with_config(config, clock());
        let batch = Events::try_from(vec![event("a", "T", &[]), event("b", "T", &[])]).expect("batch");
        assert_eq!(
            store.append(batch, None),
            Err(AppendError::BatchTooLarge { len: 2, max: 1 })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn payload_limit_enforced() {
        let config = StoreConfig {
            max_payload_bytes: 4,
            ..StoreConfig::default()
        };
        let mut store = InMemoryEventStore::with_config(config, clock());
        let big = Event::new(
            EventId::new("big").expect("id"),
            EventType::new("T").expect("type"),
            EventData::new("12345"),
        );
        let err = store.append(big.into(), None).unwrap_err();
        assert!(matches!(err, AppendError::PayloadTooLarge { len: 5, max: 4, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn highest_matching_honours_tags() {
        let mut store = InMemoryEventStore::with_clock(clock());
        store.append(event("a", "T", &["c:1"]).into(), None).expect("append");
        store.append(event("b", "T", &["c:2"]).into(), None).expect("append");
        store.append(event("c", "T", &["c:1", "s:9"]).into(), None).expect("append");

        let q = Query::from(Criterion::tagged(Tags::try_from_strings(["c:2"]).expect("tags")).expect("c"));
        assert_eq!(store.highest_matching(&q).map(SequencePosition::get), Some(2));
        assert_eq!(store.highest_matching(&Query::All).map(SequencePosition::get), Some(3));
    }

    #[test]
    fn backwards_read_agrees_with_highest_matching() {
        let mut store = InMemoryEventStore::with_clock(clock());
        for (i, t) in ["X", "Y", "X", "Z"].iter().enumerate() {
            store.append(event(&format!("e{i}"), t, &[]).into(), None).expect("append");
        }
        for t in ["X", "Y", "Z", "W"] {
            let q = type_query(t);
            let via_read = store
                .read(&q, ReadOptions::backwards().with_limit(1))
                .next()
                .map(|e| e.position);
            assert_eq!(via_read, store.highest_matching(&q), "type {t}");
        }
    }
}
