//! Lazy read results over an in-memory log.
//!
//! Filtering happens while iterating. The only eager work is locating the
//! last match of each `only_last_event` criterion, a backwards scan that
//! stops at the first hit.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::ReadOptions;
use crate::event::SequencedEvent;
use crate::position::SequencePosition;
use crate::query::{Criterion, Query};

#[derive(Debug)]
enum Matcher {
    All,
    Criteria(Vec<Criterion>),
}

/// What a read keeps: every match of the plain criteria plus the pinned
/// last match of each `only_last_event` criterion.
#[derive(Debug)]
struct ReadPlan {
    matcher: Matcher,
    pinned: BTreeSet<SequencePosition>,
}

impl ReadPlan {
    fn new(query: &Query, events: &[SequencedEvent]) -> Self {
        let Some(criteria) = query.criteria() else {
            return Self {
                matcher: Matcher::All,
                pinned: BTreeSet::new(),
            };
        };

        let mut plain = Vec::new();
        let mut pinned = BTreeSet::new();
        for criterion in criteria {
            if criterion.is_only_last_event() {
                if let Some(last) = events.iter().rev().find(|e| criterion.matches(&e.event)) {
                    pinned.insert(last.position);
                }
            } else {
                plain.push(criterion.clone());
            }
        }

        Self {
            matcher: Matcher::Criteria(plain),
            pinned,
        }
    }

    fn keeps(&self, event: &SequencedEvent) -> bool {
        let matched = match &self.matcher {
            Matcher::All => true,
            Matcher::Criteria(criteria) => criteria.iter().any(|c| c.matches(&event.event)),
        };
        matched || self.pinned.contains(&event.position)
    }
}

/// Restartable cursor over the events selected by a read.
///
/// Implements [`Iterator`]; [`EventStream::rewound`] (or cloning before
/// iterating) gives a fresh cursor over the same result.
#[derive(Debug, Clone)]
pub struct EventStream<'a> {
    events: &'a [SequencedEvent],
    plan: Arc<ReadPlan>,
    backwards: bool,
    window: (usize, usize),
    limit: Option<usize>,
    front: usize,
    back: usize,
    remaining: Option<usize>,
}

impl<'a> EventStream<'a> {
    pub(crate) fn new(events: &'a [SequencedEvent], query: &Query, options: ReadOptions) -> Self {
        let len = events.len();
        let window = match (options.backwards, options.from) {
            (false, None) => (0, len),
            (false, Some(from)) => (from.index().min(len), len),
            (true, None) => (0, len),
            (true, Some(from)) => (0, from.index().saturating_add(1).min(len)),
        };
        Self {
            events,
            plan: Arc::new(ReadPlan::new(query, events)),
            backwards: options.backwards,
            window,
            limit: options.limit,
            front: window.0,
            back: window.1,
            remaining: options.limit,
        }
    }

    /// A fresh cursor at the start of this result.
    #[must_use]
    pub fn rewound(&self) -> Self {
        Self {
            front: self.window.0,
            back: self.window.1,
            remaining: self.limit,
            ..self.clone()
        }
    }

    /// First event of the result, without consuming this cursor.
    #[must_use]
    pub fn first(&self) -> Option<SequencedEvent> {
        self.rewound().next()
    }

    /// Whether the result is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }

    /// Positions of the whole result, in read order.
    #[must_use]
    pub fn positions(&self) -> Vec<SequencePosition> {
        self.rewound().map(|e| e.position).collect()
    }

    fn step(&mut self) -> Option<&'a SequencedEvent> {
        if self.front >= self.back {
            return None;
        }
        let events = self.events;
        if self.backwards {
            self.back -= 1;
            events.get(self.back)
        } else {
            self.front += 1;
            events.get(self.front - 1)
        }
    }
}

impl<'a> IntoIterator for &EventStream<'a> {
    type Item = SequencedEvent;
    type IntoIter = EventStream<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.rewound()
    }
}

impl Iterator for EventStream<'_> {
    type Item = SequencedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == Some(0) {
            return None;
        }
        while let Some(event) = self.step() {
            if self.plan.keeps(event) {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(event.clone());
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let upper = self.back.saturating_sub(self.front);
        (0, Some(self.remaining.map_or(upper, |r| r.min(upper))))
    }
}
