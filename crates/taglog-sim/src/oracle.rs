use std::collections::BTreeMap;

use taglog_core::{ErrorCode, ExpectedHighestSequenceNumber, SequencePosition, SequencedEvent};

use crate::agent::{AgentId, RESOURCE_TAG_KEY};
use crate::{AppendOutcome, SimulationResult, TraceEvent, TraceEventKind};

// ── Core result types ─────────────────────────────────────────────────────────

/// Oracle result for an invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// Diagnostic information for a single failed invariant check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The event at `index` does not carry position `index + 1`.
    PositionGap { index: usize, expected: u64, found: u64 },

    /// Two guarded claims on one resource committed against the same expectation.
    DoubleClaim {
        resource: usize,
        expected: ExpectedHighestSequenceNumber,
        positions: Vec<u64>,
    },

    /// A guarded claim committed although its expectation was already stale.
    StaleAccepted {
        round: u64,
        agent: AgentId,
        resource: usize,
        expected: ExpectedHighestSequenceNumber,
        actual: Option<u64>,
    },

    /// A guarded claim was rejected although its expectation still held.
    FreshRejected {
        round: u64,
        agent: AgentId,
        resource: usize,
        expected: ExpectedHighestSequenceNumber,
        actual: Option<u64>,
    },

    /// A rejection reported a highest position other than the real one.
    MisreportedHighest {
        round: u64,
        agent: AgentId,
        reported: Option<u64>,
        actual: Option<u64>,
    },

    /// An append without a check was rejected anyway.
    UnexpectedRejection { round: u64, agent: AgentId, code: String },

    /// Reading a resource's query disagrees with the claims committed for it.
    ReadMismatch {
        resource: usize,
        committed: Vec<u64>,
        read: Vec<u64>,
    },

    /// `recorded_at` went backwards between consecutive events.
    ClockRegression {
        position: u64,
        previous_millis: i64,
        current_millis: i64,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Oracle for verifying conditional-append invariants after simulation.
///
/// # Invariants checked
///
/// 1. **Gapless positions** (`check_gapless`): the log holds exactly `1..=len`.
/// 2. **Exclusivity** (`check_exclusivity`): per resource, at most one guarded
///    claim commits per expectation.
/// 3. **Staleness accuracy** (`check_staleness`): an attempt is rejected iff
///    its expectation was stale at attempt time, recomputed from the final log.
/// 4. **Read/write agreement** (`check_read_agreement`): reading each
///    resource returns exactly the claims committed for it.
/// 5. **Monotonic timestamps** (`check_timestamps`): `recorded_at` never
///    decreases along the log.
pub struct ClaimOracle;

impl ClaimOracle {
    // ── Invariant 1: Gapless positions ──────────────────────────────────────

    #[must_use]
    pub fn check_gapless(log: &[SequencedEvent]) -> OracleResult {
        let violations = log
            .iter()
            .enumerate()
            .filter_map(|(index, event)| {
                let expected = u64::try_from(index).unwrap_or(u64::MAX).saturating_add(1);
                (event.position.get() != expected).then_some(InvariantViolation::PositionGap {
                    index,
                    expected,
                    found: event.position.get(),
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    // ── Invariant 2: Exclusivity ────────────────────────────────────────────

    #[must_use]
    pub fn check_exclusivity(trace: &[TraceEvent]) -> OracleResult {
        // Keyed by resource and expected highest position (`None` = nothing may match).
        let mut commits: BTreeMap<(usize, Option<u64>), Vec<u64>> = BTreeMap::new();

        for attempt in appends(trace) {
            let expected = match attempt.expected {
                Some(ExpectedHighestSequenceNumber::None) => None,
                Some(ExpectedHighestSequenceNumber::Position(p)) => Some(p.get()),
                Some(ExpectedHighestSequenceNumber::Any) | None => continue,
            };
            if let AppendOutcome::Committed { position } = attempt.outcome {
                commits
                    .entry((attempt.resource, expected))
                    .or_default()
                    .push(position.get());
            }
        }

        let violations = commits
            .into_iter()
            .filter(|(_, positions)| positions.len() > 1)
            .map(|((resource, expected), positions)| InvariantViolation::DoubleClaim {
                resource,
                expected: ExpectedHighestSequenceNumber::from_position(
                    expected.and_then(SequencePosition::try_new),
                ),
                positions,
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    // ── Invariant 3: Staleness accuracy ─────────────────────────────────────

    #[must_use]
    pub fn check_staleness(trace: &[TraceEvent], log: &[SequencedEvent]) -> OracleResult {
        let mut violations = Vec::new();

        for attempt in appends(trace) {
            let actual = highest_for_resource(log, attempt.resource, attempt.log_len);
            let rejected = match attempt.outcome {
                AppendOutcome::Committed { .. } => None,
                AppendOutcome::Rejected { code, highest } => Some((code, *highest)),
            };

            let guard = attempt.expected.filter(|e| !e.is_any());
            let unexpected = rejected
                .filter(|(code, _)| guard.is_none() || !is_condition_code(code));
            if let Some((code, _)) = unexpected {
                violations.push(InvariantViolation::UnexpectedRejection {
                    round: attempt.round,
                    agent: attempt.agent,
                    code: code.clone(),
                });
                continue;
            }
            let Some(expected) = guard else {
                continue;
            };

            let stale = match expected {
                ExpectedHighestSequenceNumber::None => actual.is_some(),
                ExpectedHighestSequenceNumber::Position(p) => actual.is_some_and(|a| a > p.get()),
                ExpectedHighestSequenceNumber::Any => false,
            };

            match (stale, rejected) {
                (true, None) => violations.push(InvariantViolation::StaleAccepted {
                    round: attempt.round,
                    agent: attempt.agent,
                    resource: attempt.resource,
                    expected,
                    actual,
                }),
                (false, Some(_)) => violations.push(InvariantViolation::FreshRejected {
                    round: attempt.round,
                    agent: attempt.agent,
                    resource: attempt.resource,
                    expected,
                    actual,
                }),
                (true, Some((_, reported))) => {
                    let reported = reported.map(SequencePosition::get);
                    if reported != actual {
                        violations.push(InvariantViolation::MisreportedHighest {
                            round: attempt.round,
                            agent: attempt.agent,
                            reported,
                            actual,
                        });
                    }
                }
                (false, None) => {}
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 4: Read/write agreement ───────────────────────────────────

    #[must_use]
    pub fn check_read_agreement(
        trace: &[TraceEvent],
        final_reads: &BTreeMap<usize, Vec<SequencePosition>>,
    ) -> OracleResult {
        let mut committed: BTreeMap<usize, Vec<u64>> =
            final_reads.keys().map(|&resource| (resource, Vec::new())).collect();
        for attempt in appends(trace) {
            if let AppendOutcome::Committed { position } = attempt.outcome {
                committed.entry(attempt.resource).or_default().push(position.get());
            }
        }

        let violations = committed
            .into_iter()
            .filter_map(|(resource, committed)| {
                let read: Vec<u64> = final_reads
                    .get(&resource)
                    .map(|positions| positions.iter().map(|p| p.get()).collect())
                    .unwrap_or_default();
                (read != committed).then_some(InvariantViolation::ReadMismatch {
                    resource,
                    committed,
                    read,
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    // ── Invariant 5: Monotonic timestamps ───────────────────────────────────

    #[must_use]
    pub fn check_timestamps(log: &[SequencedEvent]) -> OracleResult {
        let violations = log
            .windows(2)
            .filter_map(|pair| {
                let (previous, current) = (&pair[0], &pair[1]);
                (current.recorded_at < previous.recorded_at).then(|| {
                    InvariantViolation::ClockRegression {
                        position: current.position.get(),
                        previous_millis: previous.recorded_at.timestamp_millis(),
                        current_millis: current.recorded_at.timestamp_millis(),
                    }
                })
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    // ── Combined ────────────────────────────────────────────────────────────

    /// Run every invariant check against a simulation result.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        Self::check_gapless(&result.log)
            .merge(Self::check_exclusivity(&result.trace))
            .merge(Self::check_staleness(&result.trace, &result.log))
            .merge(Self::check_read_agreement(&result.trace, &result.final_reads))
            .merge(Self::check_timestamps(&result.log))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Attempt<'a> {
    round: u64,
    agent: AgentId,
    resource: usize,
    expected: Option<ExpectedHighestSequenceNumber>,
    log_len: u64,
    outcome: &'a AppendOutcome,
}

fn appends(trace: &[TraceEvent]) -> impl Iterator<Item = Attempt<'_>> {
    trace.iter().filter_map(|te| match &te.kind {
        TraceEventKind::Append {
            agent,
            resource,
            expected,
            log_len,
            outcome,
        } => Some(Attempt {
            round: te.round,
            agent: *agent,
            resource: *resource,
            expected: *expected,
            log_len: *log_len,
            outcome,
        }),
        _ => None,
    })
}

/// Highest position among the first `log_len` events tagged with `resource`.
fn highest_for_resource(log: &[SequencedEvent], resource: usize, log_len: u64) -> Option<u64> {
    let value = resource.to_string();
    log.iter()
        .take_while(|e| e.position.get() <= log_len)
        .filter(|e| {
            e.event
                .tags
                .iter()
                .any(|t| t.key() == RESOURCE_TAG_KEY && t.value() == value)
        })
        .map(|e| e.position.get())
        .last()
}

/// Whether `code` is one a failed condition produces.
fn is_condition_code(code: &str) -> bool {
    code == ErrorCode::MatchingEventsExist.code() || code == ErrorCode::MatchingEventsExistAfter.code()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimulationConfig, Simulator};
    use chrono::{TimeZone, Utc};
    use taglog_core::{Event, EventData, EventId, EventType, Tags};

    // ── Helper constructors ───────────────────────────────────────────────────

    fn claim(position: u64, resource: usize, secs: i64) -> SequencedEvent {
        SequencedEvent {
            position: SequencePosition::try_new(position).expect("position"),
            recorded_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("ts"),
            event: Event::new(
                EventId::new(format!("e{position}")).expect("id"),
                EventType::new("ResourceClaimed").expect("type"),
                EventData::default(),
            )
            .with_tags(Tags::try_from_strings([format!("resource:{resource}")]).expect("tags")),
        }
    }

    fn attempt(
        round: u64,
        resource: usize,
        expected: Option<ExpectedHighestSequenceNumber>,
        log_len: u64,
        outcome: AppendOutcome,
    ) -> TraceEvent {
        TraceEvent {
            round,
            kind: TraceEventKind::Append {
                agent: 0,
                resource,
                expected,
                log_len,
                outcome,
            },
        }
    }

    fn committed(position: u64) -> AppendOutcome {
        AppendOutcome::Committed {
            position: SequencePosition::try_new(position).expect("position"),
        }
    }

    fn rejected(highest: Option<u64>) -> AppendOutcome {
        AppendOutcome::Rejected {
            code: "E2001".into(),
            highest: highest.and_then(SequencePosition::try_new),
        }
    }

    const NONE: Option<ExpectedHighestSequenceNumber> = Some(ExpectedHighestSequenceNumber::None);

    // ── Gapless ──────────────────────────────────────────────────────────────

    #[test]
    fn gapless_log_passes() {
        let log = vec![claim(1, 0, 0), claim(2, 1, 0), claim(3, 0, 0)];
        assert!(ClaimOracle::check_gapless(&log).passed);
        assert!(ClaimOracle::check_gapless(&[]).passed);
    }

    #[test]
    fn gap_is_reported() {
        let log = vec![claim(1, 0, 0), claim(3, 0, 0)];
        let result = ClaimOracle::check_gapless(&log);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::PositionGap {
                index: 1,
                expected: 2,
                found: 3
            }]
        );
    }

    // ── Exclusivity ──────────────────────────────────────────────────────────

    #[test]
    fn two_commits_on_same_expectation_violate_exclusivity() {
        let trace = vec![
            attempt(0, 0, NONE, 0, committed(1)),
            attempt(0, 0, NONE, 1, committed(2)),
        ];
        let result = ClaimOracle::check_exclusivity(&trace);
        assert!(!result.passed);
        assert!(matches!(
            &result.violations[0],
            InvariantViolation::DoubleClaim { resource: 0, positions, .. } if positions == &vec![1, 2]
        ));
    }

    #[test]
    fn same_expectation_on_different_resources_is_fine() {
        let trace = vec![
            attempt(0, 0, NONE, 0, committed(1)),
            attempt(0, 1, NONE, 1, committed(2)),
        ];
        assert!(ClaimOracle::check_exclusivity(&trace).passed);
    }

    #[test]
    fn any_guard_is_exempt_from_exclusivity() {
        let any = Some(ExpectedHighestSequenceNumber::Any);
        let trace = vec![
            attempt(0, 0, any, 0, committed(1)),
            attempt(0, 0, any, 1, committed(2)),
        ];
        assert!(ClaimOracle::check_exclusivity(&trace).passed);
    }

    // ── Staleness ────────────────────────────────────────────────────────────

    #[test]
    fn correct_rejection_passes() {
        let log = vec![claim(1, 0, 0)];
        let trace = vec![
            attempt(0, 0, NONE, 0, committed(1)),
            attempt(1, 0, NONE, 1, rejected(Some(1))),
        ];
        assert!(ClaimOracle::check_staleness(&trace, &log).passed);
    }

    #[test]
    fn stale_commit_is_flagged() {
        let log = vec![claim(1, 0, 0), claim(2, 0, 0)];
        let trace = vec![
            attempt(0, 0, NONE, 0, committed(1)),
            attempt(1, 0, NONE, 1, committed(2)),
        ];
        let result = ClaimOracle::check_staleness(&trace, &log);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::StaleAccepted { actual: Some(1), .. }]
        ));
    }

    #[test]
    fn fresh_rejection_is_flagged() {
        let log = vec![claim(1, 1, 0)];
        let trace = vec![attempt(0, 0, NONE, 1, rejected(None))];
        let result = ClaimOracle::check_staleness(&trace, &log);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::FreshRejected { resource: 0, actual: None, .. }]
        ));
    }

    #[test]
    fn misreported_highest_is_flagged() {
        let log = vec![claim(1, 0, 0), claim(2, 0, 0)];
        let trace = vec![attempt(
            0,
            0,
            Some(ExpectedHighestSequenceNumber::Position(SequencePosition::try_new(1).expect("position"))),
            2,
            rejected(Some(1)),
        )];
        let result = ClaimOracle::check_staleness(&trace, &log);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::MisreportedHighest { reported: Some(1), actual: Some(2), .. }]
        ));
    }

    #[test]
    fn unguarded_rejection_is_flagged() {
        let trace = vec![attempt(0, 0, None, 0, rejected(None))];
        let result = ClaimOracle::check_staleness(&trace, &[]);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::UnexpectedRejection { .. }]
        ));
    }

    // ── Read agreement ───────────────────────────────────────────────────────

    #[test]
    fn read_mismatch_is_flagged() {
        let trace = vec![attempt(0, 0, NONE, 0, committed(1))];
        let mut reads = BTreeMap::new();
        reads.insert(0, Vec::new());
        let result = ClaimOracle::check_read_agreement(&trace, &reads);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::ReadMismatch {
                resource: 0,
                committed: vec![1],
                read: vec![]
            }]
        );
    }

    #[test]
    fn matching_reads_pass() {
        let trace = vec![attempt(0, 2, NONE, 0, committed(1))];
        let mut reads = BTreeMap::new();
        reads.insert(2, vec![SequencePosition::try_new(1).expect("position")]);
        reads.insert(5, Vec::new());
        assert!(ClaimOracle::check_read_agreement(&trace, &reads).passed);
    }

    // ── Timestamps ───────────────────────────────────────────────────────────

    #[test]
    fn clock_regression_is_flagged() {
        let log = vec![claim(1, 0, 10), claim(2, 0, 10), claim(3, 0, 5)];
        let result = ClaimOracle::check_timestamps(&log);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::ClockRegression { position: 3, .. }]
        ));
    }

    // ── Combined ─────────────────────────────────────────────────────────────

    #[test]
    fn real_simulation_passes_every_invariant() {
        for seed in 0..10 {
            let config = SimulationConfig {
                seed,
                agent_count: 5,
                rounds: 20,
                resource_count: 2,
                ..SimulationConfig::default()
            };
            let result = Simulator::new(config).expect("sim").run().expect("run");
            let oracle = ClaimOracle::check_all(&result);
            assert!(oracle.passed, "seed {seed}: {:?}", oracle.violations);
        }
    }

    #[test]
    fn condition_codes_are_recognised() {
        assert!(is_condition_code("E2001"));
        assert!(is_condition_code("E2002"));
        assert!(!is_condition_code("E2003"));
    }
}
