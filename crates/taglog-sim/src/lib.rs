//! taglog-sim library.
//!
//! Deterministic simulation of agents racing to claim resources through
//! conditional appends on one shared [`InMemoryEventStore`]. Every attempt is
//! traced so the [`oracle`] can check the outcome after the fact.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod agent;
pub mod campaign;
pub mod clock;
pub mod oracle;
pub mod rng;

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use taglog_core::{
    AppendCondition, ConditionalAppendFailed, EventStore, ExpectedHighestSequenceNumber,
    InMemoryEventStore, ReadOptions, SequencePosition, SequencedEvent, StoreConfig,
};
use tracing::debug;

use crate::agent::{AgentId, AgentState, Observation, SimulatedAgent, resource_query};
use crate::clock::{ClockConfig, SimulatedClock};
use crate::rng::DeterministicRng;

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub agent_count: usize,
    pub rounds: u64,
    /// Number of distinct resources agents contend on.
    pub resource_count: usize,
    /// Chance (percent) an agent with an observation reads again instead of deciding.
    pub observe_percent: u8,
    /// Chance (percent) a decision skips the guard, half unconditional, half `Any`.
    pub unguarded_percent: u8,
    /// Chance (percent) per round that the store clock freezes.
    pub freeze_percent: u8,
    /// Rounds a freeze lasts.
    pub freeze_duration: u8,
    pub clock: ClockConfig,
    pub store: StoreConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            agent_count: 4,
            rounds: 24,
            resource_count: 3,
            observe_percent: 50,
            unguarded_percent: 10,
            freeze_percent: 5,
            freeze_duration: 2,
            clock: ClockConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// What became of an append attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AppendOutcome {
    Committed {
        position: SequencePosition,
    },
    Rejected {
        code: String,
        /// Highest matching position reported by a failed condition.
        highest: Option<SequencePosition>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEventKind {
    Observe {
        agent: AgentId,
        resource: usize,
        highest: Option<SequencePosition>,
    },
    Append {
        agent: AgentId,
        resource: usize,
        /// `None` for an unconditional append.
        expected: Option<ExpectedHighestSequenceNumber>,
        /// Log length just before the attempt.
        log_len: u64,
        outcome: AppendOutcome,
    },
    ClockFreeze {
        until_round: u64,
    },
    ClockThaw,
}

/// One step of a simulation, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    /// Final contents of the log.
    pub log: Vec<SequencedEvent>,
    pub states: Vec<AgentState>,
    /// Positions returned by reading each resource's query after the last round.
    pub final_reads: BTreeMap<usize, Vec<SequencePosition>>,
    /// At least one guarded claim committed and at least one was rejected.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    #[must_use]
    pub fn commits(&self) -> usize {
        self.count_outcomes(|o| matches!(o, AppendOutcome::Committed { .. }))
    }

    #[must_use]
    pub fn rejections(&self) -> usize {
        self.count_outcomes(|o| matches!(o, AppendOutcome::Rejected { .. }))
    }

    fn count_outcomes(&self, pred: impl Fn(&AppendOutcome) -> bool) -> usize {
        self.trace
            .iter()
            .filter(|te| matches!(&te.kind, TraceEventKind::Append { outcome, .. } if pred(outcome)))
            .count()
    }
}

/// Drives agents against a shared store, round by round.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    store: InMemoryEventStore<SimulatedClock>,
    agents: Vec<SimulatedAgent>,
    trace: Vec<TraceEvent>,
    frozen_until: Option<u64>,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if the config has no agents, no rounds or no resources.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.agent_count == 0 {
            bail!("agent_count must be > 0");
        }
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if config.resource_count == 0 {
            bail!("resource_count must be > 0");
        }

        let store = InMemoryEventStore::with_config(config.store, SimulatedClock::new(config.clock));
        let agents = (0..config.agent_count).map(SimulatedAgent::new).collect();
        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            config,
            store,
            agents,
            trace: Vec::new(),
            frozen_until: None,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &InMemoryEventStore<SimulatedClock> {
        &self.store
    }

    /// Run every configured round and collect the result.
    ///
    /// # Errors
    ///
    /// Returns an error if building an event, tag or query fails.
    pub fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.tick_clock(round);

            let mut order: Vec<AgentId> = (0..self.agents.len()).collect();
            self.rng.shuffle(&mut order);
            for agent in order {
                self.step(round, agent)?;
            }
        }

        let mut final_reads = BTreeMap::new();
        for resource in 0..self.config.resource_count {
            let query = resource_query(resource)?;
            let positions = self
                .store
                .read(&query, ReadOptions::forwards())
                .map(|event| event.position)
                .collect();
            final_reads.insert(resource, positions);
        }

        let result = SimulationResult {
            trace: self.trace.clone(),
            log: self.store.as_slice().to_vec(),
            states: self.agents.iter().map(SimulatedAgent::snapshot).collect(),
            final_reads,
            interesting_state_reached: false,
        };
        let interesting_state_reached = result.commits() > 0 && result.rejections() > 0;
        debug!(
            seed = self.config.seed,
            events = result.log.len(),
            commits = result.commits(),
            rejections = result.rejections(),
            "simulation finished"
        );
        Ok(SimulationResult {
            interesting_state_reached,
            ..result
        })
    }

    fn tick_clock(&mut self, round: u64) {
        let clock = self.store.clock();
        clock.set_round(round);

        match self.frozen_until {
            Some(until) if round >= until => {
                clock.unfreeze();
                self.frozen_until = None;
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::ClockThaw,
                });
            }
            None if self.rng.hit_rate_percent(self.config.freeze_percent) => {
                clock.freeze();
                let until = round.saturating_add(u64::from(self.config.freeze_duration));
                self.frozen_until = Some(until);
                self.trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::ClockFreeze { until_round: until },
                });
            }
            _ => {}
        }
    }

    fn step(&mut self, round: u64, id: AgentId) -> Result<()> {
        let Self {
            config,
            rng,
            store,
            agents,
            trace,
            ..
        } = self;
        let Some(agent) = agents.get_mut(id) else {
            bail!("unknown agent {id}");
        };

        let observation = match agent.last_observation() {
            Some(observation) if !rng.hit_rate_percent(config.observe_percent) => observation,
            _ => {
                let resource = rng.next_index(config.resource_count);
                let Observation { highest, .. } = agent.observe(&*store, resource, round)?;
                trace.push(TraceEvent {
                    round,
                    kind: TraceEventKind::Observe {
                        agent: id,
                        resource,
                        highest,
                    },
                });
                return Ok(());
            }
        };

        let condition = if rng.hit_rate_percent(config.unguarded_percent) {
            if rng.hit_rate_percent(50) {
                Some(AppendCondition::new(
                    resource_query(observation.resource)?,
                    ExpectedHighestSequenceNumber::Any,
                ))
            } else {
                None
            }
        } else {
            Some(SimulatedAgent::condition_from(&observation)?)
        };
        let expected = condition.as_ref().map(|c| c.expected);

        let log_len = u64::try_from(store.len()).unwrap_or(u64::MAX);
        let claim = agent.claim(observation.resource, round)?;
        let outcome = match store.append(claim.into(), condition) {
            Ok(position) => {
                agent.record_commit();
                AppendOutcome::Committed { position }
            }
            Err(err) => {
                debug!(agent = id, round, code = %err.code(), "claim rejected");
                agent.record_rejection();
                AppendOutcome::Rejected {
                    code: err.code().to_string(),
                    highest: err.as_condition_failed().map(ConditionalAppendFailed::highest),
                }
            }
        };

        trace.push(TraceEvent {
            round,
            kind: TraceEventKind::Append {
                agent: id,
                resource: observation.resource,
                expected,
                log_len,
                outcome,
            },
        });
        Ok(())
    }
}
