//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with the same parameters, collecting pass/fail results
//! and identifying the first failing seed for replay.

use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::oracle::{ClaimOracle, InvariantViolation, OracleResult};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration controlling how many seeds to run and
/// what simulation parameters to use for each seed.
///
/// Every field has a default, so a TOML file only lists what it overrides:
///
/// ```toml
/// seed_range = { start = 0, end = 500 }
/// agent_count = 8
/// resource_count = 2
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    pub agent_count: usize,
    pub rounds: u64,
    pub resource_count: usize,
    /// Chance (percent) an agent re-reads instead of deciding.
    pub observe_percent: u8,
    /// Chance (percent) a decision skips its guard.
    pub unguarded_percent: u8,
    /// Clock freeze probability (percent, 0–100).
    pub fault_freeze_percent: u8,
    /// Clock freeze duration in rounds.
    pub fault_freeze_duration: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            agent_count: sim.agent_count,
            rounds: sim.rounds,
            resource_count: sim.resource_count,
            observe_percent: sim.observe_percent,
            unguarded_percent: sim.unguarded_percent,
            fault_freeze_percent: sim.freeze_percent,
            fault_freeze_duration: sim.freeze_duration,
        }
    }
}

impl CampaignConfig {
    /// Build a [`SimulationConfig`] for a specific seed.
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            agent_count: self.agent_count,
            rounds: self.rounds,
            resource_count: self.resource_count,
            observe_percent: self.observe_percent,
            unguarded_percent: self.unguarded_percent,
            freeze_percent: self.fault_freeze_percent,
            freeze_duration: self.fault_freeze_duration,
            ..SimulationConfig::default()
        }
    }

    /// Validate configuration before running.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.agent_count == 0 {
            bail!("agent_count must be > 0");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.resource_count == 0 {
            bail!("resource_count must be > 0");
        }
        for (name, percent) in [
            ("observe_percent", self.observe_percent),
            ("unguarded_percent", self.unguarded_percent),
            ("fault_freeze_percent", self.fault_freeze_percent),
        ] {
            if percent > 100 {
                bail!("{name} must be <= 100, got {percent}");
            }
        }
        Ok(())
    }
}

/// Load a campaign config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_campaign_config(path: &Path) -> Result<CampaignConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Failure details for a single seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    /// Invariant violations found.
    pub violations: Vec<String>,
}

/// Aggregate report produced by a campaign run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds where guarded claims both committed and got rejected.
    pub interesting_states_reached: usize,
    pub commits: usize,
    pub rejections: usize,
}

impl CampaignReport {
    /// True if every seed passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Detailed trace produced by replaying a single seed.
#[derive(Debug, Clone)]
pub struct DetailedTrace {
    pub result: SimulationResult,
    pub oracle: OracleResult,
}

/// Run a full campaign across all seeds in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation encounters
/// an internal error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
        commits: 0,
        rejections: 0,
    };

    for seed in config.seed_range.clone() {
        let DetailedTrace { result, oracle } = simulate(seed, config)?;
        report.seeds_run += 1;
        report.commits += result.commits();
        report.rejections += result.rejections();
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if oracle.passed {
            report.seeds_passed += 1;
        } else {
            warn!(seed, violations = oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        commits = report.commits,
        rejections = report.rejections,
        "campaign finished"
    );
    Ok(report)
}

/// Run a single seed and return Ok(()) on pass, Err(violations) on failure.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the simulation itself encounters an internal
/// error (invalid config, etc). The inner `Result` distinguishes pass from
/// invariant violations.
pub fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let DetailedTrace { oracle, .. } = simulate(seed, config)?;
    if oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(oracle.violations))
    }
}

/// Replay a single seed with full trace details for debugging.
///
/// # Errors
///
/// Returns an error when config validation or simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    config.validate()?;
    simulate(seed, config)
}

fn simulate(seed: u64, config: &CampaignConfig) -> Result<DetailedTrace> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    let result = simulator.run()?;
    let oracle = ClaimOracle::check_all(&result);
    Ok(DetailedTrace { result, oracle })
}

/// Format an invariant violation into a human-readable string.
fn format_violation(v: &InvariantViolation) -> String {
    match v {
        InvariantViolation::PositionGap {
            index,
            expected,
            found,
        } => format!("PositionGap: event #{index} has position {found}, expected {expected}"),
        InvariantViolation::DoubleClaim {
            resource,
            expected,
            positions,
        } => format!(
            "DoubleClaim: resource {resource} claimed at {positions:?} against expectation {expected}"
        ),
        InvariantViolation::StaleAccepted {
            round,
            agent,
            resource,
            expected,
            actual,
        } => format!(
            "StaleAccepted: agent {agent} round {round} claimed resource {resource} \
             expecting {expected} but highest was {actual:?}"
        ),
        InvariantViolation::FreshRejected {
            round,
            agent,
            resource,
            expected,
            actual,
        } => format!(
            "FreshRejected: agent {agent} round {round} was refused resource {resource} \
             expecting {expected} with highest {actual:?}"
        ),
        InvariantViolation::MisreportedHighest {
            round,
            agent,
            reported,
            actual,
        } => format!(
            "MisreportedHighest: agent {agent} round {round} was told {reported:?}, actual {actual:?}"
        ),
        InvariantViolation::UnexpectedRejection { round, agent, code } => {
            format!("UnexpectedRejection: agent {agent} round {round} rejected with {code}")
        }
        InvariantViolation::ReadMismatch {
            resource,
            committed,
            read,
        } => format!("ReadMismatch: resource {resource} committed={committed:?} read={read:?}"),
        InvariantViolation::ClockRegression {
            position,
            previous_millis,
            current_millis,
        } => format!(
            "ClockRegression: position {position} recorded at {current_millis}ms after {previous_millis}ms"
        ),
    }
}
