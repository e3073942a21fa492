use std::cell::Cell;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taglog_core::Clock;

/// Timing of the simulated wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Base timestamp in milliseconds.
    #[serde(default = "default_base_millis")]
    pub base_millis: i64,
    /// Logical tick size in milliseconds per simulation round.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: i64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            base_millis: default_base_millis(),
            tick_millis: default_tick_millis(),
        }
    }
}

const fn default_base_millis() -> i64 {
    1_700_000_000_000
}

const fn default_tick_millis() -> i64 {
    100
}

/// Round-driven wall clock with freeze controls.
///
/// The simulator sets the round; the event store reads it through
/// [`Clock::now`] when stamping `recorded_at`. Interior mutability lets the
/// store own the clock while the simulator keeps driving it.
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    config: ClockConfig,
    round: Cell<u64>,
    frozen_at: Cell<Option<i64>>,
}

impl SimulatedClock {
    #[must_use]
    pub const fn new(config: ClockConfig) -> Self {
        Self {
            config,
            round: Cell::new(0),
            frozen_at: Cell::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> ClockConfig {
        self.config
    }

    /// Move the clock to `round`.
    pub fn set_round(&self, round: u64) {
        self.round.set(round);
    }

    #[must_use]
    pub fn round(&self) -> u64 {
        self.round.get()
    }

    /// Wall time in milliseconds for the current round.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        if let Some(frozen) = self.frozen_at.get() {
            return frozen;
        }
        let round = i64::try_from(self.round.get()).unwrap_or(i64::MAX);
        self.config
            .base_millis
            .saturating_add(self.config.tick_millis.saturating_mul(round))
    }

    /// Freeze this clock at the current time.
    pub fn freeze(&self) {
        self.frozen_at.set(Some(self.now_millis()));
    }

    pub fn unfreeze(&self) {
        self.frozen_at.set(None);
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen_at.get().is_some()
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_millis()).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
