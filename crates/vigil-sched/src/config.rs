use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

/// Scheduler settings shared by every region unless overridden per region.
///
/// Each region advances its virtual clock in fixed `tick_ms` steps; regions
/// may run at different tick sizes, they never share a clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedConfig {
    /// Virtual milliseconds added to the region clock per worker step.
    pub tick_ms: u64,
    /// Pace the worker against the wall clock. When false the worker steps
    /// as fast as it can, which is what tests and replays want.
    pub realtime: bool,
    /// Callbacks slower than this are logged.
    pub slow_callback_ms: u64,
    /// A worker step that overruns its tick by more than this is logged.
    pub out_of_sync_ms: u64,
    /// Minimum virtual time between two out-of-sync warnings.
    pub out_of_sync_log_interval_ms: u64,
    /// Largest accepted start delay or interval.
    pub max_delay_ms: u64,
    /// How long `stop` waits for a worker to hand its region back.
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            tick_ms: 25,
            realtime: true,
            slow_callback_ms: 250,
            out_of_sync_ms: 150,
            out_of_sync_log_interval_ms: 10_000,
            max_delay_ms: 24 * 60 * 60 * 1000,
            shutdown_timeout_ms: 3_000,
        }
    }
}

impl SchedConfig {
    /// Set the virtual tick size.
    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    /// Enable or disable wall-clock pacing.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Set the slow-callback warning threshold.
    pub fn with_slow_callback_ms(mut self, ms: u64) -> Self {
        self.slow_callback_ms = ms;
        self
    }

    /// Set the largest accepted delay.
    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.shutdown_timeout_ms = ms;
        self
    }

    /// Reject settings a region cannot run with.
    pub fn validate(&self) -> SchedResult<()> {
        if self.tick_ms == 0 {
            return Err(SchedError::Config("tick_ms must be at least 1".into()));
        }
        if self.max_delay_ms == 0 {
            return Err(SchedError::Config("max_delay_ms must be at least 1".into()));
        }
        Ok(())
    }
}
