//! Runtime accounting with gap exclusion.
//!
//! Two clocks matter: wall-clock time since the loop started and active
//! time the agent actually spent working. Hook invocations arrive at
//! irregular intervals; a long silence between two invocations means the
//! operator suspended the laptop or walked away, and that idle span must
//! not count toward the active-hours budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Accumulated runtime state, persisted inside the session record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeTracker {
    /// Seconds of active runtime, gaps excluded.
    pub active_seconds: f64,
    /// Timestamp of the previous hook invocation, if any.
    pub last_hook_at: Option<DateTime<Utc>>,
}

impl RuntimeTracker {
    /// Records a hook invocation at `now` and returns the updated
    /// accumulated active seconds.
    ///
    /// The first call establishes the reference timestamp and adds
    /// nothing. Later calls add the elapsed delta, unless it exceeds
    /// `gap_threshold_secs`, in which case the span is treated as idle
    /// and contributes zero. The reference timestamp always advances.
    pub fn update(&mut self, now: DateTime<Utc>, gap_threshold_secs: u64) -> f64 {
        if let Some(last) = self.last_hook_at {
            let delta = (now - last).num_milliseconds() as f64 / 1000.0;
            if delta > 0.0 {
                if delta <= gap_threshold_secs as f64 {
                    self.active_seconds += delta;
                } else {
                    debug!(
                        "Excluding {:.0}s gap from active runtime (threshold {}s)",
                        delta, gap_threshold_secs
                    );
                }
            }
        }
        self.last_hook_at = Some(now);
        self.active_seconds
    }

    /// Active runtime in hours.
    #[must_use]
    pub fn active_hours(&self) -> f64 {
        self.active_seconds / 3600.0
    }
}

/// Wall-clock hours elapsed since `started_at`.
#[must_use]
pub fn wall_clock_hours(started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let secs = (now - started_at).num_milliseconds() as f64 / 1000.0;
    (secs / 3600.0).max(0.0)
}
