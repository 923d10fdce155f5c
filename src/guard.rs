//! Idle iteration guard with exponential backoff.
//!
//! An idle iteration is one that arrives before the required interval
//! has elapsed and left no tracked artifact changed. The required
//! interval grows exponentially with consecutive idle iterations, with
//! random jitter so parallel sessions on one machine do not fall into
//! synchronized polling. Hitting the idle cap never allows a stop; it
//! forces a mode switch to exploration and resets the counter.

use rand::Rng;
use tracing::debug;

use crate::config::ControllerConfig;
use crate::session::SessionState;

/// Outcome of one idle assessment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdleOutcome {
    /// The iteration did real work or enough time passed.
    Productive,
    /// Unproductive, below the cap; carries the interval that was
    /// required of this iteration.
    Idle { required_secs: f64 },
    /// Idle cap reached; switch to exploration instead of stopping.
    ForceExploration,
}

/// Backoff parameters, lifted from config.
#[derive(Debug, Clone, Copy)]
pub struct IdleGuard {
    pub base_secs: f64,
    pub multiplier: f64,
    pub max_interval_secs: f64,
    pub cap: u32,
}

impl IdleGuard {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            base_secs: config.idle_base_secs,
            multiplier: config.idle_multiplier,
            max_interval_secs: config.idle_max_interval_secs,
            cap: config.idle_cap,
        }
    }

    /// Interval required before the next iteration counts as work:
    /// `min(base * multiplier^idle_count + jitter, max_interval)`.
    #[must_use]
    pub fn required_interval_secs(&self, idle_count: u32, jitter: f64) -> f64 {
        let backoff = self.base_secs * self.multiplier.powi(idle_count as i32) + jitter;
        backoff.min(self.max_interval_secs)
    }

    /// Fresh jitter in `[0, base)`.
    #[must_use]
    pub fn jitter(&self) -> f64 {
        if self.base_secs <= 0.0 {
            return 0.0;
        }
        rand::rng().random_range(0.0..self.base_secs)
    }

    /// Assesses the current iteration, updating the idle counter and
    /// stored artifact fingerprint on `state`.
    ///
    /// A changed fingerprint resets the counter immediately. A missing
    /// fingerprint carries no change information and leaves timing as
    /// the only signal.
    pub fn assess(
        &self,
        state: &mut SessionState,
        elapsed_secs: Option<f64>,
        fingerprint: Option<String>,
        jitter: f64,
    ) -> IdleOutcome {
        let changed = match (&state.last_artifact_fingerprint, &fingerprint) {
            (Some(prior), Some(current)) => prior != current,
            _ => false,
        };
        if fingerprint.is_some() {
            state.last_artifact_fingerprint = fingerprint;
        }

        if changed {
            state.idle_count = 0;
            return IdleOutcome::Productive;
        }

        let Some(elapsed) = elapsed_secs else {
            return IdleOutcome::Productive;
        };

        let required = self.required_interval_secs(state.idle_count, jitter);
        if elapsed >= required {
            state.idle_count = 0;
            return IdleOutcome::Productive;
        }

        state.idle_count += 1;
        debug!(
            "Idle iteration {} of {} (elapsed {:.0}s < required {:.0}s)",
            state.idle_count, self.cap, elapsed, required
        );
        if state.idle_count >= self.cap {
            state.idle_count = 0;
            return IdleOutcome::ForceExploration;
        }
        IdleOutcome::Idle {
            required_secs: required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> IdleGuard {
        IdleGuard {
            base_secs: 30.0,
            multiplier: 2.0,
            max_interval_secs: 600.0,
            cap: 3,
        }
    }

    fn state() -> SessionState {
        SessionState::new("sess", "cafe0123")
    }

    #[test]
    fn test_backoff_growth_and_ceiling() {
        let g = guard();
        assert_eq!(g.required_interval_secs(0, 0.0), 30.0);
        assert_eq!(g.required_interval_secs(1, 0.0), 60.0);
        assert_eq!(g.required_interval_secs(2, 0.0), 120.0);
        // 30 * 2^6 = 1920, clamped.
        assert_eq!(g.required_interval_secs(6, 0.0), 600.0);
    }

    #[test]
    fn test_jitter_added_before_clamp() {
        let g = guard();
        assert_eq!(g.required_interval_secs(0, 10.0), 40.0);
        assert_eq!(g.required_interval_secs(6, 10.0), 600.0);
    }

    #[test]
    fn test_jitter_bounds() {
        let g = guard();
        for _ in 0..50 {
            let j = g.jitter();
            assert!((0.0..30.0).contains(&j));
        }
    }

    #[test]
    fn test_first_invocation_is_productive() {
        let g = guard();
        let mut s = state();
        assert_eq!(g.assess(&mut s, None, None, 0.0), IdleOutcome::Productive);
        assert_eq!(s.idle_count, 0);
    }

    #[test]
    fn test_slow_iteration_resets_counter() {
        let g = guard();
        let mut s = state();
        s.idle_count = 2;
        assert_eq!(
            g.assess(&mut s, Some(200.0), None, 0.0),
            IdleOutcome::Productive
        );
        assert_eq!(s.idle_count, 0);
    }

    #[test]
    fn test_fast_iterations_accumulate_then_force_exploration() {
        let g = guard();
        let mut s = state();

        assert_eq!(
            g.assess(&mut s, Some(5.0), None, 0.0),
            IdleOutcome::Idle {
                required_secs: 30.0
            }
        );
        assert_eq!(
            g.assess(&mut s, Some(5.0), None, 0.0),
            IdleOutcome::Idle {
                required_secs: 60.0
            }
        );
        assert_eq!(
            g.assess(&mut s, Some(5.0), None, 0.0),
            IdleOutcome::ForceExploration
        );
        // Counter reset so the next fast iteration starts over.
        assert_eq!(s.idle_count, 0);
    }

    #[test]
    fn test_artifact_change_resets_immediately() {
        let g = guard();
        let mut s = state();
        s.idle_count = 2;
        s.last_artifact_fingerprint = Some("aaaa".into());

        let outcome = g.assess(&mut s, Some(1.0), Some("bbbb".into()), 0.0);
        assert_eq!(outcome, IdleOutcome::Productive);
        assert_eq!(s.idle_count, 0);
        assert_eq!(s.last_artifact_fingerprint.as_deref(), Some("bbbb"));
    }

    #[test]
    fn test_unchanged_fingerprint_still_counts_idle() {
        let g = guard();
        let mut s = state();
        s.last_artifact_fingerprint = Some("aaaa".into());
        let outcome = g.assess(&mut s, Some(1.0), Some("aaaa".into()), 0.0);
        assert!(matches!(outcome, IdleOutcome::Idle { .. }));
        assert_eq!(s.idle_count, 1);
    }

    #[test]
    fn test_first_fingerprint_observation_is_not_a_change() {
        let g = guard();
        let mut s = state();
        let outcome = g.assess(&mut s, Some(1.0), Some("aaaa".into()), 0.0);
        assert!(matches!(outcome, IdleOutcome::Idle { .. }));
        assert_eq!(s.last_artifact_fingerprint.as_deref(), Some("aaaa"));
    }
}
