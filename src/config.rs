//! Configuration for the continuation controller.
//!
//! Every threshold has a built-in default and a validated range.
//! Out-of-range values are rejected at load time in favor of the default,
//! with a warning, so a bad config file can never disable the safety
//! limits. Precedence: env override > project config file > global config
//! file > built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store;

/// Global config file name under the state directory.
pub const GLOBAL_CONFIG_FILE: &str = "config.json";

/// Per-project config path relative to the project root.
pub const PROJECT_CONFIG_FILE: &str = ".vigil/config.json";

/// Confidence weights for the five completion signals.
///
/// The detector reports the single highest-confidence signal that fired,
/// never an average, so each weight is the confidence of its signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionWeights {
    /// Explicit completion marker checkbox (strongest evidence).
    #[serde(default = "default_marker_weight")]
    pub marker: f64,
    /// Structured `Status:` metadata field.
    #[serde(default = "default_metadata_weight")]
    pub metadata: f64,
    /// Cross-referenced companion document metadata.
    #[serde(default = "default_companion_weight")]
    pub companion: f64,
    /// 100% of checklist items checked.
    #[serde(default = "default_checklist_weight")]
    pub checklist: f64,
    /// Word-boundary phrase match (weakest; prone to narration noise).
    #[serde(default = "default_phrase_weight")]
    pub phrase: f64,
}

fn default_marker_weight() -> f64 {
    1.0
}
fn default_metadata_weight() -> f64 {
    0.9
}
fn default_companion_weight() -> f64 {
    0.85
}
fn default_checklist_weight() -> f64 {
    0.8
}
fn default_phrase_weight() -> f64 {
    0.6
}

impl Default for CompletionWeights {
    fn default() -> Self {
        Self {
            marker: default_marker_weight(),
            metadata: default_metadata_weight(),
            companion: default_companion_weight(),
            checklist: default_checklist_weight(),
            phrase: default_phrase_weight(),
        }
    }
}

/// Typed controller configuration with validated bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Minimum accumulated runtime (hours) before completion may end the
    /// build phase.
    pub min_hours: f64,
    /// Hard cap on accumulated runtime (hours).
    pub max_hours: f64,
    /// Minimum iterations before completion may end the build phase.
    pub min_iterations: u32,
    /// Hard cap on iterations.
    pub max_iterations: u32,
    /// Similarity ratio at or above which two outputs count as repeats.
    pub similarity_threshold: f64,
    /// Sliding window size W for repetition detection.
    pub window_size: usize,
    /// Gap (seconds) above which elapsed time counts as a pause, not runtime.
    pub gap_threshold_secs: u64,
    /// Validation phase exit score threshold.
    pub validation_score_threshold: f64,
    /// Per-round validation score weights; must sum to ~1.0.
    pub validation_round_weights: [f64; 5],
    /// Maximum full validation cycles before forced exhaustion.
    pub validation_max_cycles: u32,
    /// Idle guard: base required interval (seconds).
    pub idle_base_secs: f64,
    /// Idle guard: exponential multiplier per idle iteration.
    pub idle_multiplier: f64,
    /// Idle guard: cap on the required interval (seconds).
    pub idle_max_interval_secs: f64,
    /// Idle guard: consecutive idle iterations before a forced mode switch.
    pub idle_cap: u32,
    /// Metrics-cap adapter: maximum metric entries before OVERRIDE convergence.
    pub metrics_cap: usize,
    /// Phrases matched with word-boundary regex as completion signal (e).
    pub completion_phrases: Vec<String>,
    /// Confidence weights for the completion signals.
    pub signal_weights: CompletionWeights,
    /// Guidance lines injected into exploration-mode continuation prompts.
    pub exploration_guidance: Vec<String>,
    /// Bound on state file lock acquisition (milliseconds).
    pub lock_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_hours: 2.0,
            max_hours: 12.0,
            min_iterations: 10,
            max_iterations: 100,
            similarity_threshold: 0.90,
            window_size: 5,
            gap_threshold_secs: 300,
            validation_score_threshold: 0.8,
            validation_round_weights: [0.25, 0.20, 0.15, 0.20, 0.20],
            validation_max_cycles: 3,
            idle_base_secs: 30.0,
            idle_multiplier: 2.0,
            idle_max_interval_secs: 600.0,
            idle_cap: 3,
            metrics_cap: 200,
            completion_phrases: vec![
                "task complete".to_string(),
                "all tasks complete".to_string(),
                "implementation complete".to_string(),
                "all work is done".to_string(),
            ],
            signal_weights: CompletionWeights::default(),
            exploration_guidance: vec![
                "Look for untested edge cases in recently changed code".to_string(),
                "Audit error handling paths for silent failures".to_string(),
                "Improve documentation where behavior is non-obvious".to_string(),
            ],
            lock_timeout_ms: store::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl ControllerConfig {
    /// Loads the layered configuration for a project.
    ///
    /// Missing or unreadable files are skipped silently; a present but
    /// invalid file is skipped with a warning. The result is always
    /// sanitized, so every field is within its valid range.
    #[must_use]
    pub fn load(state_dir: &Path, project: &Path) -> Self {
        let mut config = Self::default();

        for path in [
            state_dir.join(GLOBAL_CONFIG_FILE),
            project.join(PROJECT_CONFIG_FILE),
        ] {
            match store::read_json::<ConfigOverlay>(&path) {
                Ok(Some(overlay)) => overlay.apply(&mut config),
                Ok(None) => {}
                Err(e) => warn!("Skipping config file {}: {}", path.display(), e),
            }
        }

        ConfigOverlay::from_env().apply(&mut config);
        config.sanitize();
        config
    }

    /// Resets out-of-range fields to their defaults, returning one
    /// message per rejected field.
    pub fn sanitize(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut rejected = Vec::new();

        let mut reject = |field: &str, reason: String| {
            warn!("Invalid config: {} - {}; using default", field, reason);
            rejected.push(format!("{field}: {reason}"));
        };

        if !self.min_hours.is_finite() || self.min_hours < 0.0 {
            reject("min_hours", format!("{} out of range", self.min_hours));
            self.min_hours = defaults.min_hours;
        }
        if !self.max_hours.is_finite() || self.max_hours <= 0.0 {
            reject("max_hours", format!("{} out of range", self.max_hours));
            self.max_hours = defaults.max_hours;
        }
        if self.min_hours > self.max_hours {
            reject(
                "min_hours",
                format!("{} exceeds max_hours {}", self.min_hours, self.max_hours),
            );
            self.min_hours = defaults.min_hours.min(self.max_hours);
        }
        if self.max_iterations == 0 {
            reject("max_iterations", "zero".to_string());
            self.max_iterations = defaults.max_iterations;
        }
        if self.min_iterations > self.max_iterations {
            reject(
                "min_iterations",
                format!("{} exceeds max_iterations", self.min_iterations),
            );
            self.min_iterations = defaults.min_iterations.min(self.max_iterations);
        }
        if !(0.70..=1.0).contains(&self.similarity_threshold) {
            reject(
                "similarity_threshold",
                format!("{} outside 0.70..=1.0", self.similarity_threshold),
            );
            self.similarity_threshold = defaults.similarity_threshold;
        }
        if self.window_size == 0 || self.window_size > 20 {
            reject("window_size", format!("{} outside 1..=20", self.window_size));
            self.window_size = defaults.window_size;
        }
        if self.gap_threshold_secs < 60 {
            reject(
                "gap_threshold_secs",
                format!("{} below 60", self.gap_threshold_secs),
            );
            self.gap_threshold_secs = defaults.gap_threshold_secs;
        }
        if !(0.0..=1.0).contains(&self.validation_score_threshold) {
            reject(
                "validation_score_threshold",
                format!("{} outside 0..=1", self.validation_score_threshold),
            );
            self.validation_score_threshold = defaults.validation_score_threshold;
        }
        let weight_sum: f64 = self.validation_round_weights.iter().sum();
        if self
            .validation_round_weights
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
            || (weight_sum - 1.0).abs() > 0.01
        {
            reject(
                "validation_round_weights",
                format!("weights sum to {weight_sum}, expected 1.0"),
            );
            self.validation_round_weights = defaults.validation_round_weights;
        }
        if self.validation_max_cycles == 0 || self.validation_max_cycles > 10 {
            reject(
                "validation_max_cycles",
                format!("{} outside 1..=10", self.validation_max_cycles),
            );
            self.validation_max_cycles = defaults.validation_max_cycles;
        }
        if !self.idle_base_secs.is_finite() || self.idle_base_secs <= 0.0 {
            reject("idle_base_secs", format!("{}", self.idle_base_secs));
            self.idle_base_secs = defaults.idle_base_secs;
        }
        if !self.idle_multiplier.is_finite() || self.idle_multiplier < 1.0 {
            reject("idle_multiplier", format!("{}", self.idle_multiplier));
            self.idle_multiplier = defaults.idle_multiplier;
        }
        if !self.idle_max_interval_secs.is_finite() || self.idle_max_interval_secs <= 0.0 {
            reject(
                "idle_max_interval_secs",
                format!("{}", self.idle_max_interval_secs),
            );
            self.idle_max_interval_secs = defaults.idle_max_interval_secs;
        }
        if self.idle_cap == 0 {
            reject("idle_cap", "zero".to_string());
            self.idle_cap = defaults.idle_cap;
        }
        if self.lock_timeout_ms == 0 || self.lock_timeout_ms > 60_000 {
            reject(
                "lock_timeout_ms",
                format!("{} outside 1..=60000", self.lock_timeout_ms),
            );
            self.lock_timeout_ms = defaults.lock_timeout_ms;
        }

        rejected
    }

    /// Hard runtime cap in seconds.
    #[must_use]
    pub fn max_runtime_secs(&self) -> f64 {
        self.max_hours * 3600.0
    }

    /// Minimum runtime threshold in seconds.
    #[must_use]
    pub fn min_runtime_secs(&self) -> f64 {
        self.min_hours * 3600.0
    }
}

/// Sparse overlay applied on top of lower-precedence layers.
///
/// Only the fields commonly tuned per project or per run are exposed as
/// environment variables; files may set any field.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigOverlay {
    pub min_hours: Option<f64>,
    pub max_hours: Option<f64>,
    pub min_iterations: Option<u32>,
    pub max_iterations: Option<u32>,
    pub similarity_threshold: Option<f64>,
    pub window_size: Option<usize>,
    pub gap_threshold_secs: Option<u64>,
    pub validation_score_threshold: Option<f64>,
    pub validation_round_weights: Option<[f64; 5]>,
    pub validation_max_cycles: Option<u32>,
    pub idle_base_secs: Option<f64>,
    pub idle_multiplier: Option<f64>,
    pub idle_max_interval_secs: Option<f64>,
    pub idle_cap: Option<u32>,
    pub metrics_cap: Option<usize>,
    pub completion_phrases: Option<Vec<String>>,
    pub signal_weights: Option<CompletionWeights>,
    pub exploration_guidance: Option<Vec<String>>,
    pub lock_timeout_ms: Option<u64>,
}

impl ConfigOverlay {
    /// Builds an overlay from `VIGIL_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
            let raw = std::env::var(name).ok()?;
            match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring unparseable env override {}={}", name, raw);
                    None
                }
            }
        }

        Self {
            min_hours: parse_var("VIGIL_MIN_HOURS"),
            max_hours: parse_var("VIGIL_MAX_HOURS"),
            min_iterations: parse_var("VIGIL_MIN_ITERATIONS"),
            max_iterations: parse_var("VIGIL_MAX_ITERATIONS"),
            similarity_threshold: parse_var("VIGIL_SIMILARITY_THRESHOLD"),
            gap_threshold_secs: parse_var("VIGIL_GAP_THRESHOLD_SECS"),
            ..Self::default()
        }
    }

    /// Applies every present field onto `config`.
    pub fn apply(self, config: &mut ControllerConfig) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        overlay!(
            min_hours,
            max_hours,
            min_iterations,
            max_iterations,
            similarity_threshold,
            window_size,
            gap_threshold_secs,
            validation_score_threshold,
            validation_round_weights,
            validation_max_cycles,
            idle_base_secs,
            idle_multiplier,
            idle_max_interval_secs,
            idle_cap,
            metrics_cap,
            completion_phrases,
            signal_weights,
            exploration_guidance,
            lock_timeout_ms,
        );
    }
}

/// Resolves the state directory: explicit flag > `VIGIL_STATE_DIR` >
/// `~/.vigil`.
#[must_use]
pub fn resolve_state_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var("VIGIL_STATE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vigil")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let mut config = ControllerConfig::default();
        assert!(config.sanitize().is_empty());
    }

    #[test]
    fn test_sanitize_rejects_similarity_out_of_range() {
        let mut config = ControllerConfig {
            similarity_threshold: 0.3,
            ..Default::default()
        };
        let rejected = config.sanitize();
        assert_eq!(rejected.len(), 1);
        assert!((config.similarity_threshold - 0.90).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sanitize_rejects_min_above_max() {
        let mut config = ControllerConfig {
            min_iterations: 500,
            max_iterations: 100,
            ..Default::default()
        };
        config.sanitize();
        assert!(config.min_iterations <= config.max_iterations);
    }

    #[test]
    fn test_sanitize_rejects_bad_round_weights() {
        let mut config = ControllerConfig {
            validation_round_weights: [0.5, 0.5, 0.5, 0.5, 0.5],
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(
            config.validation_round_weights,
            ControllerConfig::default().validation_round_weights
        );
    }

    #[test]
    fn test_sanitize_rejects_nan() {
        let mut config = ControllerConfig {
            min_hours: f64::NAN,
            ..Default::default()
        };
        config.sanitize();
        assert!((config.min_hours - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_missing_files_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ControllerConfig::load(temp.path(), temp.path());
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn test_load_project_overrides_global() {
        let temp = TempDir::new().unwrap();
        let state_dir = temp.path().join("state");
        let project = temp.path().join("project");
        std::fs::create_dir_all(&state_dir).unwrap();
        std::fs::create_dir_all(project.join(".vigil")).unwrap();

        std::fs::write(
            state_dir.join(GLOBAL_CONFIG_FILE),
            r#"{"max_iterations": 50, "min_iterations": 5}"#,
        )
        .unwrap();
        std::fs::write(
            project.join(PROJECT_CONFIG_FILE),
            r#"{"max_iterations": 80}"#,
        )
        .unwrap();

        let config = ControllerConfig::load(&state_dir, &project);
        // Project wins where set; global applies where project is silent.
        assert_eq!(config.max_iterations, 80);
        assert_eq!(config.min_iterations, 5);
    }

    #[test]
    fn test_load_skips_unreadable_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(GLOBAL_CONFIG_FILE), "garbage }{").unwrap();
        let config = ControllerConfig::load(temp.path(), temp.path());
        assert_eq!(config.max_iterations, 100);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(GLOBAL_CONFIG_FILE),
            r#"{"max_iterations": 42, "not_a_field": true}"#,
        )
        .unwrap();
        let config = ControllerConfig::load(temp.path(), temp.path());
        assert_eq!(config.max_iterations, 42);
    }

    #[test]
    fn test_out_of_range_file_value_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(GLOBAL_CONFIG_FILE),
            r#"{"similarity_threshold": 2.5}"#,
        )
        .unwrap();
        let config = ControllerConfig::load(temp.path(), temp.path());
        assert!((config.similarity_threshold - 0.90).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resolve_state_dir_explicit_wins() {
        let dir = resolve_state_dir(Some(Path::new("/tmp/custom")));
        assert_eq!(dir, PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn test_runtime_thresholds_in_seconds() {
        let config = ControllerConfig::default();
        assert!((config.min_runtime_secs() - 7200.0).abs() < f64::EPSILON);
        assert!((config.max_runtime_secs() - 43200.0).abs() < f64::EPSILON);
    }
}
