//! Convergence adapter registry.
//!
//! Project-specific modules contribute convergence opinions through the
//! [`ProjectAdapter`] capability contract. The registry holds an explicit
//! registration-order list, selects the first adapter whose `detect`
//! matches the project, and guarantees a result via an always-true
//! fallback. Adapter failures are isolated: a raising adapter abstains
//! (DEFER) instead of crashing the controller.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::session::SessionMode;

/// Relative path of the metrics journal inside a project.
pub const METRICS_FILE: &str = ".vigil/metrics.jsonl";

/// Discrete confidence tier attached to a convergence opinion.
///
/// The set is closed on purpose: aggregation stays deterministic, and no
/// adapter can invent an intermediate weight to tip the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Informational only; never changes the verdict.
    Defer,
    /// Acted on only with independent agreement from core signals.
    Suggest,
    /// Unconditionally determines the outcome (hard safety caps).
    Override,
}

impl Confidence {
    /// Numeric weight, for display and audit only.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Confidence::Defer => 0.0,
            Confidence::Suggest => 0.5,
            Confidence::Override => 1.0,
        }
    }
}

/// One adapter's convergence opinion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConvergenceResult {
    /// Whether the adapter believes iteration should continue.
    pub should_continue: bool,
    /// Human-readable justification.
    pub reason: String,
    /// Confidence tier for the aggregation policy.
    pub confidence: Confidence,
    /// Whether the project has converged by the adapter's measure.
    pub converged: bool,
}

impl ConvergenceResult {
    /// An abstention: continue, no opinion.
    #[must_use]
    pub fn abstain(reason: impl Into<String>) -> Self {
        Self {
            should_continue: true,
            reason: reason.into(),
            confidence: Confidence::Defer,
            converged: false,
        }
    }
}

/// One immutable metrics record produced from external run artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEntry {
    /// Run or artifact identifier.
    pub identifier: String,
    /// When the entry was produced.
    pub timestamp: DateTime<Utc>,
    /// Primary optimization metric.
    pub primary_metric: f64,
    /// Named secondary metrics; absent values stay null.
    #[serde(default)]
    pub secondary_metrics: BTreeMap<String, Option<f64>>,
}

/// Capability contract for project-specific convergence logic.
pub trait ProjectAdapter {
    /// Stable adapter name, recorded in session state.
    fn name(&self) -> &str;

    /// Whether this adapter applies to the given project.
    fn detect(&self, project: &Path) -> bool;

    /// Metrics produced since `since` (all history when `None`).
    fn metrics_history(
        &self,
        project: &Path,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricsEntry>>;

    /// Convergence opinion over the given metrics.
    ///
    /// Called with zero metrics during warmup; must return a
    /// low-confidence "continue" rather than erroring.
    fn check_convergence(&self, metrics: &[MetricsEntry], project: &Path)
        -> Result<ConvergenceResult>;

    /// Session mode the continuation pivots into when this adapter's
    /// opinion ends the build phase.
    fn session_mode(&self) -> SessionMode {
        SessionMode::Exploration
    }
}

/// Built-in adapter enforcing a hard cap on total metrics entries.
///
/// Applies to any project carrying a `.vigil/metrics.jsonl` journal. At
/// or past the cap it emits an OVERRIDE stop-continuing opinion, the one
/// tier the aggregation policy treats as absolute.
pub struct MetricsCapAdapter {
    cap: usize,
}

impl MetricsCapAdapter {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self { cap }
    }
}

impl ProjectAdapter for MetricsCapAdapter {
    fn name(&self) -> &str {
        "metrics-cap"
    }

    fn detect(&self, project: &Path) -> bool {
        project.join(METRICS_FILE).exists()
    }

    fn metrics_history(
        &self,
        project: &Path,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricsEntry>> {
        let path = project.join(METRICS_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MetricsEntry>(line) {
                Ok(entry) => {
                    if since.is_none_or(|cutoff| entry.timestamp >= cutoff) {
                        entries.push(entry);
                    }
                }
                Err(e) => {
                    warn!(
                        "Skipping malformed metrics line {}:{}: {}",
                        path.display(),
                        lineno + 1,
                        e
                    );
                }
            }
        }
        Ok(entries)
    }

    fn check_convergence(
        &self,
        metrics: &[MetricsEntry],
        _project: &Path,
    ) -> Result<ConvergenceResult> {
        if metrics.is_empty() {
            return Ok(ConvergenceResult::abstain("warmup, no metrics yet"));
        }
        if metrics.len() >= self.cap {
            return Ok(ConvergenceResult {
                should_continue: false,
                reason: format!("metrics cap reached ({} >= {})", metrics.len(), self.cap),
                confidence: Confidence::Override,
                converged: true,
            });
        }
        Ok(ConvergenceResult {
            should_continue: true,
            reason: format!("{} of {} metrics entries", metrics.len(), self.cap),
            confidence: Confidence::Defer,
            converged: false,
        })
    }
}

/// Always-true fallback adapter guaranteeing a result for any project.
pub struct FallbackAdapter;

impl ProjectAdapter for FallbackAdapter {
    fn name(&self) -> &str {
        "fallback"
    }

    fn detect(&self, _project: &Path) -> bool {
        true
    }

    fn metrics_history(
        &self,
        _project: &Path,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricsEntry>> {
        Ok(Vec::new())
    }

    fn check_convergence(
        &self,
        _metrics: &[MetricsEntry],
        _project: &Path,
    ) -> Result<ConvergenceResult> {
        Ok(ConvergenceResult::abstain("no project-specific signals"))
    }
}

/// Explicit registration-order adapter list.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ProjectAdapter>>,
}

impl AdapterRegistry {
    /// Builds the registry with the built-in adapters; the fallback is
    /// always last.
    #[must_use]
    pub fn new(metrics_cap: usize) -> Self {
        Self {
            adapters: vec![
                Box::new(MetricsCapAdapter::new(metrics_cap)),
                Box::new(FallbackAdapter),
            ],
        }
    }

    /// Registry with caller-supplied adapters ahead of the fallback.
    #[must_use]
    pub fn with_adapters(mut adapters: Vec<Box<dyn ProjectAdapter>>) -> Self {
        adapters.push(Box::new(FallbackAdapter));
        Self { adapters }
    }

    /// Selects the first adapter whose `detect` returns true.
    #[must_use]
    pub fn select(&self, project: &Path) -> &dyn ProjectAdapter {
        let chosen = self
            .adapters
            .iter()
            .find(|adapter| adapter.detect(project))
            .unwrap_or_else(|| {
                self.adapters
                    .last()
                    .expect("fallback adapter is always registered")
            });
        debug!("Selected adapter '{}'", chosen.name());
        &**chosen
    }

    /// Runs the selected adapter and returns `(name, opinion, mode)`.
    ///
    /// Any adapter error degrades to an abstention so one broken adapter
    /// cannot crash the controller or mask core signals.
    #[must_use]
    pub fn evaluate(&self, project: &Path) -> (String, ConvergenceResult, SessionMode) {
        let adapter = self.select(project);
        let name = adapter.name().to_string();
        let mode = adapter.session_mode();

        let metrics = match adapter.metrics_history(project, None) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Adapter '{}' metrics history failed: {}", name, e);
                Vec::new()
            }
        };

        let result = match adapter.check_convergence(&metrics, project) {
            Ok(result) => result,
            Err(e) => {
                warn!("Adapter '{}' convergence check failed: {}", name, e);
                ConvergenceResult::abstain(format!("adapter error: {e}"))
            }
        };
        debug!(
            "Adapter '{}': {} (confidence weight {:.1})",
            name,
            result.reason,
            result.confidence.weight()
        );

        (name, result, mode)
    }
}
