//! Validation phase state machine.
//!
//! Entered once primary completion is detected. Five ordered rounds, each
//! independent and re-runnable; a cycle is one pass through all five. The
//! phase carries a weighted score over per-round pass/fail outcomes and
//! exits on score, cycle cap, or diminishing returns. Exhaustion hands
//! control back to the decision engine, which pivots to exploration; the
//! phase itself never stops a session.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of rounds per validation cycle.
pub const ROUND_COUNT: usize = 5;

/// What each round probes, in order.
pub const ROUND_NAMES: [&str; ROUND_COUNT] = [
    "static and critical-issue check",
    "fix verification and regression check",
    "documentation and coverage audit",
    "adversarial edge-case and numerical probing",
    "cross-regime robustness check",
];

/// Relative change in cycle finding counts below which the phase is
/// considered to be yielding diminishing returns.
const DIMINISHING_RETURNS_RATIO: f64 = 0.10;

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Medium,
    Low,
}

/// One finding, appended during a round and never retroactively edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    /// Round (1-5) that produced the finding.
    pub round: u8,
    pub severity: Severity,
    pub detail: String,
}

/// Outcome of a single round, parsed from the agent's report.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub passed: bool,
    /// Findings with severity and detail; round is filled in on record.
    pub findings: Vec<(Severity, String)>,
}

/// Why the phase exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationExit {
    /// Score reached the threshold after at least one full cycle.
    ScoreMet,
    /// Cycle cap reached.
    CycleCapReached,
    /// Successive cycles changed the finding count by under 10%.
    DiminishingReturns,
}

/// Persisted validation phase state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationPhase {
    /// Next round to run, 1-5.
    pub round: u8,
    /// Invocations spent inside the phase.
    pub iteration: u32,
    /// Completed full cycles.
    pub cycles_completed: u32,
    /// Weighted score in [0, 1], recomputed at each cycle boundary.
    pub score: f64,
    /// Pass/fail per round for the current cycle.
    pub round_passed: [bool; ROUND_COUNT],
    /// All findings across the phase, append-only.
    pub findings: Vec<Finding>,
    /// Finding count at the end of the previous cycle.
    pub prior_cycle_findings: Option<usize>,
    /// Set when the last cycle boundary showed diminishing returns.
    pub diminishing: bool,
}

impl Default for ValidationPhase {
    fn default() -> Self {
        Self {
            round: 1,
            iteration: 0,
            cycles_completed: 0,
            score: 0.0,
            round_passed: [false; ROUND_COUNT],
            findings: Vec::new(),
            prior_cycle_findings: None,
            diminishing: false,
        }
    }
}

impl ValidationPhase {
    /// Name of the round about to run.
    #[must_use]
    pub fn current_round_name(&self) -> &'static str {
        ROUND_NAMES[(self.round as usize - 1).min(ROUND_COUNT - 1)]
    }

    /// Records the outcome of the current round and advances.
    ///
    /// Completing round 5 closes a cycle: the score is recomputed from
    /// the weighted pass/fail outcomes and the diminishing-returns flag
    /// is updated from the cycle-over-cycle finding count.
    pub fn record_round(&mut self, report: RoundReport, weights: &[f64]) {
        let index = (self.round as usize - 1).min(ROUND_COUNT - 1);
        self.round_passed[index] = report.passed;
        for (severity, detail) in report.findings {
            self.findings.push(Finding {
                round: self.round,
                severity,
                detail,
            });
        }
        self.iteration += 1;

        if self.round as usize >= ROUND_COUNT {
            self.close_cycle(weights);
            self.round = 1;
        } else {
            self.round += 1;
        }
    }

    fn close_cycle(&mut self, weights: &[f64]) {
        self.cycles_completed += 1;
        self.score = self
            .round_passed
            .iter()
            .zip(weights.iter())
            .map(|(&passed, &weight)| if passed { weight } else { 0.0 })
            .sum();

        let total = self.findings.len();
        if let Some(prior) = self.prior_cycle_findings {
            let delta = total.abs_diff(prior);
            self.diminishing = if prior == 0 {
                delta == 0
            } else {
                (delta as f64 / prior as f64) < DIMINISHING_RETURNS_RATIO
            };
        }
        self.prior_cycle_findings = Some(total);
        debug!(
            "Validation cycle {} closed: score {:.2}, {} findings",
            self.cycles_completed, self.score, total
        );
    }

    /// Returns the exit reason if the phase is exhausted.
    #[must_use]
    pub fn exit_reason(&self, score_threshold: f64, max_cycles: u32) -> Option<ValidationExit> {
        if self.cycles_completed == 0 {
            return None;
        }
        if self.score >= score_threshold {
            return Some(ValidationExit::ScoreMet);
        }
        if self.cycles_completed >= max_cycles {
            return Some(ValidationExit::CycleCapReached);
        }
        if self.diminishing {
            return Some(ValidationExit::DiminishingReturns);
        }
        None
    }
}

/// Parses a round report out of the agent's last output.
///
/// Recognized lines: `finding[critical|medium|low]: <detail>` and an
/// explicit `round: pass` / `round: fail`. Without an explicit marker
/// the round passes iff it produced no critical finding; an empty or
/// unrecognized output is a clean pass.
#[must_use]
pub fn parse_round_report(output: &str) -> RoundReport {
    let finding_re = Regex::new(r"(?im)^\s*finding\[(critical|medium|low)\]:\s*(.+)$")
        .expect("finding regex is valid");
    let verdict_re =
        Regex::new(r"(?im)^\s*round:\s*(pass|fail)\s*$").expect("verdict regex is valid");

    let findings: Vec<(Severity, String)> = finding_re
        .captures_iter(output)
        .map(|caps| {
            let severity = match caps[1].to_ascii_lowercase().as_str() {
                "critical" => Severity::Critical,
                "medium" => Severity::Medium,
                _ => Severity::Low,
            };
            (severity, caps[2].trim().to_string())
        })
        .collect();

    let passed = match verdict_re.captures(output) {
        Some(caps) => caps[1].eq_ignore_ascii_case("pass"),
        None => !findings
            .iter()
            .any(|(severity, _)| *severity == Severity::Critical),
    };

    RoundReport { passed, findings }
}
