//! Continuation prompt assembly.
//!
//! The blocking verdict carries a human-readable prompt telling the
//! agent what to do next. The text depends on the session mode; work
//! opportunities from an external scanner only enrich the prompt and
//! never influence the verdict itself.

use std::path::Path;

use crate::config::ControllerConfig;
use crate::plan::WorkItem;
use crate::session::{SessionMode, SessionState};
use crate::validation::ValidationPhase;

/// Cap on listed work items and opportunities.
const MAX_LISTED: usize = 5;

/// Supplies improvement descriptions for prompt enrichment.
pub trait WorkScanner {
    fn scan(&self, project: &Path) -> Vec<String>;
}

/// Scanner that contributes nothing.
#[derive(Debug, Default)]
pub struct NullScanner;

impl WorkScanner for NullScanner {
    fn scan(&self, _project: &Path) -> Vec<String> {
        Vec::new()
    }
}

/// Builds the continuation prompt for the current mode.
#[must_use]
pub fn build_prompt(
    state: &SessionState,
    config: &ControllerConfig,
    open_items: &[&WorkItem],
    opportunities: &[String],
) -> String {
    let mut lines = vec![format!(
        "Session continues (iteration {}, {:.1}h active).",
        state.iteration,
        state.runtime.active_hours()
    )];

    match state.mode {
        SessionMode::Build => {
            lines.push("Keep working through the plan.".to_string());
            if open_items.is_empty() {
                lines.push(
                    "No open plan items were found; re-check the plan document.".to_string(),
                );
            } else {
                lines.push("Open items:".to_string());
                for item in open_items.iter().take(MAX_LISTED) {
                    lines.push(format!("- [{}] {}", item.priority, item.title));
                }
            }
        }
        SessionMode::Validation => {
            let phase = state.validation.clone().unwrap_or_default();
            lines.push(validation_instructions(&phase));
        }
        SessionMode::Exploration => {
            lines.push("The plan is exhausted. Explore improvements:".to_string());
            for guidance in &config.exploration_guidance {
                lines.push(format!("- {guidance}"));
            }
        }
    }

    if !opportunities.is_empty() {
        lines.push("Detected opportunities:".to_string());
        for opportunity in opportunities.iter().take(MAX_LISTED) {
            lines.push(format!("- {opportunity}"));
        }
    }

    lines.join("\n")
}

fn validation_instructions(phase: &ValidationPhase) -> String {
    format!(
        "Validation round {} of 5: perform a {}. Report each issue on its own \
         line as `finding[critical|medium|low]: <detail>` and end with \
         `round: pass` or `round: fail`.",
        phase.round,
        phase.current_round_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Priority;

    fn state_in(mode: SessionMode) -> SessionState {
        let mut state = SessionState::new("sess", "cafe0123");
        state.iteration = 12;
        state.runtime.active_seconds = 5400.0;
        state.mode = mode;
        state
    }

    #[test]
    fn test_build_prompt_lists_open_items() {
        let items = vec![
            WorkItem {
                title: "Handle lock timeouts".into(),
                priority: Priority::P0,
                source: "PLAN.md".into(),
                completed: false,
            },
            WorkItem {
                title: "Tidy docs".into(),
                priority: Priority::P2,
                source: "PLAN.md".into(),
                completed: false,
            },
        ];
        let refs: Vec<&WorkItem> = items.iter().collect();
        let prompt = build_prompt(
            &state_in(SessionMode::Build),
            &ControllerConfig::default(),
            &refs,
            &[],
        );
        assert!(prompt.contains("iteration 12, 1.5h active"));
        assert!(prompt.contains("- [P0] Handle lock timeouts"));
        assert!(prompt.contains("- [P2] Tidy docs"));
    }

    #[test]
    fn test_build_prompt_without_items() {
        let prompt = build_prompt(
            &state_in(SessionMode::Build),
            &ControllerConfig::default(),
            &[],
            &[],
        );
        assert!(prompt.contains("No open plan items"));
    }

    #[test]
    fn test_validation_prompt_names_round() {
        let mut state = state_in(SessionMode::Validation);
        let mut phase = ValidationPhase::default();
        phase.round = 3;
        state.validation = Some(phase);

        let prompt = build_prompt(&state, &ControllerConfig::default(), &[], &[]);
        assert!(prompt.contains("round 3 of 5"));
        assert!(prompt.contains("documentation and coverage audit"));
        assert!(prompt.contains("finding[critical|medium|low]"));
    }

    #[test]
    fn test_exploration_prompt_uses_guidance() {
        let prompt = build_prompt(
            &state_in(SessionMode::Exploration),
            &ControllerConfig::default(),
            &[],
            &[],
        );
        assert!(prompt.contains("Explore improvements"));
    }

    #[test]
    fn test_opportunities_are_capped() {
        let opportunities: Vec<String> = (0..10).map(|i| format!("opportunity {i}")).collect();
        let prompt = build_prompt(
            &state_in(SessionMode::Build),
            &ControllerConfig::default(),
            &[],
            &opportunities,
        );
        assert!(prompt.contains("opportunity 4"));
        assert!(!prompt.contains("opportunity 5"));
    }
}
