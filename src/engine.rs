//! Decision engine.
//!
//! Orchestrates every subsystem into one of three verdicts per stop
//! attempt. The evaluation order is load-bearing: kill and lifecycle
//! checks come first so user-issued stops are never overridden, hard
//! safety limits come before any content-based signal, and content
//! signals pivot the session mode rather than stopping it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::adapter::{AdapterRegistry, Confidence};
use crate::completion;
use crate::config::ControllerConfig;
use crate::discovery::{ArtifactProbe, ConventionalDiscovery, GitProbe, TargetDiscovery};
use crate::guard::{IdleGuard, IdleOutcome};
use crate::hook::{HookInput, HookOutput};
use crate::lifecycle::{LifecycleStore, LoopState};
use crate::plan;
use crate::prompt::{self, NullScanner, WorkScanner};
use crate::repetition;
use crate::session::{self, SessionManager, SessionMode, SessionState};
use crate::validation::{parse_round_report, ValidationPhase};

/// Final decision for one stop attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the host stop the session.
    AllowStop { reason: String },
    /// Block the stop and continue with the given prompt.
    Continue { prompt: String },
    /// Stop and override host-level retry logic.
    HardStop { reason: String },
}

impl Verdict {
    /// Wire shape for this verdict.
    #[must_use]
    pub fn to_output(&self) -> HookOutput {
        match self {
            Verdict::AllowStop { reason } => {
                info!("Allowing stop: {}", reason);
                HookOutput::Allow
            }
            Verdict::Continue { prompt } => HookOutput::Block {
                reason: prompt.clone(),
            },
            Verdict::HardStop { reason } => HookOutput::HardStop {
                stop_reason: reason.clone(),
            },
        }
    }
}

/// Everything one invocation needs, collaborators included.
pub struct Engine {
    state_dir: PathBuf,
    project: PathBuf,
    config: ControllerConfig,
    registry: AdapterRegistry,
    discovery: Box<dyn TargetDiscovery>,
    probe: Box<dyn ArtifactProbe>,
    scanner: Box<dyn WorkScanner>,
}

impl Engine {
    /// Engine with the default collaborators.
    #[must_use]
    pub fn new(state_dir: impl AsRef<Path>, project: impl AsRef<Path>, config: ControllerConfig) -> Self {
        let registry = AdapterRegistry::new(config.metrics_cap);
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            project: project.as_ref().to_path_buf(),
            config,
            registry,
            discovery: Box::new(ConventionalDiscovery::default()),
            probe: Box::new(GitProbe),
            scanner: Box::new(NullScanner),
        }
    }

    /// Engine with caller-supplied collaborators.
    #[must_use]
    pub fn with_collaborators(
        state_dir: impl AsRef<Path>,
        project: impl AsRef<Path>,
        config: ControllerConfig,
        registry: AdapterRegistry,
        discovery: Box<dyn TargetDiscovery>,
        probe: Box<dyn ArtifactProbe>,
        scanner: Box<dyn WorkScanner>,
    ) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            project: project.as_ref().to_path_buf(),
            config,
            registry,
            discovery,
            probe,
            scanner,
        }
    }

    /// Evaluates one stop attempt.
    pub fn decide(&self, input: &HookInput, now: DateTime<Utc>) -> Verdict {
        let path_hash = session::path_hash(&self.project);
        let lifecycle =
            LifecycleStore::new(&self.state_dir, &path_hash, self.config.lock_timeout_ms);

        // The kill signal is consumed ahead of the recursion guard so a
        // marker raised mid-continuation cannot survive into the next
        // freshly started loop.
        if lifecycle.consume_kill_signal() {
            if let Err(e) = lifecycle.force_stopped() {
                warn!("Failed to mark loop stopped after kill signal: {}", e);
            }
            return Verdict::HardStop {
                reason: "kill signal received".into(),
            };
        }

        if input.stop_hook_active {
            return Verdict::AllowStop {
                reason: "stop hook already active, avoiding recursion".into(),
            };
        }

        match lifecycle.load() {
            LoopState::Stopped => {
                return Verdict::AllowStop {
                    reason: "loop is not running".into(),
                }
            }
            LoopState::Draining => {
                if let Err(e) = lifecycle.force_stopped() {
                    warn!("Failed to complete drain: {}", e);
                }
                return Verdict::HardStop {
                    reason: "loop drained to a stop".into(),
                };
            }
            LoopState::Running => {}
        }

        let manager = SessionManager::new(&self.state_dir, self.config.lock_timeout_ms);
        let mut state = match manager.load(input.session_id(), &path_hash) {
            Ok(state) => state,
            Err(e) => {
                warn!("Session state unavailable, proceeding fresh: {}", e);
                SessionState::new(input.session_id(), &path_hash)
            }
        };

        state.iteration += 1;
        let prior_hook_at = state.runtime.last_hook_at;
        state.runtime.update(now, self.config.gap_threshold_secs);
        let last_output = input.resolve_last_output();

        if state.runtime.active_seconds >= self.config.max_runtime_secs() {
            let reason = format!(
                "max runtime reached ({:.1}h >= {:.1}h)",
                state.runtime.active_hours(),
                self.config.max_hours
            );
            self.persist(&manager, &mut state, &last_output);
            return Verdict::AllowStop { reason };
        }

        if state.iteration >= self.config.max_iterations {
            let reason = format!(
                "max iterations reached ({} >= {})",
                state.iteration, self.config.max_iterations
            );
            self.persist(&manager, &mut state, &last_output);
            return Verdict::AllowStop { reason };
        }

        if let Some(target) = self.discovery.discover(&self.project) {
            state.target_path = Some(target.path);
            state.discovery_method = Some(target.method);
        }
        let detected = completion::detect(state.target_path.as_deref(), &self.config);

        let looping = repetition::is_looping(
            &last_output,
            &state.output_window,
            self.config.similarity_threshold,
        );

        if looping && !detected.is_complete {
            self.persist(&manager, &mut state, &last_output);
            return Verdict::AllowStop {
                reason: "repetition detected without completion, session is stuck".into(),
            };
        }
        if looping && detected.is_complete {
            info!("Repetition after completion, pivoting to exploration");
            state.mode = SessionMode::Exploration;
        }

        let (adapter_name, convergence, adapter_mode) = self.registry.evaluate(&self.project);
        let suggest_agrees = detected.is_complete || looping;
        let adapter_pivot = match convergence.confidence {
            Confidence::Override => !convergence.should_continue,
            Confidence::Suggest => !convergence.should_continue && suggest_agrees,
            Confidence::Defer => false,
        };
        state.adapter_name = Some(adapter_name);
        state.last_convergence = Some(convergence);
        let mut entered_validation = false;
        if adapter_pivot && state.mode != SessionMode::Exploration {
            info!("Adapter convergence opinion pivots session to {}", adapter_mode);
            state.mode = adapter_mode;
            if adapter_mode == SessionMode::Validation && state.validation.is_none() {
                state.validation = Some(ValidationPhase::default());
                entered_validation = true;
            }
        }

        let thresholds_met = state.runtime.active_seconds >= self.config.min_runtime_secs()
            && state.iteration >= self.config.min_iterations;

        if state.mode == SessionMode::Validation && !entered_validation {
            if let Some(phase) = state.validation.as_mut() {
                phase.record_round(
                    parse_round_report(&last_output),
                    &self.config.validation_round_weights,
                );
                if let Some(exit) = phase.exit_reason(
                    self.config.validation_score_threshold,
                    self.config.validation_max_cycles,
                ) {
                    info!("Validation exhausted ({:?}), pivoting to exploration", exit);
                    state.mode = SessionMode::Exploration;
                }
            }
        } else if detected.is_complete && thresholds_met && state.mode == SessionMode::Build {
            info!(
                "Completion detected ({}, {:.2}), entering validation",
                detected.reason, detected.confidence
            );
            state.mode = SessionMode::Validation;
            state.validation = Some(ValidationPhase::default());
        }

        let elapsed_secs =
            prior_hook_at.map(|prior| (now - prior).num_milliseconds() as f64 / 1000.0);
        let guard = IdleGuard::from_config(&self.config);
        let jitter = guard.jitter();
        let fingerprint = self.probe.fingerprint(&self.project);
        if guard.assess(&mut state, elapsed_secs, fingerprint, jitter)
            == IdleOutcome::ForceExploration
        {
            info!("Idle cap reached, forcing exploration");
            state.mode = SessionMode::Exploration;
        }

        let items = state
            .target_path
            .as_deref()
            .and_then(|path| fs::read_to_string(path).ok())
            .map(|contents| {
                let source = state
                    .target_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                plan::parse_work_items(&contents, &source)
            })
            .unwrap_or_default();
        let open = plan::open_items(&items);
        let opportunities = self.scanner.scan(&self.project);
        let prompt = prompt::build_prompt(&state, &self.config, &open, &opportunities);

        self.persist(&manager, &mut state, &last_output);
        Verdict::Continue { prompt }
    }

    /// Updates the output window and saves the session; persistence
    /// failures are logged, never propagated into the verdict.
    fn persist(&self, manager: &SessionManager, state: &mut SessionState, last_output: &str) {
        if !last_output.is_empty() {
            repetition::push_window(
                &mut state.output_window,
                last_output.to_string(),
                self.config.window_size,
            );
        }
        if let Err(e) = manager.save(state) {
            warn!("Failed to persist session state: {}", e);
        }
    }
}
