//! Vigil - autonomous session continuation controller.
//!
//! Vigil sits behind a host agent's stop hook and decides, on every
//! stop attempt, whether the session should actually end. It reads one
//! JSON request on stdin, weighs completion evidence, repetition,
//! runtime budgets, and project-specific convergence opinions, and
//! writes one JSON verdict on stdout.
//!
//! # Architecture
//!
//! - [`lifecycle`] - per-project loop state machine and kill signal
//! - [`session`] - per-session state with cross-session inheritance
//! - [`completion`] - multi-signal completion detection
//! - [`repetition`] - fuzzy stuck-loop detection
//! - [`runtime`] - active-time accounting with gap exclusion
//! - [`adapter`] - convergence adapter registry
//! - [`validation`] - five-round quality-gate phase
//! - [`guard`] - idle iteration backoff
//! - [`engine`] - verdict orchestration
//! - [`hook`] - stdin/stdout wire protocol
//!
//! # Example
//!
//! ```rust,ignore
//! use vigil::config::ControllerConfig;
//! use vigil::engine::Engine;
//! use vigil::hook::HookInput;
//!
//! let config = ControllerConfig::load(&state_dir, &project);
//! let engine = Engine::new(&state_dir, &project, config);
//! let input = HookInput::parse(&raw).unwrap_or_default();
//! let verdict = engine.decide(&input, chrono::Utc::now());
//! println!("{}", verdict.to_output().to_json());
//! ```

pub mod adapter;
pub mod completion;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod guard;
pub mod hook;
pub mod lifecycle;
pub mod plan;
pub mod prompt;
pub mod repetition;
pub mod runtime;
pub mod session;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use error::{Result, VigilError};

pub use adapter::{
    AdapterRegistry, Confidence, ConvergenceResult, MetricsEntry, ProjectAdapter,
};
pub use config::{resolve_state_dir, CompletionWeights, ControllerConfig};
pub use engine::{Engine, Verdict};
pub use hook::{HookInput, HookOutput};
pub use lifecycle::{LifecycleStore, LoopState};
pub use session::{path_hash, SessionManager, SessionMode, SessionState};
