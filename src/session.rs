//! Per-session state, keyed by `{session_id}@{path_hash}`.
//!
//! Session identifiers change across host-level context resets (manual
//! clear, auto-compaction, rate-limit restarts). Without inheritance a
//! reset would silently zero the iteration and runtime budgets, so a
//! fresh session adopts continuity fields from the most recent state
//! file for the same project and logs the event to an append-only audit
//! journal. The inherited and reset field lists are explicit constants
//! checked by tests.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::ConvergenceResult;
use crate::error::Result;
use crate::runtime::RuntimeTracker;
use crate::store;
use crate::validation::ValidationPhase;

/// Sentinel hash for empty or unresolvable project paths. Never the
/// empty string, which could collide across projects.
pub const EMPTY_PATH_HASH: &str = "00000000";

/// Width of the path hash in hex characters.
const PATH_HASH_LEN: usize = 8;

/// Subdirectory of the state dir holding per-session files.
const SESSIONS_DIR: &str = "sessions";

/// Append-only inheritance audit journal.
const AUDIT_FILE: &str = "inheritance.jsonl";

/// Continuity fields copied from a parent state on inheritance.
pub const INHERITED_FIELDS: [&str; 4] = [
    "iteration",
    "runtime.active_seconds",
    "started_at",
    "last_convergence",
];

/// Per-session fields reset on inheritance.
pub const RESET_FIELDS: [&str; 5] = [
    "output_window",
    "idle_count",
    "validation",
    "mode",
    "last_artifact_fingerprint",
];

/// Which kind of work the continuation asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Working through the plan.
    #[default]
    Build,
    /// Running quality-gate rounds after primary completion.
    Validation,
    /// Open-ended improvement after the plan is exhausted.
    Exploration,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionMode::Build => write!(f, "build"),
            SessionMode::Validation => write!(f, "validation"),
            SessionMode::Exploration => write!(f, "exploration"),
        }
    }
}

/// One record per (session id, project path hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionState {
    /// Schema version.
    pub version: u32,
    pub session_id: String,
    pub path_hash: String,
    /// Stop-hook invocations seen for this line of work.
    pub iteration: u32,
    pub runtime: RuntimeTracker,
    pub started_at: DateTime<Utc>,
    /// Sliding window of recent output snippets.
    pub output_window: Vec<String>,
    pub mode: SessionMode,
    /// Present while the validation phase is active.
    pub validation: Option<ValidationPhase>,
    /// Consecutive unproductive iterations.
    pub idle_count: u32,
    /// Artifact fingerprint from the previous iteration.
    pub last_artifact_fingerprint: Option<String>,
    /// Discovered completion target document.
    pub target_path: Option<PathBuf>,
    pub discovery_method: Option<String>,
    /// Adapter that produced the last convergence opinion.
    pub adapter_name: Option<String>,
    pub last_convergence: Option<ConvergenceResult>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: 1,
            session_id: String::new(),
            path_hash: EMPTY_PATH_HASH.to_string(),
            iteration: 0,
            runtime: RuntimeTracker::default(),
            started_at: Utc::now(),
            output_window: Vec::new(),
            mode: SessionMode::Build,
            validation: None,
            idle_count: 0,
            last_artifact_fingerprint: None,
            target_path: None,
            discovery_method: None,
            adapter_name: None,
            last_convergence: None,
        }
    }
}

impl SessionState {
    /// Fresh state for a new session.
    #[must_use]
    pub fn new(session_id: &str, path_hash: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            path_hash: path_hash.to_string(),
            ..Self::default()
        }
    }

    /// New state for `session_id` carrying the parent's continuity
    /// fields; everything per-session starts fresh.
    #[must_use]
    pub fn inherit_from(parent: &SessionState, session_id: &str) -> Self {
        let mut state = Self::new(session_id, &parent.path_hash);
        state.iteration = parent.iteration;
        state.runtime.active_seconds = parent.runtime.active_seconds;
        state.started_at = parent.started_at;
        state.last_convergence = parent.last_convergence.clone();
        state
    }
}

/// Deterministic 8-hex-character hash of a canonical project path.
///
/// Stable under trailing slashes and symlinks via canonicalization.
/// Empty or unresolvable paths return [`EMPTY_PATH_HASH`].
#[must_use]
pub fn path_hash(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        return EMPTY_PATH_HASH.to_string();
    }
    let canonical = match path.canonicalize() {
        Ok(c) => c,
        Err(_) => return EMPTY_PATH_HASH.to_string(),
    };
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(digest)[..PATH_HASH_LEN].to_string()
}

/// Immutable audit record written once per inheritance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InheritanceRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub child_session: String,
    pub path_hash: String,
    pub parent_file: PathBuf,
    /// SHA-256 of the parent file's exact bytes, for tamper and replay
    /// detection.
    pub parent_content_hash: String,
    pub inherited_iteration: u32,
    pub inherited_runtime_seconds: f64,
}

/// Loads and saves session state files under the state directory.
#[derive(Debug, Clone)]
pub struct SessionManager {
    state_dir: PathBuf,
    lock_timeout_ms: u64,
}

impl SessionManager {
    #[must_use]
    pub fn new(state_dir: impl AsRef<Path>, lock_timeout_ms: u64) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            lock_timeout_ms,
        }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join(SESSIONS_DIR)
    }

    /// Path of the state file for a session key.
    #[must_use]
    pub fn state_path(&self, session_id: &str, path_hash: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{session_id}@{path_hash}.json"))
    }

    fn audit_path(&self) -> PathBuf {
        self.state_dir.join(AUDIT_FILE)
    }

    /// Loads the state for the exact session key, inheriting from the
    /// most recent sibling state for the same project when the key has
    /// no file yet. Corrupt files degrade to a fresh state.
    pub fn load(&self, session_id: &str, path_hash: &str) -> Result<SessionState> {
        let path = self.state_path(session_id, path_hash);
        let _lock = store::lock_exclusive(&path, self.lock_timeout_ms)?;

        match store::read_json::<SessionState>(&path) {
            Ok(Some(state)) => return Ok(state),
            Ok(None) => {}
            Err(e) => {
                warn!("Session state unreadable, starting fresh: {}", e);
                return Ok(SessionState::new(session_id, path_hash));
            }
        }

        if let Some((parent_file, parent)) = self.latest_for_project(path_hash) {
            let state = SessionState::inherit_from(&parent, session_id);
            info!(
                "Inherited session state from {} (iteration {}, {:.0}s runtime)",
                parent_file.display(),
                state.iteration,
                state.runtime.active_seconds
            );
            if let Err(e) = self.append_audit(&state, &parent_file) {
                warn!("Failed to record inheritance audit entry: {}", e);
            }
            return Ok(state);
        }

        Ok(SessionState::new(session_id, path_hash))
    }

    /// Persists the state under its session key.
    pub fn save(&self, state: &SessionState) -> Result<()> {
        let path = self.state_path(&state.session_id, &state.path_hash);
        let _lock = store::lock_exclusive(&path, self.lock_timeout_ms)?;
        store::write_json_atomic(&path, state)
    }

    /// Finds the most recently modified state file for the same project.
    #[must_use]
    pub fn latest_for_project(&self, path_hash: &str) -> Option<(PathBuf, SessionState)> {
        let suffix = format!("@{path_hash}.json");
        let entries = fs::read_dir(self.sessions_dir()).ok()?;

        let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = path.file_name()?.to_string_lossy().into_owned();
            if !name.ends_with(&suffix) {
                continue;
            }
            let mtime = entry.metadata().and_then(|m| m.modified()).ok()?;
            if best.as_ref().is_none_or(|(t, _)| mtime > *t) {
                best = Some((mtime, path));
            }
        }

        let (_, path) = best?;
        match store::read_json::<SessionState>(&path) {
            Ok(Some(parent)) => Some((path, parent)),
            Ok(None) => None,
            Err(e) => {
                warn!("Skipping unreadable parent state {}: {}", path.display(), e);
                None
            }
        }
    }

    fn append_audit(&self, child: &SessionState, parent_file: &Path) -> Result<()> {
        let parent_bytes = fs::read(parent_file)?;
        let record = InheritanceRecord {
            id: Uuid::new_v4(),
            at: Utc::now(),
            child_session: child.session_id.clone(),
            path_hash: child.path_hash.clone(),
            parent_file: parent_file.to_path_buf(),
            parent_content_hash: hex::encode(Sha256::digest(&parent_bytes)),
            inherited_iteration: child.iteration,
            inherited_runtime_seconds: child.runtime.active_seconds,
        };
        store::append_jsonl(&self.audit_path(), &record)
    }
}
