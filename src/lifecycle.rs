//! Loop lifecycle state machine.
//!
//! The loop's process-wide state is a small enumerated machine persisted
//! per project: `Stopped -> Running -> Draining -> Stopped`. All access
//! goes through [`LifecycleStore`], which acquires a file lock for every
//! load/transition/save, replacing ad hoc marker-file checks with a
//! validated transition table.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VigilError};
use crate::store;

/// Lifecycle state of the automation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// No loop is active; stop attempts are allowed through.
    Stopped,
    /// Loop is active; stop attempts are intercepted.
    Running,
    /// Stop requested; in-flight work may finish, then the loop stops.
    Draining,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Stopped => write!(f, "stopped"),
            LoopState::Running => write!(f, "running"),
            LoopState::Draining => write!(f, "draining"),
        }
    }
}

impl LoopState {
    /// Returns true if `self -> to` is a legal transition.
    ///
    /// The table is closed: `Stopped -> Running`, `Running -> Draining`,
    /// `Draining -> Stopped`. Everything else is rejected.
    #[must_use]
    pub fn can_transition(self, to: LoopState) -> bool {
        matches!(
            (self, to),
            (LoopState::Stopped, LoopState::Running)
                | (LoopState::Running, LoopState::Draining)
                | (LoopState::Draining, LoopState::Stopped)
        )
    }
}

/// Persisted lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRecord {
    /// Current state.
    pub state: LoopState,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
    /// Schema version.
    pub version: u32,
}

impl LifecycleRecord {
    const CURRENT_VERSION: u32 = 1;

    fn new(state: LoopState) -> Self {
        Self {
            state,
            updated_at: Utc::now(),
            version: Self::CURRENT_VERSION,
        }
    }
}

/// Lock-guarded accessor for the per-project lifecycle file and the
/// kill-signal marker.
#[derive(Debug, Clone)]
pub struct LifecycleStore {
    state_dir: PathBuf,
    path_hash: String,
    lock_timeout_ms: u64,
}

impl LifecycleStore {
    /// Creates a store scoped to one project's path hash.
    #[must_use]
    pub fn new(state_dir: impl AsRef<Path>, path_hash: &str, lock_timeout_ms: u64) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
            path_hash: path_hash.to_string(),
            lock_timeout_ms,
        }
    }

    /// Path of the lifecycle state file.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(format!("loop-{}.json", self.path_hash))
    }

    /// Path of the kill-signal marker file.
    #[must_use]
    pub fn kill_path(&self) -> PathBuf {
        self.state_dir.join(format!("kill-{}", self.path_hash))
    }

    /// Loads the current state.
    ///
    /// Missing file, corrupt file, and lock timeout all degrade to
    /// `Stopped` - the safe default that lets the host stop.
    #[must_use]
    pub fn load(&self) -> LoopState {
        let path = self.state_path();
        let _lock = match store::lock_exclusive(&path, self.lock_timeout_ms) {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Lifecycle lock unavailable, assuming stopped: {}", e);
                return LoopState::Stopped;
            }
        };
        match store::read_json::<LifecycleRecord>(&path) {
            Ok(Some(record)) => record.state,
            Ok(None) => LoopState::Stopped,
            Err(e) => {
                warn!("Lifecycle state unreadable, assuming stopped: {}", e);
                LoopState::Stopped
            }
        }
    }

    /// Applies a transition under the file lock.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::IllegalTransition`] when the requested
    /// transition is not in the table; the persisted state is unchanged.
    pub fn transition(&self, to: LoopState) -> Result<LoopState> {
        let path = self.state_path();
        let _lock = store::lock_exclusive(&path, self.lock_timeout_ms)?;

        let from = match store::read_json::<LifecycleRecord>(&path) {
            Ok(Some(record)) => record.state,
            Ok(None) => LoopState::Stopped,
            Err(_) => LoopState::Stopped,
        };

        if from == to {
            return Ok(to);
        }
        if !from.can_transition(to) {
            warn!("Rejected lifecycle transition {} -> {}", from, to);
            return Err(VigilError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        store::write_json_atomic(&path, &LifecycleRecord::new(to))?;
        info!("Lifecycle transition {} -> {}", from, to);
        Ok(to)
    }

    /// Forces the state to `Stopped` regardless of the current state.
    ///
    /// Used when draining completes; `Draining -> Stopped` is legal, and
    /// forcing from `Stopped` is a no-op, so this cannot violate the table.
    pub fn force_stopped(&self) -> Result<()> {
        let path = self.state_path();
        let _lock = store::lock_exclusive(&path, self.lock_timeout_ms)?;
        store::write_json_atomic(&path, &LifecycleRecord::new(LoopState::Stopped))?;
        Ok(())
    }

    /// Writes the kill-signal marker checked by the next hook invocation.
    pub fn raise_kill_signal(&self) -> Result<()> {
        fs::create_dir_all(&self.state_dir)?;
        fs::write(self.kill_path(), Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// Checks for a kill signal and consumes it so it cannot re-trigger.
    #[must_use]
    pub fn consume_kill_signal(&self) -> bool {
        let path = self.kill_path();
        if !path.exists() {
            return false;
        }
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to consume kill signal {}: {}", path.display(), e);
        }
        true
    }
}
