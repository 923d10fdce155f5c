//! Custom error types for Vigil.
//!
//! Errors in the hook path are almost never surfaced to the host: the
//! decision engine absorbs them into safe defaults so a broken signal
//! degrades to "no opinion" instead of aborting the verdict.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Vigil operations
#[derive(Error, Debug)]
pub enum VigilError {
    /// Illegal lifecycle transition requested
    #[error("Illegal loop transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// Failed to acquire a state file lock within the timeout
    #[error("Lock timeout on {} after {timeout_ms}ms", path.display())]
    LockTimeout { path: PathBuf, timeout_ms: u64 },

    /// Persisted state could not be parsed
    #[error("Corrupt state file: {}", path.display())]
    CorruptState { path: PathBuf },

    /// Adapter call failed; the registry converts this into an abstention
    #[error("Adapter '{name}' failed: {message}")]
    Adapter { name: String, message: String },

    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl VigilError {
    /// Create an adapter error
    pub fn adapter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Type alias for Vigil results
pub type Result<T> = std::result::Result<T, VigilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VigilError::IllegalTransition {
            from: "stopped".into(),
            to: "draining".into(),
        };
        assert!(err.to_string().contains("stopped"));
        assert!(err.to_string().contains("draining"));

        let err = VigilError::LockTimeout {
            path: PathBuf::from("/tmp/x.lock"),
            timeout_ms: 3000,
        };
        assert!(err.to_string().contains("/tmp/x.lock"));
        assert!(err.to_string().contains("3000ms"));
    }

    #[test]
    fn test_adapter_helper() {
        let err = VigilError::adapter("mlflow", "boom");
        if let VigilError::Adapter { name, message } = err {
            assert_eq!(name, "mlflow");
            assert_eq!(message, "boom");
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: VigilError = io_err.into();
        assert!(matches!(err, VigilError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
