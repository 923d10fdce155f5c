//! Stop-hook wire protocol.
//!
//! The host invokes the controller as a subprocess with one JSON object
//! on stdin and consumes exactly one JSON object from stdout. Three
//! output shapes exist: `{}` allows the stop, a block decision continues
//! with a prompt, and a hard stop overrides host retry logic.
//! Unparseable stdin produces the safest output (allow) rather than
//! silence, which the host would treat as an unhandled error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

/// Session key used when the host omits a session identifier.
pub const UNKNOWN_SESSION: &str = "unknown";

/// Parsed stop-hook request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HookInput {
    session_id: Option<String>,
    /// True when this invocation resulted from a prior continuation;
    /// guards against infinite hook recursion.
    pub stop_hook_active: bool,
    pub transcript_path: Option<PathBuf>,
    pub last_output: Option<String>,
}

impl HookInput {
    /// Parses the request; `None` means the input was unusable and the
    /// caller must emit an allow verdict.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(input) => Some(input),
            Err(e) => {
                warn!("Unparseable hook input: {}", e);
                None
            }
        }
    }

    /// Session identifier, defaulting to [`UNKNOWN_SESSION`].
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_SESSION)
    }

    /// Most recent agent output: the explicit field when present, else
    /// text recovered from the transcript tail. Unreadable transcripts
    /// yield an empty string.
    #[must_use]
    pub fn resolve_last_output(&self) -> String {
        if let Some(output) = &self.last_output {
            return output.clone();
        }
        self.transcript_path
            .as_deref()
            .and_then(transcript_tail)
            .unwrap_or_default()
    }
}

/// Pulls text content out of the last parseable transcript line.
fn transcript_tail(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    for line in contents.lines().rev() {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let mut fragments = Vec::new();
        collect_text(&value, &mut fragments);
        if !fragments.is_empty() {
            return Some(fragments.join("\n"));
        }
    }
    None
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if (key == "content" || key == "text") && inner.is_string() {
                    out.push(inner.as_str().unwrap_or_default().to_string());
                } else {
                    collect_text(inner, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        _ => {}
    }
}

/// One of the three verdict shapes written to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutput {
    /// `{}`: allow the stop.
    Allow,
    /// Continue with the given prompt text.
    Block { reason: String },
    /// Stop and override host-level retry logic.
    HardStop { stop_reason: String },
}

impl HookOutput {
    /// The wire representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            HookOutput::Allow => json!({}),
            HookOutput::Block { reason } => json!({
                "decision": "block",
                "reason": reason,
            }),
            HookOutput::HardStop { stop_reason } => json!({
                "continue": false,
                "stopReason": stop_reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_input() {
        let input = HookInput::parse(
            r#"{"session_id":"abc","stop_hook_active":true,"transcript_path":"/tmp/t.jsonl","last_output":"done"}"#,
        )
        .unwrap();
        assert_eq!(input.session_id(), "abc");
        assert!(input.stop_hook_active);
        assert_eq!(input.resolve_last_output(), "done");
    }

    #[test]
    fn test_parse_minimal_input() {
        let input = HookInput::parse("{}").unwrap();
        assert_eq!(input.session_id(), UNKNOWN_SESSION);
        assert!(!input.stop_hook_active);
        assert_eq!(input.resolve_last_output(), "");
    }

    #[test]
    fn test_empty_session_id_is_unknown() {
        let input = HookInput::parse(r#"{"session_id":""}"#).unwrap();
        assert_eq!(input.session_id(), UNKNOWN_SESSION);
    }

    #[test]
    fn test_unparseable_input_is_none() {
        assert!(HookInput::parse("not json").is_none());
        assert!(HookInput::parse("").is_none());
    }

    #[test]
    fn test_transcript_tail_fallback() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("t.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"role":"user","content":"please continue"}"#,
                "\n",
                r#"{"role":"assistant","message":{"content":[{"type":"text","text":"ran the tests, all green"}]}}"#,
                "\n",
            ),
        )
        .unwrap();

        let input = HookInput {
            transcript_path: Some(path),
            ..Default::default()
        };
        assert_eq!(input.resolve_last_output(), "ran the tests, all green");
    }

    #[test]
    fn test_missing_transcript_is_empty() {
        let input = HookInput {
            transcript_path: Some(PathBuf::from("/nope/t.jsonl")),
            ..Default::default()
        };
        assert_eq!(input.resolve_last_output(), "");
    }

    #[test]
    fn test_output_shapes() {
        assert_eq!(HookOutput::Allow.to_json().to_string(), "{}");

        let block = HookOutput::Block {
            reason: "keep going".into(),
        }
        .to_json();
        assert_eq!(block["decision"], "block");
        assert_eq!(block["reason"], "keep going");

        let hard = HookOutput::HardStop {
            stop_reason: "kill signal".into(),
        }
        .to_json();
        assert_eq!(hard["continue"], false);
        assert_eq!(hard["stopReason"], "kill signal");
    }
}
