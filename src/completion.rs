//! Multi-signal completion detection.
//!
//! Scans the target document for five independent signal types, each
//! carrying a configurable confidence weight. When several signals fire
//! the detector reports the single highest-confidence one, never an
//! average, so every completion decision is auditable to one cause.

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::config::ControllerConfig;
use crate::plan;

/// Explicit completion marker looked for verbatim in the document.
pub const COMPLETION_MARKER: &str = "- [x] ALL TASKS COMPLETE";

/// Result of a completion scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub is_complete: bool,
    pub reason: String,
    pub confidence: f64,
}

impl Completion {
    fn none(reason: &str) -> Self {
        Self {
            is_complete: false,
            reason: reason.to_string(),
            confidence: 0.0,
        }
    }
}

fn status_complete_re() -> Regex {
    Regex::new(r"(?im)^status:\s*(complete|completed|done)\s*$").expect("status regex is valid")
}

fn companion_re() -> Regex {
    Regex::new(r"(?im)^companion:\s*(\S+)\s*$").expect("companion regex is valid")
}

/// Scans `target` for completion evidence.
///
/// Missing or unreadable document yields `(false, "no file", 0.0)`,
/// never an error; the decision engine treats that as "not complete".
#[must_use]
pub fn detect(target: Option<&Path>, config: &ControllerConfig) -> Completion {
    let Some(path) = target else {
        return Completion::none("no file");
    };
    let Ok(contents) = fs::read_to_string(path) else {
        return Completion::none("no file");
    };

    let weights = &config.signal_weights;
    let mut signals: Vec<(f64, String)> = Vec::new();

    if contents.contains(COMPLETION_MARKER) {
        signals.push((weights.marker, "explicit completion marker".to_string()));
    }

    if status_complete_re().is_match(&contents) {
        signals.push((weights.metadata, "status metadata marks complete".to_string()));
    }

    if let Some(companion) = companion_status_complete(path, &contents) {
        signals.push((
            weights.companion,
            format!("companion document {companion} marks complete"),
        ));
    }

    let stats = plan::checklist_stats(&contents);
    if stats.all_checked() {
        signals.push((
            weights.checklist,
            format!("all {} checklist items checked", stats.total),
        ));
    }

    if let Some(phrase) = matched_phrase(&contents, &config.completion_phrases) {
        signals.push((weights.phrase, format!("completion phrase '{phrase}'")));
    }

    match signals
        .into_iter()
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
    {
        Some((confidence, reason)) => {
            debug!("Completion signal: {} ({:.2})", reason, confidence);
            Completion {
                is_complete: true,
                reason,
                confidence,
            }
        }
        None => Completion::none("no completion signals"),
    }
}

/// Resolves a `Companion: <path>` reference and checks its status
/// metadata. Unreadable companions are treated as not complete.
fn companion_status_complete(target: &Path, contents: &str) -> Option<String> {
    let caps = companion_re().captures(contents)?;
    let reference = caps[1].to_string();
    let resolved = if Path::new(&reference).is_absolute() {
        Path::new(&reference).to_path_buf()
    } else {
        target.parent().unwrap_or(Path::new(".")).join(&reference)
    };
    let companion_contents = fs::read_to_string(&resolved).ok()?;
    status_complete_re()
        .is_match(&companion_contents)
        .then_some(reference)
}

/// Word-boundary match against the configured phrase list.
///
/// Boundaries keep a phrase from firing inside a larger word, but a
/// phrase embedded in progress narration can still match; the phrase
/// list is the tuning surface, not the regex.
fn matched_phrase(contents: &str, phrases: &[String]) -> Option<String> {
    for phrase in phrases {
        if phrase.trim().is_empty() {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(phrase));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if re.is_match(contents) {
            return Some(phrase.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_target(temp: &TempDir, contents: &str) -> std::path::PathBuf {
        let path = temp.path().join("PLAN.md");
        fs::write(&path, contents).unwrap();
        path
    }

    fn config() -> ControllerConfig {
        ControllerConfig::default()
    }

    #[test]
    fn test_missing_file_is_no_file() {
        let result = detect(Some(Path::new("/nope/PLAN.md")), &config());
        assert!(!result.is_complete);
        assert_eq!(result.reason, "no file");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_no_target_is_no_file() {
        let result = detect(None, &config());
        assert_eq!(result.reason, "no file");
    }

    #[test]
    fn test_marker_signal() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "# Plan\n\n- [x] ALL TASKS COMPLETE\n");
        let result = detect(Some(&path), &config());
        assert!(result.is_complete);
        assert_eq!(result.confidence, 1.0);
        assert!(result.reason.contains("marker"));
    }

    #[test]
    fn test_metadata_signal() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "Status: complete\n\n# Plan\n");
        let result = detect(Some(&path), &config());
        assert!(result.is_complete);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_metadata_in_progress_does_not_fire() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "Status: in progress\n");
        let result = detect(Some(&path), &config());
        assert!(!result.is_complete);
    }

    #[test]
    fn test_companion_signal() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("RESULTS.md"), "Status: done\n").unwrap();
        let path = write_target(&temp, "Companion: RESULTS.md\n\n- [ ] more work\n");
        let result = detect(Some(&path), &config());
        assert!(result.is_complete);
        assert_eq!(result.confidence, 0.85);
        assert!(result.reason.contains("RESULTS.md"));
    }

    #[test]
    fn test_missing_companion_does_not_fire() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "Companion: GONE.md\n- [ ] open item\n");
        let result = detect(Some(&path), &config());
        assert!(!result.is_complete);
    }

    #[test]
    fn test_checklist_signal() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "- [x] first\n- [x] second\n- [X] third\n");
        let result = detect(Some(&path), &config());
        assert!(result.is_complete);
        assert_eq!(result.confidence, 0.8);
        assert!(result.reason.contains("3 checklist items"));
    }

    #[test]
    fn test_partial_checklist_does_not_fire() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "- [x] first\n- [ ] second\n");
        let result = detect(Some(&path), &config());
        assert!(!result.is_complete);
    }

    #[test]
    fn test_phrase_signal_word_boundary() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "Wrapping up: task complete.\n");
        let result = detect(Some(&path), &config());
        assert!(result.is_complete);
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_phrase_not_matched_inside_larger_word() {
        let temp = TempDir::new().unwrap();
        let path = write_target(&temp, "The subtask completes later.\n");
        let result = detect(Some(&path), &config());
        assert!(!result.is_complete);
    }

    #[test]
    fn test_highest_signal_wins_not_average() {
        let temp = TempDir::new().unwrap();
        let path = write_target(
            &temp,
            "Status: complete\n\n- [x] only item\n\nAll tasks complete.\n",
        );
        let result = detect(Some(&path), &config());
        // Metadata (0.9) beats checklist (0.8) and phrase (0.6).
        assert_eq!(result.confidence, 0.9);
        assert!(result.reason.contains("metadata"));
    }
}
