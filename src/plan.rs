//! Roadmap document parsing.
//!
//! Extracts checkbox work items and checklist statistics from a markdown
//! plan. Parsed items are read-only to the rest of the controller: the
//! completion detector consumes the statistics, the prompt builder lists
//! the open items.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Priority of a parsed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Must be done now.
    P0,
    /// Should be done soon.
    P1,
    /// Nice to have.
    P2,
    /// Cannot proceed without external input.
    Blocked,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::P0 => write!(f, "P0"),
            Priority::P1 => write!(f, "P1"),
            Priority::P2 => write!(f, "P2"),
            Priority::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// One work item parsed from a roadmap document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Item text with any priority tag stripped.
    pub title: String,
    /// Parsed priority; defaults to P2 when untagged.
    pub priority: Priority,
    /// Document the item came from.
    pub source: String,
    /// Whether the checkbox was checked.
    pub completed: bool,
}

/// Checklist completion statistics for a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistStats {
    /// Total checkbox items found.
    pub total: usize,
    /// Items with a checked box.
    pub checked: usize,
}

impl ChecklistStats {
    /// Returns true if the checklist exists and every item is checked.
    #[must_use]
    pub fn all_checked(&self) -> bool {
        self.total > 0 && self.checked == self.total
    }
}

fn checkbox_regex() -> Regex {
    // "- [ ] text" / "* [x] text", tolerant of leading indentation.
    Regex::new(r"(?m)^\s*[-*]\s+\[([ xX])\]\s+(.+)$").expect("checkbox regex is valid")
}

/// Counts checklist items and how many are checked.
#[must_use]
pub fn checklist_stats(content: &str) -> ChecklistStats {
    let re = checkbox_regex();
    let mut stats = ChecklistStats::default();
    for caps in re.captures_iter(content) {
        stats.total += 1;
        if &caps[1] != " " {
            stats.checked += 1;
        }
    }
    stats
}

/// Parses checkbox lines into [`WorkItem`] records.
///
/// Priority is taken from a leading `P0:`/`[P1]`-style tag or a
/// `BLOCKED` marker anywhere in the item text; untagged items are P2.
#[must_use]
pub fn parse_work_items(content: &str, source: &str) -> Vec<WorkItem> {
    let re = checkbox_regex();
    let tag_re =
        Regex::new(r"^(?:\[?(P[012])\]?[:.]?\s+)").expect("priority tag regex is valid");

    re.captures_iter(content)
        .map(|caps| {
            let completed = &caps[1] != " ";
            let raw = caps[2].trim();

            let (priority, title) = if raw.to_ascii_uppercase().contains("BLOCKED") {
                (Priority::Blocked, raw.to_string())
            } else if let Some(tag) = tag_re.captures(raw) {
                let priority = match &tag[1] {
                    "P0" => Priority::P0,
                    "P1" => Priority::P1,
                    _ => Priority::P2,
                };
                (priority, raw[tag[0].len()..].to_string())
            } else {
                (Priority::P2, raw.to_string())
            };

            WorkItem {
                title,
                priority,
                source: source.to_string(),
                completed,
            }
        })
        .collect()
}

/// Returns the open (not completed, not blocked) items, P0 first.
#[must_use]
pub fn open_items(items: &[WorkItem]) -> Vec<&WorkItem> {
    let mut open: Vec<&WorkItem> = items
        .iter()
        .filter(|item| !item.completed && item.priority != Priority::Blocked)
        .collect();
    open.sort_by_key(|item| match item.priority {
        Priority::P0 => 0,
        Priority::P1 => 1,
        Priority::P2 => 2,
        Priority::Blocked => 3,
    });
    open
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r"
# Roadmap

## Sprint 3

- [x] P0: Wire up the session store
- [ ] P0: Handle lock timeouts
- [ ] [P1] Add inheritance audit log
- [ ] Tidy module docs
- [ ] BLOCKED waiting on upstream fix
- [X] Ship the config loader
";

    #[test]
    fn test_checklist_stats() {
        let stats = checklist_stats(PLAN);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.checked, 2);
        assert!(!stats.all_checked());
    }

    #[test]
    fn test_all_checked_requires_items() {
        assert!(!checklist_stats("no boxes here").all_checked());
        assert!(checklist_stats("- [x] only item").all_checked());
    }

    #[test]
    fn test_parse_priorities() {
        let items = parse_work_items(PLAN, "ROADMAP.md");
        assert_eq!(items.len(), 6);

        assert_eq!(items[0].priority, Priority::P0);
        assert!(items[0].completed);
        assert_eq!(items[0].title, "Wire up the session store");

        assert_eq!(items[2].priority, Priority::P1);
        assert_eq!(items[2].title, "Add inheritance audit log");

        assert_eq!(items[3].priority, Priority::P2);
        assert_eq!(items[4].priority, Priority::Blocked);
        assert_eq!(items[0].source, "ROADMAP.md");
    }

    #[test]
    fn test_open_items_sorted_and_filtered() {
        let items = parse_work_items(PLAN, "ROADMAP.md");
        let open = open_items(&items);
        assert_eq!(open.len(), 3);
        assert_eq!(open[0].priority, Priority::P0);
        assert_eq!(open[0].title, "Handle lock timeouts");
        assert_eq!(open[2].title, "Tidy module docs");
    }

    #[test]
    fn test_uppercase_x_counts_as_checked() {
        let stats = checklist_stats("- [X] done");
        assert_eq!(stats.checked, 1);
    }

    #[test]
    fn test_indented_checkboxes() {
        let stats = checklist_stats("  - [ ] nested item\n    * [x] deeper");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.checked, 1);
    }
}
