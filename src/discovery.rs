//! Target document discovery and artifact change probing.
//!
//! The completion detector consumes a target path without caring where
//! it came from; discovery walks a fixed candidate list in priority
//! order. The artifact probe fingerprints version-controlled files so
//! the idle guard can tell a productive iteration from a spinning one.
//! Probe failures degrade to "no change information".

use std::path::{Path, PathBuf};
use std::process::Command;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Candidate document names, checked in order at the project root.
pub const TARGET_CANDIDATES: [&str; 4] = [
    "IMPLEMENTATION_PLAN.md",
    "ROADMAP.md",
    "PLAN.md",
    "TODO.md",
];

/// A discovered target document and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTarget {
    pub path: PathBuf,
    pub method: String,
}

/// Supplies the document scanned for completion evidence.
pub trait TargetDiscovery {
    fn discover(&self, project: &Path) -> Option<DiscoveredTarget>;
}

/// Default discovery: explicit override first, then the conventional
/// candidate names.
#[derive(Debug, Default)]
pub struct ConventionalDiscovery {
    /// Explicit target path, relative to the project root.
    pub explicit: Option<PathBuf>,
}

impl TargetDiscovery for ConventionalDiscovery {
    fn discover(&self, project: &Path) -> Option<DiscoveredTarget> {
        if let Some(explicit) = &self.explicit {
            let path = project.join(explicit);
            if path.exists() {
                return Some(DiscoveredTarget {
                    path,
                    method: "explicit".to_string(),
                });
            }
            debug!("Explicit target {} missing, falling back", path.display());
        }

        for name in TARGET_CANDIDATES {
            let path = project.join(name);
            if path.exists() {
                return Some(DiscoveredTarget {
                    path,
                    method: format!("conventional:{name}"),
                });
            }
        }
        None
    }
}

/// Fingerprints tracked artifacts; `None` means no information.
pub trait ArtifactProbe {
    fn fingerprint(&self, project: &Path) -> Option<String>;
}

/// Git-backed probe: hashes HEAD plus the porcelain status output, so
/// both commits and uncommitted edits change the fingerprint.
#[derive(Debug, Default)]
pub struct GitProbe;

impl ArtifactProbe for GitProbe {
    fn fingerprint(&self, project: &Path) -> Option<String> {
        let head = git_output(project, &["rev-parse", "HEAD"])?;
        let status = git_output(project, &["status", "--porcelain"])?;

        let mut hasher = Sha256::new();
        hasher.update(head.as_bytes());
        hasher.update(status.as_bytes());
        Some(hex::encode(hasher.finalize())[..16].to_string())
    }
}

fn git_output(project: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(project)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        debug!("git {:?} failed in {}", args, project.display());
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_conventional_order() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("TODO.md"), "- [ ] x").unwrap();
        fs::write(temp.path().join("ROADMAP.md"), "- [ ] y").unwrap();

        let found = ConventionalDiscovery::default()
            .discover(temp.path())
            .unwrap();
        assert_eq!(found.path, temp.path().join("ROADMAP.md"));
        assert_eq!(found.method, "conventional:ROADMAP.md");
    }

    #[test]
    fn test_explicit_beats_conventional() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("ROADMAP.md"), "- [ ] y").unwrap();
        fs::write(temp.path().join("docs.md"), "- [ ] z").unwrap();

        let discovery = ConventionalDiscovery {
            explicit: Some(PathBuf::from("docs.md")),
        };
        let found = discovery.discover(temp.path()).unwrap();
        assert_eq!(found.path, temp.path().join("docs.md"));
        assert_eq!(found.method, "explicit");
    }

    #[test]
    fn test_missing_explicit_falls_back() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("PLAN.md"), "- [ ] z").unwrap();

        let discovery = ConventionalDiscovery {
            explicit: Some(PathBuf::from("gone.md")),
        };
        let found = discovery.discover(temp.path()).unwrap();
        assert_eq!(found.method, "conventional:PLAN.md");
    }

    #[test]
    fn test_no_candidates_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(ConventionalDiscovery::default()
            .discover(temp.path())
            .is_none());
    }

    #[test]
    fn test_git_probe_outside_repo_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(GitProbe.fingerprint(temp.path()).is_none());
    }
}
