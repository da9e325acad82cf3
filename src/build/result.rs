//! Build result types.
//!
//! Contains types for representing the outcome of a build run.

use std::path::PathBuf;
use std::time::Duration;

/// Status of a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStatus {
    /// Group was converted
    Built,
    /// Group skipped (no source changed)
    Skipped,
    /// Group failed with error
    Failed(String),
}

impl GroupStatus {
    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, GroupStatus::Failed(_))
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupStatus::Built => write!(f, "built"),
            GroupStatus::Skipped => write!(f, "skipped"),
            GroupStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of processing a single group.
#[derive(Debug, Clone)]
pub struct GroupResult {
    /// Group name
    pub group: String,
    /// Outcome
    pub status: GroupStatus,
    /// Files written to the output directory
    pub outputs: Vec<PathBuf>,
    /// Time spent on the group
    pub duration: Duration,
    /// Warning messages (if any)
    pub warnings: Vec<String>,
}

impl GroupResult {
    /// Create a built result.
    pub fn built(group: String, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { group, status: GroupStatus::Built, outputs, duration, warnings: vec![] }
    }

    /// Create a skipped result.
    pub fn skipped(group: String) -> Self {
        Self {
            group,
            status: GroupStatus::Skipped,
            outputs: vec![],
            duration: Duration::ZERO,
            warnings: vec![],
        }
    }

    /// Create a failed result.
    pub fn failed(group: String, error: String, duration: Duration) -> Self {
        Self {
            group,
            status: GroupStatus::Failed(error),
            outputs: vec![],
            duration,
            warnings: vec![],
        }
    }

    /// Add warnings to the result.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Result of a complete build run.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results in completion order; skipped groups first
    pub groups: Vec<GroupResult>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Create a new empty build result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group result.
    pub fn add_result(&mut self, result: GroupResult) {
        self.groups.push(result);
    }

    /// Get the number of built groups.
    pub fn built_count(&self) -> usize {
        self.groups.iter().filter(|r| matches!(r.status, GroupStatus::Built)).count()
    }

    /// Get the number of skipped groups.
    pub fn skipped_count(&self) -> usize {
        self.groups.iter().filter(|r| matches!(r.status, GroupStatus::Skipped)).count()
    }

    /// Get the number of failed groups.
    pub fn failed_count(&self) -> usize {
        self.groups.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Names of groups with the given status, sorted.
    pub fn names_with(&self, status: &GroupStatus) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.groups.iter().filter(|r| &r.status == status).map(|r| r.group.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get all warnings.
    pub fn all_warnings(&self) -> Vec<&String> {
        self.groups.iter().flat_map(|r| r.warnings.iter()).collect()
    }

    /// Get failed group results.
    pub fn failures(&self) -> Vec<&GroupResult> {
        self.groups.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let built = self.built_count();
        let skipped = self.skipped_count();
        let failed = self.failed_count();
        let total = self.groups.len();

        if failed > 0 {
            lines.push(format!(
                "Asset build failed: {} built, {} skipped, {} failed ({} total)",
                built, skipped, failed, total
            ));
            for group in self.failures() {
                lines.push(format!("  - {}: {}", group.group, group.status));
            }
        } else {
            lines.push(format!(
                "Asset build succeeded: {} built, {} skipped ({} total) in {:?}",
                built, skipped, total, self.total_duration
            ));
        }

        let warnings = self.all_warnings();
        if !warnings.is_empty() {
            lines.push(format!("Warnings ({}): ", warnings.len()));
            for warning in warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if warnings.len() > 5 {
                lines.push(format!("  ... and {} more", warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}
