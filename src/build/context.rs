//! Build context containing paths and settings for a build.

use crate::build::naming::resolve_source_path;
use crate::config::ToolPaths;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time limit for one external tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of parallel group workers (uses available parallelism).
fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// How long to wait for the exporter's output file to appear.
///
/// The exporter flushes its output asynchronously after exiting, so the file
/// is polled with exponential backoff until `timeout` elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExporterWait {
    /// First polling delay
    pub initial_delay: Duration,
    /// Upper bound for a single polling delay
    pub max_delay: Duration,
    /// Hard limit for the whole wait
    pub timeout: Duration,
}

impl Default for ExporterWait {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Build context containing paths and settings for a build operation.
///
/// The context is shared read-only by every worker of a build.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Root that group source paths are relative to
    assets_root: PathBuf,
    /// Directory receiving generated files; also the tools' working directory
    output_root: PathBuf,
    /// External tool executables
    tools: ToolPaths,
    /// Maximum number of groups converted at once
    jobs: usize,
    /// Time limit for each external tool invocation
    tool_timeout: Duration,
    /// Exporter output polling
    exporter_wait: ExporterWait,
    /// Rebuild every group regardless of the cache
    force: bool,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// # Arguments
    /// - `assets_root` - Directory the descriptor's source paths are relative to
    /// - `output_root` - Directory receiving generated headers, sources and intermediates
    pub fn new(assets_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            assets_root: assets_root.into(),
            output_root: output_root.into(),
            tools: ToolPaths::default(),
            jobs: default_jobs(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            exporter_wait: ExporterWait::default(),
            force: false,
        }
    }

    /// Get the assets root.
    pub fn assets_root(&self) -> &Path {
        &self.assets_root
    }

    /// Get the output root.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Get the external tool paths.
    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Number of parallel group workers.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Time limit for each external tool invocation.
    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// Exporter polling settings.
    pub fn exporter_wait(&self) -> ExporterWait {
        self.exporter_wait
    }

    /// Whether every group is rebuilt regardless of the cache.
    pub fn is_force(&self) -> bool {
        self.force
    }

    /// Set the external tool paths.
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Set the number of parallel group workers (at least one).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set the time limit for each external tool invocation.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set exporter polling.
    pub fn with_exporter_wait(mut self, wait: ExporterWait) -> Self {
        self.exporter_wait = wait;
        self
    }

    /// Set force mode.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Path of a descriptor source entry under the assets root.
    pub fn source_path(&self, relative: &str) -> PathBuf {
        resolve_source_path(&self.assets_root, relative)
    }
}
