//! Incremental build orchestration.
//!
//! Groups whose sources are unchanged since the last snapshot are skipped.
//! The remaining groups run on a bounded pool of worker threads, and every
//! dispatched group runs to completion even after another one has failed.
//!
//! # How It Works
//!
//! 1. Partition groups into stale and up-to-date using the [`StalenessCache`]
//! 2. Run a [`GroupPipeline`] for each stale group on up to `jobs` workers
//! 3. Collect results in completion order through a channel sized to the
//!    number of stale groups, so no worker ever blocks on delivery
//! 4. Report the first failure received, after all workers have finished
//!
//! # Example
//!
//! ```ignore
//! use gfxbuild::build::{BuildContext, IncrementalBuild, StalenessCache};
//!
//! let cache = StalenessCache::load(&assets, &descriptor);
//! let outcome = IncrementalBuild::new(context).run(&build_file.graphics, &cache);
//! println!("{}", outcome.result.summary());
//! outcome.into_result()?;
//! ```

use crate::build::{
    BuildContext, BuildResult, GroupPipeline, GroupResult, PipelineError, StalenessCache,
};
use crate::config::AssetGroup;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Error from a build run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// A group's pipeline failed
    #[error("group '{group}' failed: {source}")]
    Group { group: String, source: PipelineError },
}

/// Everything a build run produced.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Per-group results
    pub result: BuildResult,
    /// First failure received while collecting results
    pub first_error: Option<BuildError>,
}

impl BuildOutcome {
    /// The result, or the first failure.
    pub fn into_result(self) -> Result<BuildResult, BuildError> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// Incremental build over a list of groups.
pub struct IncrementalBuild {
    /// Build context
    context: BuildContext,
}

impl IncrementalBuild {
    /// Create a new incremental build.
    pub fn new(context: BuildContext) -> Self {
        Self { context }
    }

    /// Split `groups` into (stale, up-to-date), preserving order.
    ///
    /// In force mode every group is stale.
    pub fn partition<'g>(
        &self,
        groups: &'g [AssetGroup],
        cache: &StalenessCache,
    ) -> (Vec<&'g AssetGroup>, Vec<&'g AssetGroup>) {
        if self.context.is_force() {
            return (groups.iter().collect(), Vec::new());
        }
        groups.iter().partition(|g| cache.is_group_stale(g, self.context.assets_root()))
    }

    /// Run the build.
    ///
    /// The cache is only read. Taking a new snapshot after a successful run
    /// is the caller's job.
    pub fn run(&self, groups: &[AssetGroup], cache: &StalenessCache) -> BuildOutcome {
        let start = Instant::now();
        let mut result = BuildResult::new();

        let (stale, fresh) = self.partition(groups, cache);
        for group in fresh {
            info!(group = %group.name, "skipping unchanged group");
            result.add_result(GroupResult::skipped(group.name.clone()));
        }

        let first_error = self.execute_groups(&stale, &mut result);

        result.total_duration = start.elapsed();
        info!(
            built = result.built_count(),
            skipped = result.skipped_count(),
            failed = result.failed_count(),
            duration = ?result.total_duration,
            "asset build finished"
        );

        BuildOutcome { result, first_error }
    }

    /// Run `stale` groups on the worker pool, recording every result.
    fn execute_groups(
        &self,
        stale: &[&AssetGroup],
        result: &mut BuildResult,
    ) -> Option<BuildError> {
        if stale.is_empty() {
            return None;
        }

        let (tx, rx) = mpsc::sync_channel(stale.len());
        let next_idx = AtomicUsize::new(0);
        let num_workers = self.context.jobs().min(stale.len());
        debug!(groups = stale.len(), workers = num_workers, "dispatching stale groups");

        let mut first_error = None;
        std::thread::scope(|s| {
            for _ in 0..num_workers {
                let tx = tx.clone();
                let next_idx = &next_idx;

                s.spawn(move || loop {
                    let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                    if idx >= stale.len() {
                        break;
                    }
                    let outcome = self.execute_group(stale[idx]);
                    // The receiver outlives every worker
                    let _ = tx.send(outcome);
                });
            }
            drop(tx);

            for (group_result, error) in rx {
                if let Some(source) = error {
                    if first_error.is_none() {
                        first_error =
                            Some(BuildError::Group { group: group_result.group.clone(), source });
                    }
                }
                result.add_result(group_result);
            }
        });

        first_error
    }

    fn execute_group(&self, group: &AssetGroup) -> (GroupResult, Option<PipelineError>) {
        let start = Instant::now();
        info!(
            group = %group.name,
            mode = %group.mode,
            files = group.source_files.len(),
            "building group"
        );

        match GroupPipeline::new(&self.context, group).run() {
            Ok(output) => {
                let duration = start.elapsed();
                info!(group = %group.name, duration = ?duration, "group built");
                let result = GroupResult::built(group.name.clone(), output.outputs, duration)
                    .with_warnings(output.warnings);
                (result, None)
            }
            Err(e) => {
                let duration = start.elapsed();
                warn!(group = %group.name, error = %e, "group failed");
                (GroupResult::failed(group.name.clone(), e.to_string(), duration), Some(e))
            }
        }
    }
}
