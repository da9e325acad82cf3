//! Staleness cache for incremental builds.
//!
//! The cache records the modification time of every file under the assets
//! root, plus the modification time of the build descriptor, as they were at
//! the end of the last successful build. A group is rebuilt when any of its
//! source files has a modification time the cache has not seen.
//!
//! # Cache Format
//!
//! The cache is stored as JSON in `.gfxbuild-cache.json` in the assets root:
//!
//! ```json
//! {
//!   "version": 1,
//!   "descriptor_modified": { "secs_since_epoch": 1700000000, "nanos_since_epoch": 0 },
//!   "modified": {
//!     "/project/assets/player/Idle.png": { "secs_since_epoch": 1700000000, "nanos_since_epoch": 0 }
//!   }
//! }
//! ```
//!
//! Loading never fails: an unreadable, corrupt or outdated cache file simply
//! yields an empty cache and therefore a full rebuild.

use crate::build::naming::resolve_source_path;
use crate::config::AssetGroup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Current cache format version.
const CACHE_VERSION: u32 = 1;

/// Cache filename inside the assets root.
pub const CACHE_FILENAME: &str = ".gfxbuild-cache.json";

/// Error while persisting the cache.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Snapshot of modification times from the last successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessCache {
    /// Cache format version
    version: u32,
    /// Modification time of the build descriptor
    #[serde(default)]
    descriptor_modified: Option<SystemTime>,
    /// Modification time of every file under the assets root
    #[serde(default)]
    modified: BTreeMap<PathBuf, SystemTime>,
}

impl Default for StalenessCache {
    fn default() -> Self {
        Self { version: CACHE_VERSION, descriptor_modified: None, modified: BTreeMap::new() }
    }
}

impl StalenessCache {
    /// Create an empty cache. Every group with existing sources is stale.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the cache file for an assets root.
    pub fn path_for(assets_root: &Path) -> PathBuf {
        assets_root.join(CACHE_FILENAME)
    }

    /// Load the cache for `assets_root`, applying the invalidation rules.
    ///
    /// The recorded file map is discarded when the descriptor's modification
    /// time differs from the recorded one, or when any recorded file can no
    /// longer be found on disk.
    pub fn load(assets_root: &Path, descriptor: &Path) -> Self {
        let path = Self::path_for(assets_root);
        let mut cache = match Self::read(&path) {
            Ok(Some(cache)) => cache,
            Ok(None) => {
                debug!(path = %path.display(), "no staleness cache, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable staleness cache");
                return Self::new();
            }
        };

        match modified_time(descriptor) {
            Some(current) if cache.descriptor_modified != Some(current) => {
                info!(
                    descriptor = %descriptor.display(),
                    "build descriptor changed, rebuilding every group"
                );
                cache.modified.clear();
            }
            Some(_) => {}
            None => debug!(descriptor = %descriptor.display(), "cannot stat build descriptor"),
        }

        if let Some(missing) = cache.modified.keys().find(|p| fs::metadata(p).is_err()) {
            info!(path = %missing.display(), "cached file disappeared, rebuilding every group");
            cache.modified.clear();
        }

        cache
    }

    fn read(path: &Path) -> Result<Option<Self>, String> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.to_string()),
        };

        let cache: StalenessCache =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| e.to_string())?;
        if cache.version != CACHE_VERSION {
            return Err(format!(
                "cache version mismatch: expected {}, found {}",
                CACHE_VERSION, cache.version
            ));
        }

        Ok(Some(cache))
    }

    /// Walk `assets_root` and record the current state of every file.
    ///
    /// Every regular file is recorded, not only those referenced by a group,
    /// so files added later are compared against a known baseline. Symbolic
    /// links are followed and recorded under their link path.
    pub fn snapshot(assets_root: &Path, descriptor: &Path) -> Self {
        let cache_path = Self::path_for(assets_root);
        let mut modified = BTreeMap::new();

        for entry in WalkDir::new(assets_root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry during snapshot");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.path() == cache_path {
                continue;
            }
            match entry.metadata().ok().and_then(|m| m.modified().ok()) {
                Some(time) => {
                    modified.insert(entry.into_path(), time);
                }
                None => debug!(path = %entry.path().display(), "cannot stat file during snapshot"),
            }
        }

        Self { version: CACHE_VERSION, descriptor_modified: modified_time(descriptor), modified }
    }

    /// Write the cache into `assets_root`, replacing any previous snapshot.
    pub fn save(&self, assets_root: &Path) -> Result<(), CacheError> {
        let file = File::create(Self::path_for(assets_root))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Whether any source file of `group` changed since the snapshot.
    ///
    /// Only positive evidence counts: a file that is missing or cannot be
    /// stat'ed never makes a group stale.
    pub fn is_group_stale(&self, group: &AssetGroup, assets_root: &Path) -> bool {
        group.source_files.iter().any(|file| {
            let path = resolve_source_path(assets_root, file);
            let Some(current) = modified_time(&path) else {
                debug!(group = %group.name, path = %path.display(), "cannot stat source");
                return false;
            };
            match self.modified.get(&path) {
                None => true,
                Some(recorded) => *recorded != current,
            }
        })
    }

    /// Number of recorded files.
    pub fn len(&self) -> usize {
        self.modified.len()
    }

    /// Whether no files are recorded.
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
    }

    /// Recorded modification time of `path`, if any.
    pub fn recorded(&self, path: &Path) -> Option<SystemTime> {
        self.modified.get(path).copied()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
