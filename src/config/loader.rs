//! Build descriptor loading and validation
//!
//! Reads the TOML descriptor, then checks every group before any conversion
//! work starts. All problems are collected and reported together.

use super::schema::{AssetGroup, BuildFile, GroupMode};
use crate::build::naming::intermediate_stem;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Descriptor loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read build file: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error (also covers unknown modes)
    #[error("Failed to parse build file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Build file validation failed:\n{}", bullet_list(.0))]
    Validation(Vec<String>),
}

fn bullet_list(errors: &[String]) -> String {
    errors.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n")
}

/// Load and validate the descriptor at `path`.
///
/// # Example
/// ```ignore
/// let build_file = load_build_file(Path::new("assets/build.toml"))?;
/// println!("{} groups", build_file.graphics.len());
/// ```
pub fn load_build_file(path: &Path) -> Result<BuildFile, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_build_file(&contents)
}

/// Parse and validate descriptor text.
pub fn parse_build_file(contents: &str) -> Result<BuildFile, ConfigError> {
    let build_file: BuildFile = toml::from_str(contents)?;

    let errors = validate(&build_file);
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }

    Ok(build_file)
}

/// Check every group, returning one message per problem found.
pub fn validate(build_file: &BuildFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (idx, group) in build_file.graphics.iter().enumerate() {
        if group.name.trim().is_empty() {
            errors.push(format!("graphics[{}]: name must not be empty", idx));
        } else if !seen.insert(group.name.as_str()) {
            errors.push(format!("graphics[{}]: duplicate group name '{}'", idx, group.name));
        }

        let prefix = label(idx, group);
        errors.extend(validate_group(group).into_iter().map(|e| format!("{}: {}", prefix, e)));
    }
    errors.extend(validate_intermediates(build_file));

    errors
}

/// Sources converted by groups of the same mode share the output directory,
/// so no two of them may map to the same intermediate name.
fn validate_intermediates(build_file: &BuildFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut claimed: HashMap<(GroupMode, String), (&str, &str)> = HashMap::new();

    for (idx, group) in build_file.graphics.iter().enumerate() {
        for file in &group.source_files {
            let stem = intermediate_stem(file);
            if stem.is_empty() {
                continue;
            }
            let name = format!("{}.{}", stem, group.mode.intermediate_extension());
            match claimed.entry((group.mode, stem)) {
                Entry::Occupied(entry) => {
                    let (other_group, other_file) = *entry.get();
                    errors.push(format!(
                        "{}: '{}' and '{}' (group '{}') both convert to '{}'",
                        label(idx, group),
                        file,
                        other_file,
                        other_group,
                        name
                    ));
                }
                Entry::Vacant(entry) => {
                    entry.insert((group.name.as_str(), file.as_str()));
                }
            }
        }
    }

    errors
}

fn validate_group(group: &AssetGroup) -> Vec<String> {
    let mut errors = Vec::new();

    if group.source_files.is_empty() {
        errors.push("files must list at least one source".to_string());
    }
    for file in &group.source_files {
        if file.trim().is_empty() {
            errors.push("files must not contain empty paths".to_string());
        }
    }

    for anim in &group.animations {
        if anim.header_file.trim().is_empty() {
            errors.push("animation 'for' must name a header".to_string());
        }
        if let Err(e) = anim.parsed_frame_size() {
            errors.push(e);
        }
    }

    errors
}

fn label(idx: usize, group: &AssetGroup) -> String {
    if group.name.is_empty() {
        format!("graphics[{}]", idx)
    } else {
        format!("graphics[{}] '{}'", idx, group.name)
    }
}
