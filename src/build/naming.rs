//! Deterministic names for intermediate and generated files.
//!
//! Intermediate rasters are named after their source path: the extension is
//! dropped and every path segment is Pascal-cased and concatenated, so
//! `dir/sub/Leaf.png` becomes `DirSubLeaf.<ext>`. Two sources only share an
//! intermediate when those concatenated strings are identical.

use std::path::{Path, PathBuf};

/// Split an identifier into words on separators and lower-to-upper transitions.
fn words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_numeric();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `player idle_frame` -> `PlayerIdleFrame`
pub fn to_pascal_case(s: &str) -> String {
    words(s).iter().map(|w| capitalize(w)).collect()
}

/// `player Frames` -> `PLAYER_FRAMES`
pub fn to_screaming_snake_case(s: &str) -> String {
    words(s).iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join("_")
}

/// Stem of the intermediate file for a source path (no directory, no extension).
///
/// Both `/` and `\` are treated as segment separators so descriptors written
/// on either platform produce the same name.
pub fn intermediate_stem(source: &str) -> String {
    let without_ext = match Path::new(source).extension() {
        Some(ext) => &source[..source.len() - ext.len() - 1],
        None => source,
    };

    without_ext.split(['/', '\\']).filter(|s| !s.is_empty()).map(to_pascal_case).collect()
}

/// Join a descriptor source path onto `root`.
///
/// Descriptor paths are written with `/`; `\` is accepted as well.
pub fn resolve_source_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
}

/// Full path of the intermediate file for `source` inside `dir`.
pub fn intermediate_path(source: &str, dir: &Path, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", intermediate_stem(source), ext))
}
