//! External tool locations
//!
//! Each converter can be overridden through an environment variable. Empty or
//! unset variables fall back to a bare command name resolved through `PATH`.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the tile compiler.
pub const GRIT_PATH_VAR: &str = "GRIT_PATH";
/// Environment variable overriding the raw bitmap compiler.
pub const BMP2GBA_PATH_VAR: &str = "BMP2GBA_PATH";
/// Environment variable overriding the vector-art exporter.
pub const ASEPRITE_PATH_VAR: &str = "ASEPRITE_PATH";

/// Resolved executable for each external converter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// Tile/palette compiler
    pub grit: PathBuf,
    /// Raw bitmap compiler
    pub bmp2gba: PathBuf,
    /// Vector-art exporter
    pub aseprite: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            grit: PathBuf::from("grit"),
            bmp2gba: PathBuf::from("bmp2gba.com"),
            aseprite: PathBuf::from("aseprite"),
        }
    }
}

impl ToolPaths {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, fallback: PathBuf| match lookup(key) {
            Some(value) if !value.trim().is_empty() => PathBuf::from(value),
            _ => fallback,
        };

        Self {
            grit: pick(GRIT_PATH_VAR, defaults.grit),
            bmp2gba: pick(BMP2GBA_PATH_VAR, defaults.bmp2gba),
            aseprite: pick(ASEPRITE_PATH_VAR, defaults.aseprite),
        }
    }
}
