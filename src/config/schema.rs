//! Build descriptor schema types
//!
//! Defines the structure of the descriptor file listing the graphics groups
//! to convert. Field names are lowercase; the capitalised spellings used by
//! older descriptors are accepted as aliases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversion pipeline used by a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupMode {
    /// Tile/palette compiler (`grit`), writes its own header/source pair
    #[serde(rename = "grit")]
    TileCompile,
    /// Raw bitmap compiler (`bmp2gba`), writes declarations to stdout
    #[serde(rename = "bmp2gba")]
    RawBitmapCompile,
}

impl GroupMode {
    /// Extension of the intermediate raster handed to the external tool.
    pub fn intermediate_extension(self) -> &'static str {
        match self {
            GroupMode::TileCompile => "png",
            GroupMode::RawBitmapCompile => "bmp",
        }
    }
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupMode::TileCompile => write!(f, "grit"),
            GroupMode::RawBitmapCompile => write!(f, "bmp2gba"),
        }
    }
}

/// Width and height of one animation cell, written `<w>x<h>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Number of tile units between consecutive frames.
    ///
    /// The platform addresses tiles in half-steps on both axes.
    pub fn stride(&self) -> u32 {
        (self.width / 2) * (self.height / 2)
    }
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("frame size '{}' must look like <width>x<height>", s))?;
        let width: u32 =
            w.trim().parse().map_err(|_| format!("invalid frame width '{}' in '{}'", w, s))?;
        let height: u32 =
            h.trim().parse().map_err(|_| format!("invalid frame height '{}' in '{}'", h, s))?;
        if width == 0 || height == 0 {
            return Err(format!("frame size '{}' must be non-zero", s));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame table generated for a previously compiled sprite sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationSpec {
    /// Generated header of the sheet the frames index into (e.g. `player.h`)
    #[serde(rename = "for", alias = "For")]
    pub header_file: String,
    /// Size of one frame, `<w>x<h>`
    #[serde(rename = "size", alias = "Size")]
    pub frame_size: String,
    /// Frame names in sheet order
    #[serde(rename = "frames", alias = "Frames", default)]
    pub frame_names: Vec<String>,
}

impl AnimationSpec {
    /// Parse `frame_size`. The loader validates this before any build starts.
    pub fn parsed_frame_size(&self) -> Result<FrameSize, String> {
        self.frame_size.parse()
    }

    /// Header file name without its extension, e.g. `player` for `player.h`.
    pub fn base_name(&self) -> &str {
        self.header_file.split('.').next().unwrap_or(&self.header_file)
    }
}

/// One group of source images converted together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    /// Group identifier, also the base name of generated outputs
    #[serde(alias = "Name")]
    pub name: String,
    /// Pipeline used to convert the group
    #[serde(alias = "Mode")]
    pub mode: GroupMode,
    /// Flags passed verbatim to the external tool
    #[serde(alias = "Options", default)]
    pub options: Vec<String>,
    /// Source paths relative to the assets root, in tool order
    #[serde(rename = "files", alias = "Files")]
    pub source_files: Vec<String>,
    /// Frame tables to generate after the tool has run
    #[serde(rename = "animes", alias = "Animes", default)]
    pub animations: Vec<AnimationSpec>,
}

impl AssetGroup {
    /// Create a group with no options or animations.
    pub fn new(name: impl Into<String>, mode: GroupMode, source_files: Vec<String>) -> Self {
        Self { name: name.into(), mode, options: vec![], source_files, animations: vec![] }
    }

    /// Set the tool options.
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Add an animation table.
    pub fn with_animation(mut self, animation: AnimationSpec) -> Self {
        self.animations.push(animation);
        self
    }
}

/// Root of the descriptor file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFile {
    /// Groups in declaration order
    #[serde(alias = "Graphics", default)]
    pub graphics: Vec<AssetGroup>,
}
