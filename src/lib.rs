//! gfxbuild - Incremental graphics asset build for GBA projects
//!
//! This library provides functionality to:
//! - Load a TOML descriptor listing groups of source images
//! - Quantize images to the platform's 15-bit color space
//! - Convert changed groups through the grit and bmp2gba compilers
//! - Generate C headers for raw bitmap data and animation frames

pub mod build;
pub mod cli;
pub mod color;
pub mod config;
