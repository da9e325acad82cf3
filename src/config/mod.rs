//! Configuration module for gfxbuild
//!
//! Provides the build descriptor schema, its loader, and the external tool
//! locations read from the environment.

pub mod loader;
pub mod schema;
pub mod tools;

pub use loader::{load_build_file, parse_build_file, ConfigError};
pub use schema::*;
pub use tools::ToolPaths;
