//! Incremental asset build for gfxbuild
//!
//! Converts groups of source images into platform data through external
//! compilers, rebuilding only the groups whose sources changed.
//!
//! # Overview
//!
//! The build consists of:
//! - **Staleness**: Compare source modification times against the last snapshot
//! - **Conversion**: Decode, quantize and hand each stale group to its compiler
//! - **Synthesis**: Generate headers for raw bitmap data and animation frames
//!
//! # Example
//!
//! ```ignore
//! use gfxbuild::build::{BuildContext, IncrementalBuild, StalenessCache};
//! use gfxbuild::config::load_build_file;
//!
//! let build_file = load_build_file(&descriptor)?;
//! let cache = StalenessCache::load(&assets, &descriptor);
//! let context = BuildContext::new(&assets, &out);
//!
//! let result = IncrementalBuild::new(context).run(&build_file.graphics, &cache).into_result()?;
//! StalenessCache::snapshot(&assets, &descriptor).save(&assets)?;
//! println!("Built {} groups", result.built_count());
//! ```

pub mod cache;
pub mod context;
pub mod header;
pub mod incremental;
pub mod naming;
pub mod palette;
pub mod pipeline;
pub mod result;
pub mod source;
pub mod tool;

pub use cache::*;
pub use context::*;
pub use incremental::*;
pub use pipeline::*;
pub use result::*;
pub use source::{load_source_image, SourceError, SourceKind};
pub use tool::{BenignExit, ExternalTool, ToolError, ToolInvocation, ToolOutput};
