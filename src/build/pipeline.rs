//! Per-group conversion pipeline.
//!
//! One run converts a single group:
//!
//! 1. Every source is decoded, quantized and written as an intermediate
//!    raster in the output directory. Sources are converted in parallel.
//! 2. The group's external compiler is run on the intermediates, in
//!    descriptor order, with the output directory as working directory.
//!    Only one compiler invocation runs at a time across all groups.
//! 3. Raw bitmap output is captured and given a companion header.
//! 4. Animation frame tables are written if the group declares any.
//!
//! Intermediates are removed on every exit path, including failures during
//! conversion.

use crate::build::context::BuildContext;
use crate::build::header::{
    animation_header, animation_header_filename, data_header, parse_declarations,
};
use crate::build::naming::{intermediate_path, intermediate_stem, to_pascal_case};
use crate::build::palette::IndexedImage;
use crate::build::source::{load_source_image, SourceError};
use crate::build::tool::{ExternalTool, ToolError, ToolInvocation, ToolOutput};
use crate::color::convert_image;
use crate::config::{AssetGroup, GroupMode};
use image::ImageFormat;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extensions the tile compiler may write for one base name.
const TILE_OUTPUT_EXTENSIONS: [&str; 3] = ["h", "c", "s"];

/// Error while converting a group.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// A source file could not be loaded
    #[error("{file}: {source}")]
    Source { file: String, source: SourceError },
    /// An intermediate raster could not be encoded
    #[error("failed to write {}: {source}", .path.display())]
    Encode { path: PathBuf, source: image::ImageError },
    /// The external compiler failed
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// Output file IO failed
    #[error("IO error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    /// Animation table could not be generated
    #[error("animation table: {0}")]
    Animation(String),
}

impl PipelineError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.to_path_buf(), source }
    }

    fn encode(path: &Path, source: image::ImageError) -> Self {
        PipelineError::Encode { path: path.to_path_buf(), source }
    }
}

/// What a successful group run produced.
#[derive(Debug, Clone, Default)]
pub struct GroupOutput {
    /// Generated files, in the order they were written
    pub outputs: Vec<PathBuf>,
    /// Non-fatal issues, such as accepted benign exit codes
    pub warnings: Vec<String>,
}

/// Deletes intermediate rasters when dropped.
struct Intermediates {
    paths: Vec<PathBuf>,
}

impl Intermediates {
    /// File names relative to the output directory, in descriptor order.
    fn file_names(&self) -> Vec<String> {
        self.paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }
}

impl Drop for Intermediates {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_if_exists(path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to remove intermediate");
            });
        }
    }
}

/// Converts one group.
pub struct GroupPipeline<'a> {
    context: &'a BuildContext,
    group: &'a AssetGroup,
}

impl<'a> GroupPipeline<'a> {
    /// Create a pipeline for `group`.
    pub fn new(context: &'a BuildContext, group: &'a AssetGroup) -> Self {
        Self { context, group }
    }

    /// Run every stage of the group.
    pub fn run(&self) -> Result<GroupOutput, PipelineError> {
        let out_dir = self.context.output_root();
        fs::create_dir_all(out_dir).map_err(|e| PipelineError::io(out_dir, e))?;

        let extension = self.group.mode.intermediate_extension();
        let intermediates = Intermediates {
            paths: self
                .group
                .source_files
                .iter()
                .map(|file| intermediate_path(file, out_dir, extension))
                .collect(),
        };

        if self.group.mode == GroupMode::TileCompile {
            self.remove_stale_tile_outputs()?;
        }

        // All tasks finish before this returns, even when one fails
        self.group
            .source_files
            .par_iter()
            .zip(intermediates.paths.par_iter())
            .try_for_each(|(file, path)| self.convert_source(file, path))?;

        let mut output = match self.group.mode {
            GroupMode::TileCompile => self.compile_tiles(&intermediates)?,
            GroupMode::RawBitmapCompile => self.compile_bitmaps(&intermediates)?,
        };
        drop(intermediates);

        if !self.group.animations.is_empty() {
            let text = animation_header(&self.group.name, &self.group.animations)
                .map_err(PipelineError::Animation)?;
            let path = out_dir.join(animation_header_filename(&self.group.name));
            fs::write(&path, text).map_err(|e| PipelineError::io(&path, e))?;
            output.outputs.push(path);
        }

        Ok(output)
    }

    /// Decode, quantize and write one intermediate raster.
    fn convert_source(&self, file: &str, intermediate: &Path) -> Result<(), PipelineError> {
        let source = self.context.source_path(file);
        let sheet = self.context.output_root().join(format!(
            "{}{}.sheet.png",
            to_pascal_case(&self.group.name),
            intermediate_stem(file)
        ));

        let image = load_source_image(&source, &sheet, self.context)
            .map_err(|source| PipelineError::Source { file: file.to_string(), source })?;
        let converted = convert_image(&image);

        match self.group.mode {
            GroupMode::TileCompile => converted
                .save_with_format(intermediate, ImageFormat::Png)
                .map_err(|source| PipelineError::encode(intermediate, source))?,
            GroupMode::RawBitmapCompile => {
                let indexed = IndexedImage::from_rgba(&converted);
                let file =
                    File::create(intermediate).map_err(|e| PipelineError::io(intermediate, e))?;
                let mut writer = BufWriter::new(file);
                indexed
                    .write_bmp(&mut writer)
                    .map_err(|source| PipelineError::encode(intermediate, source))?;
                writer.flush().map_err(|e| PipelineError::io(intermediate, e))?;
            }
        }

        debug!(
            group = %self.group.name,
            file,
            intermediate = %intermediate.display(),
            "converted source"
        );
        Ok(())
    }

    /// Base names whose header/source the tile compiler will write.
    fn tile_output_stems(&self) -> Vec<String> {
        let mut stems: Vec<String> =
            self.group.source_files.iter().map(|f| intermediate_stem(f)).collect();
        stems.extend(
            self.group
                .options
                .iter()
                .filter_map(|opt| opt.strip_prefix("-O"))
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        );
        stems
    }

    fn remove_stale_tile_outputs(&self) -> Result<(), PipelineError> {
        let out_dir = self.context.output_root();
        for stem in self.tile_output_stems() {
            for ext in TILE_OUTPUT_EXTENSIONS {
                let path = out_dir.join(format!("{}.{}", stem, ext));
                remove_if_exists(&path).map_err(|e| PipelineError::io(&path, e))?;
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        tool: ExternalTool,
        program: &Path,
        args: Vec<String>,
    ) -> Result<ToolOutput, ToolError> {
        ToolInvocation::new(tool, program)
            .with_args(args)
            .with_cwd(self.context.output_root())
            .with_timeout(self.context.tool_timeout())
            .run_exclusive()
    }

    /// Tile compiler: intermediates first, then options.
    fn compile_tiles(&self, intermediates: &Intermediates) -> Result<GroupOutput, PipelineError> {
        let mut args = intermediates.file_names();
        args.extend(self.group.options.iter().cloned());

        let result = self.invoke(ExternalTool::Grit, &self.context.tools().grit, args)?;

        let out_dir = self.context.output_root();
        let outputs = self
            .tile_output_stems()
            .iter()
            .flat_map(|stem| {
                TILE_OUTPUT_EXTENSIONS
                    .iter()
                    .map(move |ext| out_dir.join(format!("{}.{}", stem, ext)))
            })
            .filter(|p| p.exists())
            .collect();

        Ok(GroupOutput { outputs, warnings: benign_warnings(&result) })
    }

    /// Bitmap compiler: options first, then intermediates; stdout is the source file.
    fn compile_bitmaps(&self, intermediates: &Intermediates) -> Result<GroupOutput, PipelineError> {
        let mut args = self.group.options.clone();
        args.extend(intermediates.file_names());

        let result = self.invoke(ExternalTool::Bmp2Gba, &self.context.tools().bmp2gba, args)?;

        let source_text = result.stdout_text();
        let declarations = parse_declarations(&source_text);
        if declarations.is_empty() {
            warn!(group = %self.group.name, "bitmap compiler output contains no data arrays");
        }

        let out_dir = self.context.output_root();
        let c_path = out_dir.join(format!("{}.c", self.group.name));
        let h_path = out_dir.join(format!("{}.h", self.group.name));
        fs::write(&c_path, &result.stdout).map_err(|e| PipelineError::io(&c_path, e))?;
        fs::write(&h_path, data_header(&self.group.name, &declarations))
            .map_err(|e| PipelineError::io(&h_path, e))?;

        Ok(GroupOutput { outputs: vec![c_path, h_path], warnings: benign_warnings(&result) })
    }
}

fn benign_warnings(output: &ToolOutput) -> Vec<String> {
    output
        .benign_exit
        .iter()
        .map(|b| format!("accepted exit code {:#x} ({})", b.code, b.reason))
        .collect()
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
