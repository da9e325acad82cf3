//! Source image decoding.
//!
//! Three source kinds are supported, selected by file extension:
//!
//! - `.png`: decoded directly
//! - `.psd`: the flattened composite of all visible layers
//! - `.aseprite`: exported to a PNG sheet by the external exporter, then decoded
//!
//! The exporter flushes its output after the process has exited, so the
//! sheet is polled with exponential backoff until it decodes or the
//! configured wait runs out.

use crate::build::context::{BuildContext, ExporterWait};
use crate::build::tool::{ExternalTool, ToolError, ToolInvocation};
use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Error while loading a source image.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SourceError {
    /// Extension is not one of the supported kinds
    #[error("unsupported source type '{extension}' for {}", .path.display())]
    UnsupportedExtension { path: PathBuf, extension: String },
    /// File could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
    /// Standard image decode failed
    #[error("failed to decode {}: {source}", .path.display())]
    Decode { path: PathBuf, source: image::ImageError },
    /// Layered image could not be parsed or flattened
    #[error("failed to decode PSD {}: {message}", .path.display())]
    Psd { path: PathBuf, message: String },
    /// Exporter process failed
    #[error("exporter failed: {0}")]
    Exporter(#[from] ToolError),
    /// Exporter exited but its sheet never became readable
    #[error("exporter produced no output at {} within {waited:?}", .path.display())]
    ExporterNoOutput { path: PathBuf, waited: Duration },
}

/// Kind of source file, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Pre-rasterized bitmap
    Png,
    /// Layered image
    Psd,
    /// Vector-art project, needs the exporter
    Aseprite,
}

impl SourceKind {
    /// Determine the kind of `path` (case-insensitive).
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let extension =
            path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase()).unwrap_or_default();
        match extension.as_str() {
            "png" => Ok(SourceKind::Png),
            "psd" => Ok(SourceKind::Psd),
            "aseprite" | "ase" => Ok(SourceKind::Aseprite),
            _ => Err(SourceError::UnsupportedExtension { path: path.to_path_buf(), extension }),
        }
    }
}

/// Decode `path` into an RGBA image.
///
/// `sheet_path` is where the exporter writes its sheet for `.aseprite`
/// sources; the sheet is removed again before returning.
pub fn load_source_image(
    path: &Path,
    sheet_path: &Path,
    context: &BuildContext,
) -> Result<RgbaImage, SourceError> {
    match SourceKind::from_path(path)? {
        SourceKind::Png => load_png(path),
        SourceKind::Psd => load_psd(path),
        SourceKind::Aseprite => load_aseprite(path, sheet_path, context),
    }
}

fn load_png(path: &Path) -> Result<RgbaImage, SourceError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| SourceError::Decode { path: path.to_path_buf(), source })
}

fn load_psd(path: &Path) -> Result<RgbaImage, SourceError> {
    let bytes =
        fs::read(path).map_err(|source| SourceError::Io { path: path.to_path_buf(), source })?;
    let psd = psd::Psd::from_bytes(&bytes)
        .map_err(|e| SourceError::Psd { path: path.to_path_buf(), message: e.to_string() })?;

    RgbaImage::from_raw(psd.width(), psd.height(), psd.rgba()).ok_or_else(|| SourceError::Psd {
        path: path.to_path_buf(),
        message: "composite size does not match header dimensions".to_string(),
    })
}

/// Removes the exporter sheet however loading ends.
struct SheetGuard<'a>(&'a Path);

impl Drop for SheetGuard<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.0);
    }
}

fn load_aseprite(
    path: &Path,
    sheet_path: &Path,
    context: &BuildContext,
) -> Result<RgbaImage, SourceError> {
    let _guard = SheetGuard(sheet_path);

    ToolInvocation::new(ExternalTool::Aseprite, &context.tools().aseprite)
        .with_args([
            path.display().to_string(),
            "--batch".to_string(),
            "--sheet".to_string(),
            sheet_path.display().to_string(),
        ])
        .with_timeout(context.tool_timeout())
        .run()?;

    wait_for_sheet(sheet_path, context.exporter_wait())
}

/// Poll until `path` decodes, backing off exponentially.
fn wait_for_sheet(path: &Path, wait: ExporterWait) -> Result<RgbaImage, SourceError> {
    let start = Instant::now();
    let mut delay = wait.initial_delay;

    loop {
        let last_error = match image::open(path) {
            Ok(img) => {
                debug!(path = %path.display(), waited = ?start.elapsed(), "exporter sheet ready");
                return Ok(img.to_rgba8());
            }
            Err(e) => e,
        };

        let elapsed = start.elapsed();
        if elapsed >= wait.timeout {
            // A sheet that exists but never decodes is a decode failure
            return Err(if path.exists() {
                SourceError::Decode { path: path.to_path_buf(), source: last_error }
            } else {
                SourceError::ExporterNoOutput { path: path.to_path_buf(), waited: elapsed }
            });
        }

        thread::sleep(delay.min(wait.timeout - elapsed));
        delay = (delay * 2).min(wait.max_delay);
    }
}
