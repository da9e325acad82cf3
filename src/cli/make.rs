//! Downstream `make` step

use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tracing::info;

/// Error from the make step.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MakeError {
    /// make could not be started
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: std::io::Error },
    /// Waiting on make failed
    #[error("failed to wait for make: {0}")]
    Wait(#[from] std::io::Error),
    /// make exited unsuccessfully
    #[error("make failed: {0}")]
    Failed(ExitStatus),
}

/// Run `program` in `dir` with `args`, streaming its output.
///
/// Some project makefiles prompt before overwriting, so `y` is written to
/// make's stdin.
pub fn run_make(program: &Path, dir: &Path, args: &[String]) -> Result<(), MakeError> {
    info!(dir = %dir.display(), args = ?args, "running make");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| MakeError::Spawn { program: program.display().to_string(), source })?;

    if let Some(mut stdin) = child.stdin.take() {
        // make may exit without reading its input
        let _ = stdin.write_all(b"y");
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(MakeError::Failed(status));
    }
    Ok(())
}
