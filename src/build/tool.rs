//! External converter invocation.
//!
//! Every converter runs as a child process with its output captured and a
//! hard time limit. The tile and bitmap compilers share the output directory
//! as their working directory, so their invocations go through
//! [`ToolInvocation::run_exclusive`], which admits one invocation at a time
//! across the whole process.
//!
//! # Example
//!
//! ```ignore
//! use gfxbuild::build::{ExternalTool, ToolInvocation};
//!
//! let output = ToolInvocation::new(ExternalTool::Grit, "grit")
//!     .with_args(["Leaf.png", "-gB4"])
//!     .with_cwd("build/gfx")
//!     .run_exclusive()?;
//! ```

use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between checks on a running child process.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Held for the duration of every exclusive invocation.
static TOOL_LOCK: Mutex<()> = Mutex::new(());

/// A nonzero exit status known to be harmless for one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenignExit {
    /// Raw exit code as reported by the OS
    pub code: i32,
    /// What the code means
    pub reason: &'static str,
}

/// `grit` on Windows reports a heap corruption status while tearing down
/// after all outputs have been written.
const GRIT_BENIGN_EXITS: &[BenignExit] = &[BenignExit {
    code: 0xC000_0374u32 as i32,
    reason: "heap corruption reported during process teardown",
}];

/// The external converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalTool {
    /// Tile/palette compiler
    Grit,
    /// Raw bitmap compiler
    Bmp2Gba,
    /// Vector-art exporter
    Aseprite,
}

impl ExternalTool {
    /// Short name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            ExternalTool::Grit => "grit",
            ExternalTool::Bmp2Gba => "bmp2gba",
            ExternalTool::Aseprite => "aseprite",
        }
    }

    /// Nonzero exit codes treated as success for this tool.
    pub fn benign_exit_codes(self) -> &'static [BenignExit] {
        match self {
            ExternalTool::Grit => GRIT_BENIGN_EXITS,
            ExternalTool::Bmp2Gba | ExternalTool::Aseprite => &[],
        }
    }
}

impl fmt::Display for ExternalTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error while running an external tool.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// The process could not be started
    #[error("failed to start {tool} ({program}): {source}")]
    Spawn { tool: ExternalTool, program: String, source: std::io::Error },
    /// Waiting on the process failed
    #[error("failed to wait for {tool}: {source}")]
    Wait { tool: ExternalTool, source: std::io::Error },
    /// The process ran past its time limit and was killed
    #[error("{tool} did not finish within {timeout:?}")]
    Timeout { tool: ExternalTool, timeout: Duration },
    /// The process exited unsuccessfully
    #[error("{tool} failed ({}): {stderr}", describe_exit(.code))]
    Failed { tool: ExternalTool, code: Option<i32>, stderr: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {:#x}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Everything the tool wrote to stdout
    pub stdout: Vec<u8>,
    /// Everything the tool wrote to stderr
    pub stderr: Vec<u8>,
    /// Set when the tool exited with an allowlisted nonzero code
    pub benign_exit: Option<BenignExit>,
}

impl ToolOutput {
    /// Stdout decoded as UTF-8, replacing invalid sequences.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// One planned run of an external tool.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    tool: ExternalTool,
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    benign_exits: &'static [BenignExit],
}

impl ToolInvocation {
    /// Plan a run of `program` acting as `tool`.
    pub fn new(tool: ExternalTool, program: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: crate::build::DEFAULT_TOOL_TIMEOUT,
            benign_exits: tool.benign_exit_codes(),
        }
    }

    /// Append arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the tool's exit code allowlist.
    #[cfg(test)]
    pub(crate) fn with_benign_exits(mut self, exits: &'static [BenignExit]) -> Self {
        self.benign_exits = exits;
        self
    }

    /// Run while holding the process-wide tool lock.
    pub fn run_exclusive(&self) -> Result<ToolOutput, ToolError> {
        // A panic in another invocation leaves nothing to repair
        let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        self.run()
    }

    /// Run without taking the tool lock.
    pub fn run(&self) -> Result<ToolOutput, ToolError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        debug!(
            tool = %self.tool,
            program = %self.program.display(),
            args = ?self.args,
            "running external tool"
        );

        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            tool: self.tool,
            program: self.program.display().to_string(),
            source,
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        // On timeout the readers are left detached; grandchildren may still hold the pipes
        let status = self.wait_with_timeout(&mut child)?;
        let stdout = join_drain(stdout);
        let stderr = join_drain(stderr);

        if !stderr.is_empty() {
            debug!(
                tool = %self.tool,
                stderr = %String::from_utf8_lossy(&stderr).trim(),
                "external tool diagnostics"
            );
        }

        if status.success() {
            return Ok(ToolOutput { stdout, stderr, benign_exit: None });
        }

        let code = status.code();
        if let Some(benign) = code.and_then(|c| self.benign_exits.iter().find(|b| b.code == c)) {
            warn!(
                tool = %self.tool,
                code = benign.code,
                reason = benign.reason,
                "accepting benign exit code"
            );
            return Ok(ToolOutput { stdout, stderr, benign_exit: Some(*benign) });
        }

        Err(ToolError::Failed {
            tool: self.tool,
            code,
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        })
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, ToolError> {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if start.elapsed() >= self.timeout => {
                    // The child may exit between the check and the kill
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Timeout { tool: self.tool, timeout: self.timeout });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(ToolError::Wait { tool: self.tool, source }),
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
