//! Command-line interface implementation
//!
//! Parses arguments, sets up logging and hands off to the build command.

mod build;
mod make;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub use build::{execute_build, run_build, BuildOptions};
pub use make::{run_make, MakeError};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_MAKE_FAILED: u8 = 2;

/// gfxbuild - Incremental graphics asset build for GBA projects
#[derive(Parser, Debug)]
#[command(name = "gfxbuild")]
#[command(about = "Convert changed graphics groups with grit/bmp2gba, then run make")]
#[command(version)]
pub struct Cli {
    /// Directory receiving generated headers and sources
    pub out: PathBuf,

    /// Build descriptor (TOML) listing the graphics groups
    pub build_file: PathBuf,

    /// Root directory the descriptor's file paths are relative to
    pub assets: PathBuf,

    /// Directory to run make in
    pub make_dir: PathBuf,

    /// Arguments passed through to make
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub make_args: Vec<String>,

    /// Rebuild every group, ignoring the staleness cache
    #[arg(long)]
    pub force: bool,

    /// Skip running make after the asset build
    #[arg(long)]
    pub no_make: bool,

    /// Number of groups converted in parallel (default: available cores)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Time limit in seconds for each external tool invocation
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub tool_timeout: u64,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info`, or `debug` when verbose.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Already installed when embedded in a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run_build(&BuildOptions::from(cli))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_positionals_and_make_args() {
        let cli = Cli::try_parse_from([
            "gfxbuild", "out", "build.toml", "assets", "game", "all", "-j4", "CONFIG=release",
        ])
        .unwrap();

        assert_eq!(cli.out, PathBuf::from("out"));
        assert_eq!(cli.build_file, PathBuf::from("build.toml"));
        assert_eq!(cli.assets, PathBuf::from("assets"));
        assert_eq!(cli.make_dir, PathBuf::from("game"));
        assert_eq!(cli.make_args, vec!["all", "-j4", "CONFIG=release"]);
        assert!(cli.jobs.is_none());
    }

    #[test]
    fn test_parse_options() {
        let cli = Cli::try_parse_from([
            "gfxbuild",
            "--force",
            "--no-make",
            "-j",
            "3",
            "--tool-timeout",
            "10",
            "-v",
            "out",
            "build.toml",
            "assets",
            "game",
        ])
        .unwrap();

        assert!(cli.force);
        assert!(cli.no_make);
        assert_eq!(cli.jobs, Some(3));
        assert_eq!(cli.tool_timeout, 10);
        assert!(cli.verbose);
        assert!(cli.make_args.is_empty());
    }

    #[test]
    fn test_missing_positionals_is_error() {
        assert!(Cli::try_parse_from(["gfxbuild", "out"]).is_err());
    }

    #[test]
    fn test_help_is_not_a_failure() {
        let err = Cli::try_parse_from(["gfxbuild", "-h"]).unwrap_err();
        assert_eq!(err.exit_code(), 0);
    }
}
