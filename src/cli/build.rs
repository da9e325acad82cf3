//! Build command implementation

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

use super::make::run_make;
use super::{Cli, EXIT_ERROR, EXIT_MAKE_FAILED, EXIT_SUCCESS};
use crate::build::{BuildContext, IncrementalBuild, StalenessCache};
use crate::config::{load_build_file, ToolPaths};

/// Settings for one build invocation.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub out: PathBuf,
    pub build_file: PathBuf,
    pub assets: PathBuf,
    pub make_dir: PathBuf,
    pub make_args: Vec<String>,
    /// make executable
    pub make_program: PathBuf,
    pub tools: ToolPaths,
    pub force: bool,
    pub no_make: bool,
    pub jobs: Option<usize>,
    pub tool_timeout: Duration,
}

impl From<Cli> for BuildOptions {
    fn from(cli: Cli) -> Self {
        Self {
            out: cli.out,
            build_file: cli.build_file,
            assets: cli.assets,
            make_dir: cli.make_dir,
            make_args: cli.make_args,
            make_program: PathBuf::from("make"),
            tools: ToolPaths::from_env(),
            force: cli.force,
            no_make: cli.no_make,
            jobs: cli.jobs,
            tool_timeout: Duration::from_secs(cli.tool_timeout),
        }
    }
}

fn prepare_dirs(opts: &BuildOptions) -> Result<(PathBuf, PathBuf), String> {
    let assets = fs::canonicalize(&opts.assets)
        .map_err(|e| format!("assets directory {}: {}", opts.assets.display(), e))?;
    fs::create_dir_all(&opts.out)
        .map_err(|e| format!("cannot create output directory {}: {}", opts.out.display(), e))?;
    let out = fs::canonicalize(&opts.out)
        .map_err(|e| format!("output directory {}: {}", opts.out.display(), e))?;
    Ok((assets, out))
}

/// Run the build command
pub fn run_build(opts: &BuildOptions) -> ExitCode {
    ExitCode::from(execute_build(opts))
}

/// Run the asset build followed by make.
///
/// Returns 0 on success, 1 when the descriptor or any group fails and
/// 2 when make fails.
pub fn execute_build(opts: &BuildOptions) -> u8 {
    let (assets, out) = match prepare_dirs(opts) {
        Ok(dirs) => dirs,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    let build_file = match load_build_file(&opts.build_file) {
        Ok(build_file) => build_file,
        Err(e) => {
            eprintln!("Error in {}: {}", opts.build_file.display(), e);
            return EXIT_ERROR;
        }
    };

    let cache = StalenessCache::load(&assets, &opts.build_file);

    let mut context = BuildContext::new(&assets, &out)
        .with_tools(opts.tools.clone())
        .with_force(opts.force)
        .with_tool_timeout(opts.tool_timeout);
    if let Some(jobs) = opts.jobs {
        context = context.with_jobs(jobs);
    }

    let outcome = IncrementalBuild::new(context).run(&build_file.graphics, &cache);
    if let Some(err) = &outcome.first_error {
        eprintln!("{}", outcome.result.summary());
        eprintln!("Error: {}", err);
        return EXIT_ERROR;
    }
    println!("{}", outcome.result.summary());

    save_snapshot(&assets, &opts.build_file);

    if opts.no_make {
        return EXIT_SUCCESS;
    }
    match run_make(&opts.make_program, &opts.make_dir, &opts.make_args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_MAKE_FAILED
        }
    }
}

/// Persist a fresh snapshot; failure only costs a full rebuild next time.
fn save_snapshot(assets: &Path, descriptor: &Path) {
    let snapshot = StalenessCache::snapshot(assets, descriptor);
    match snapshot.save(assets) {
        Ok(()) => info!(files = snapshot.len(), "staleness cache saved"),
        Err(e) => warn!(error = %e, "failed to save staleness cache, next build is a full rebuild"),
    }
}
