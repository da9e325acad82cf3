//! gfxbuild - Command-line tool for building GBA graphics assets before make

use std::process::ExitCode;

use gfxbuild::cli;

fn main() -> ExitCode {
    cli::run()
}
