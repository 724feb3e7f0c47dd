//! The `rlox` command-line driver: runs a script file, or starts an
//! interactive REPL when no file is given.

mod repl;

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser as ClapParser;
use rlox::prelude::*;

/// A bytecode compiler and virtual machine for a small Lox-family scripting language.
#[derive(ClapParser, Debug)]
#[command(name = "rlox", author, version, about)]
struct Cli {
    /// Path to a Lox script to run. If omitted, starts an interactive REPL.
    path: Option<PathBuf>,
}

fn main() {
    // `try_parse` instead of `parse`: clap's own default exits with status 2
    // on a usage error, but spec.md §6 reserves exit 64 for "anything else".
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            use clap::error::ErrorKind::*;
            let code = match err.kind() {
                DisplayHelp | DisplayVersion => exitcode::OK,
                _ => exitcode::USAGE,
            };
            std::process::exit(code);
        }
    };

    let exit_code = match cli.path {
        Some(path) => run_file(&path),
        None => {
            repl::run();
            exitcode::OK
        }
    };

    std::process::exit(exit_code);
}

/// Reads and interprets a single script file. Returns the process exit code
/// to use, per the conventions in `<sysexits.h>` (see the `exitcode` crate).
fn run_file(path: &Path) -> i32 {
    match run_file_inner(path) {
        Ok(()) => exitcode::OK,
        Err(InterpretationError::CompileError) => exitcode::DATAERR,
        Err(InterpretationError::RuntimeError) => exitcode::SOFTWARE,
        Err(InterpretationError::Io(err)) => {
            eprintln!("Could not read file '{}': {err}", path.display());
            exitcode::IOERR
        }
    }
}

/// Reads `path` fully and interprets it. The `?` on `fs::read_to_string`
/// relies on `InterpretationError`'s `#[from] std::io::Error` conversion.
fn run_file_inner(path: &Path) -> rlox::Result<()> {
    let source = fs::read_to_string(path)?;
    let mut vm = VM::new();
    vm.interpret(&source)
}
