//! `ovidc` — the CLI front end for `wccore`, spec.md §6 "CLI contract".
//!
//! This binary performs no parsing, type checking, or lowering itself: each
//! positional argument is a path to a JSON-serialized [`wccore::ast::Module`]
//! (the shape an external lexer/parser produces), which this binary only
//! reads, deserializes, and hands to [`wccore::compile`].

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use wccore::ast::Module;
use wccore::{CompileOptions, compile};

#[derive(Parser)]
#[command(name = "ovidc", about = "Ahead-of-time compiler to WebAssembly GC", version)]
struct Args {
    /// Paths to JSON-serialized parsed modules.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Writes the compiled binary module to this path instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Prints the compiled module as WAT (via `wasmprinter`) instead of
    /// writing the raw binary.
    #[arg(long)]
    emit_wat: bool,

    /// Marks the input as the built-in library itself (spec.md §6).
    #[arg(long)]
    is_built_in: bool,

    /// Rejects any member or binding whose resolved type is `any`.
    #[arg(long)]
    disable_any: bool,

    /// Rejects `interface` declarations entirely.
    #[arg(long)]
    disable_interface: bool,

    /// Skips linking the built-in snippets into the emitted module.
    #[arg(long)]
    disable_built_in: bool,

    /// Backend optimization level.
    #[arg(long, default_value_t = 0)]
    opt: u8,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let modules = match load_modules(&args.inputs) {
        Ok(modules) => modules,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let options = CompileOptions {
        is_built_in: args.is_built_in,
        disable_any: args.disable_any,
        disable_interface: args.disable_interface,
        disable_built_in: args.disable_built_in,
        opt: args.opt,
    };

    let compiled = match compile(&modules, &options) {
        Ok(compiled) => compiled,
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                eprintln!("{diagnostic}");
            }
            return ExitCode::FAILURE;
        }
    };

    if args.emit_wat {
        let text = match compiled.text() {
            Ok(text) => text,
            Err(err) => {
                eprintln!("error: failed to render WAT: {err}");
                return ExitCode::FAILURE;
            }
        };
        match args.output {
            Some(path) => {
                if let Err(err) = fs::write(&path, text) {
                    eprintln!("error: failed to write {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            }
            None => print!("{text}"),
        }
    } else {
        match args.output {
            Some(path) => {
                if let Err(err) = fs::write(&path, compiled.binary()) {
                    eprintln!("error: failed to write {}: {err}", path.display());
                    return ExitCode::FAILURE;
                }
            }
            None => {
                use std::io::Write;
                if let Err(err) = std::io::stdout().write_all(compiled.binary()) {
                    eprintln!("error: failed to write to stdout: {err}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

fn load_modules(paths: &[PathBuf]) -> Result<Vec<Module>, String> {
    paths
        .iter()
        .map(|path| {
            let text = fs::read_to_string(path).map_err(|err| format!("reading {}: {err}", path.display()))?;
            serde_json::from_str(&text).map_err(|err| format!("parsing {}: {err}", path.display()))
        })
        .collect()
}
