//! Prints a human-readable rendering of a module.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::process;
use wasmith::WasmFile;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Dump a WebAssembly module as text", long_about = None)]
struct Args {
    /// The module to dump: `.wasm` binary or `.wat` text.
    #[clap(value_parser)]
    input: String,
}

fn load(path: &str) -> Result<WasmFile> {
    if path.ends_with(".wat") {
        let source =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        return wasmith::assemble_str(&source)
            .map_err(|error| anyhow!("failed to assemble {}: {}", path, error));
    }
    WasmFile::from_file(path).map_err(|error| anyhow!("failed to read module {}: {}", path, error))
}

fn run(args: Args) -> Result<()> {
    let file = load(&args.input)?;
    print!("{}", file);
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("error: {:#}", error);
        process::exit(1);
    }
}
