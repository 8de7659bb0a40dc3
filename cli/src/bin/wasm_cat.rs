//! Concatenates the sections of several modules into one.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::process;
use wasmith::WasmFile;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Concatenate WebAssembly modules", long_about = None)]
struct Args {
    /// The input module files, in order.
    #[clap(value_parser, required = true)]
    inputs: Vec<String>,

    /// Where to write the combined module.
    #[clap(short, long, value_parser, default_value = "out.wasm")]
    output: String,
}

fn run(args: Args) -> Result<()> {
    let mut files = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let file = WasmFile::from_file(input)
            .map_err(|error| anyhow!("failed to read module {}: {}", input, error))?;
        files.push(file);
    }
    let merged = WasmFile::merge(files);
    merged
        .write_to_file(&args.output)
        .map_err(|error| anyhow!("failed to write {}: {}", args.output, error))?;
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("error: {:#}", error);
        process::exit(1);
    }
}
