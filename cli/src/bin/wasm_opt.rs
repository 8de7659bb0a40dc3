//! Applies the optimization pipeline to a module.

use anyhow::{anyhow, Result};
use clap::Parser;
use log::info;
use std::process;
use wasmith::WasmFile;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Optimize a WebAssembly module", long_about = None)]
struct Args {
    /// The module to optimize.
    #[clap(value_parser)]
    input: String,

    /// Where to write the optimized module; defaults to rewriting the
    /// input in place.
    #[clap(short, long, value_parser)]
    output: Option<String>,
}

fn run(args: Args) -> Result<()> {
    let mut file = WasmFile::from_file(&args.input)
        .map_err(|error| anyhow!("failed to read module {}: {}", args.input, error))?;
    let before = file.to_vec().map(|bytes| bytes.len()).unwrap_or(0);
    file.optimize();
    let output = args.output.as_deref().unwrap_or(&args.input);
    file.write_to_file(output)
        .map_err(|error| anyhow!("failed to write {}: {}", output, error))?;
    let after = file.to_vec().map(|bytes| bytes.len()).unwrap_or(0);
    info!("{}: {} bytes -> {} bytes", output, before, after);
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("error: {:#}", error);
        process::exit(1);
    }
}
