//! Instantiates a module and optionally invokes one of its exports.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::process;
use wasmith::{
    BaseRuntimeImporter, Error, ImportsBuilder, ModuleInstance, RuntimeValue, SpecTestImporter,
    WasmFile,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Run a WebAssembly module", long_about = None)]
struct Args {
    /// The module to run: `.wasm` binary, `.wat` text or a `.wast`
    /// script.
    #[clap(value_parser)]
    input: String,

    /// The exported function to call after instantiation.
    #[clap(value_parser)]
    func_name: Option<String>,

    /// Arguments for the called function. A trailing `l` makes an i64, a
    /// trailing `f` an f32; other arguments parse as i32/u32 when
    /// integral and f64 otherwise.
    #[clap(value_parser)]
    func_args: Vec<String>,

    /// The importer supplying the module's imports.
    #[clap(long, value_parser, default_value = "spectest")]
    importer: String,
}

/// `…l` suffix means i64, `…f` means f32; everything else parses as
/// i32/u32 when integral and f64 otherwise.
fn parse_arg(text: &str) -> Result<RuntimeValue> {
    if let Some(body) = text.strip_suffix('l') {
        let value: i64 = body
            .parse()
            .with_context(|| format!("`{}` is not an i64 literal", body))?;
        return Ok(RuntimeValue::I64(value));
    }
    if let Some(body) = text.strip_suffix('f') {
        let value: f32 = body
            .parse()
            .with_context(|| format!("`{}` is not an f32 literal", body))?;
        return Ok(RuntimeValue::F32(value.into()));
    }
    if let Ok(value) = text.parse::<i32>() {
        return Ok(RuntimeValue::I32(value));
    }
    if let Ok(value) = text.parse::<u32>() {
        return Ok(RuntimeValue::I32(value as i32));
    }
    let value: f64 = text
        .parse()
        .with_context(|| format!("`{}` is not a number", text))?;
    Ok(RuntimeValue::F64(value.into()))
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

fn print_result(result: Option<RuntimeValue>) {
    let rendered: Vec<String> = result.into_iter().map(|value| value.to_string()).collect();
    if !rendered.is_empty() {
        println!("{}", rendered.join(" "));
    }
}

fn run_with_importer<I>(
    file: &WasmFile,
    importer_name: &str,
    importer: &mut I,
    args: &Args,
) -> Result<()>
where
    I: wasmith::Externals + wasmith::ModuleImportResolver,
{
    let not_started = {
        let imports = ImportsBuilder::new().with_resolver(importer_name, &*importer);
        ModuleInstance::new(file, &imports)
            .map_err(|error| anyhow!("failed to instantiate module: {}", error))?
    };
    let instance = not_started
        .run_start(importer)
        .map_err(|trap| anyhow!("{}", Error::Trap(trap)))?;

    if let Some(func_name) = &args.func_name {
        let call_args: Vec<RuntimeValue> = args
            .func_args
            .iter()
            .map(|arg| parse_arg(arg))
            .collect::<Result<_>>()?;
        let result = instance
            .invoke_export(func_name, &call_args, importer)
            .map_err(|error| anyhow!("{}", error))?;
        print_result(result);
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    if args.input.ends_with(".wast") {
        let source = std::fs::read_to_string(&args.input)
            .with_context(|| format!("failed to read {}", args.input))?;
        let summary = wasmith::run_script(&source).map_err(|error| anyhow!("{}", error))?;
        println!(
            "{}: {} commands, {} assertions",
            args.input, summary.commands, summary.assertions
        );
        return Ok(());
    }

    let file = load(&args.input)?;
    match args.importer.as_str() {
        "spectest" => {
            let mut importer = SpecTestImporter::new();
            run_with_importer(&file, "spectest", &mut importer, &args)
        }
        "base-runtime" => {
            let mut importer = BaseRuntimeImporter::stdio();
            run_with_importer(&file, "runtime", &mut importer, &args)
        }
        other => bail!("unknown importer `{}`; use spectest or base-runtime", other),
    }
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("error: {:#}", error);
        process::exit(1);
    }
}
