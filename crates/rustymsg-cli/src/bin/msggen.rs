//! Generator front-end: loads a schema and writes the C header and Rust
//! binding artifacts.

use clap::{value_parser, Arg, ArgMatches, Command};
use rustymsg_cli::{fail, fail_usage, init_logging};
use rustymsg_codegen::{CHeaderEmitter, RustBindingsEmitter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn command() -> Command {
    Command::new("msggen")
        .version(rustymsg::VERSION)
        .about("Generate C headers and Rust bindings from a message schema")
        .arg(
            Arg::new("schema")
                .long("schema")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Schema definition file (JSON tree)"),
        )
        .arg(
            Arg::new("emit-c")
                .long("emit-c")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Write <schema>.h into this directory"),
        )
        .arg(
            Arg::new("emit-runtime")
                .long("emit-runtime")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Write <schema>.rs runtime bindings into this directory"),
        )
        .arg(
            Arg::new("indent")
                .long("indent")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .default_value("4")
                .help("Spaces per indentation level in generated C"),
        )
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let schema_path: &PathBuf = matches
        .get_one("schema")
        .ok_or_else(|| anyhow::anyhow!("--schema is required"))?;
    let indent: usize = matches.get_one("indent").copied().unwrap_or(4);

    let (source, schema) = rustymsg_cli::load_schema_with_source(schema_path)?;
    let stem = schema_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("messages");

    let header = CHeaderEmitter::new(&schema, stem).with_indent(indent).emit();
    match matches.get_one::<PathBuf>("emit-c") {
        Some(dir) => {
            let path = write_artifact(dir, stem, "h", &header)?;
            log::info!("wrote C header {}", path.display());
        }
        None => {
            // Without a target directory the header goes to stdout.
            if matches.get_one::<PathBuf>("emit-runtime").is_none() {
                print!("{header}");
            }
        }
    }

    if let Some(dir) = matches.get_one::<PathBuf>("emit-runtime") {
        let module = RustBindingsEmitter::new(&schema, &source, stem).emit();
        let path = write_artifact(dir, stem, "rs", &module)?;
        log::info!("wrote Rust bindings {}", path.display());
    }
    Ok(())
}

fn write_artifact(dir: &Path, stem: &str, ext: &str, text: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stem}.{ext}"));
    std::fs::write(&path, text)?;
    Ok(path)
}

fn main() -> ExitCode {
    init_logging();
    let matches = match command().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => return fail_usage(&err),
    };
    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(&err),
    }
}
