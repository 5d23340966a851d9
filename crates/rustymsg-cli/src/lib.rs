//! Shared plumbing for the `msggen` and `slipsend` front-ends: logging
//! setup, schema loading and the exit-code contract.
//!
//! Exit codes: 0 on success, 1 on a schema error, 2 on an I/O or
//! transaction error, 3 on command-line misuse.

#![deny(missing_docs, rust_2024_incompatible_pat, unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, rust_2024_compatibility)]

use anyhow::Context as _;
use rustymsg::{Schema, SchemaError};
use rustyslip::TransactionError;
use std::path::Path;
use std::process::ExitCode;

/// Exit code for schema errors.
pub const EXIT_SCHEMA: u8 = 1;
/// Exit code for I/O and transaction errors.
pub const EXIT_IO: u8 = 2;
/// Exit code for command-line misuse.
pub const EXIT_USAGE: u8 = 3;

/// Initializes `env_logger` once per process.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .try_init();
}

/// Reads and loads a schema file.
pub fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    load_schema_with_source(path).map(|(_, schema)| schema)
}

/// Reads a schema file, returning both the raw text and the loaded model.
pub fn load_schema_with_source(path: &Path) -> anyhow::Result<(String, Schema)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema file {}", path.display()))?;
    let schema = Schema::from_json_str(&text)
        .with_context(|| format!("loading schema {}", path.display()))?;
    Ok((text, schema))
}

/// Maps an error chain onto the exit-code contract.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.is::<SchemaError>() {
            return EXIT_SCHEMA;
        }
        if cause.is::<TransactionError>() {
            return EXIT_IO;
        }
    }
    EXIT_IO
}

/// Prints the single-line error and resolves the exit code.
#[must_use]
pub fn fail(err: &anyhow::Error) -> ExitCode {
    eprintln!("error: {err:#}");
    ExitCode::from(exit_code_for(err))
}

/// Handles a clap parse error: help and version displays exit cleanly,
/// real usage errors exit with [`EXIT_USAGE`].
#[must_use]
pub fn fail_usage(err: &clap::Error) -> ExitCode {
    let _ = err.print();
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
            ExitCode::SUCCESS
        }
        _ => ExitCode::from(EXIT_USAGE),
    }
}
