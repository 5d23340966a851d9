//! Transaction client front-end: builds a payload from raw `--pid/--data`
//! or a per-message subcommand, sends it over a SLIP interface and prints
//! every frame received up to the response.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rustymsg::{cli as msgcli, encode, MessageRegistry, Schema};
use rustymsg_cli::{fail, fail_usage, init_logging, EXIT_USAGE};
use rustyslip::{Transaction, Variant};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn command(schema: Option<&Schema>) -> Command {
    let mut cmd = Command::new("slipsend")
        .version(rustymsg::VERSION)
        .about("Send a framed message over a SLIP interface and print the reply")
        .arg(
            Arg::new("schema")
                .long("schema")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .required(true)
                .help("Schema definition file (JSON tree)"),
        )
        .arg(
            Arg::new("interface")
                .long("interface")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .required_unless_present("print-msg")
                .help("Byte-stream device to talk through"),
        )
        .arg(
            Arg::new("baudrate")
                .long("baudrate")
                .value_name("N")
                .value_parser(value_parser!(u32))
                .default_value("115200")
                .help("Serial baudrate; the line itself is configured externally"),
        )
        .arg(
            Arg::new("pid")
                .long("pid")
                .value_name("[0-127]")
                .value_parser(value_parser!(u8).range(0..=127))
                .default_value("0")
                .help("Primitive ID field for a raw payload"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .value_name("[0-255]")
                .value_parser(value_parser!(u8))
                .num_args(0..)
                .help("Raw payload bytes"),
        )
        .arg(
            Arg::new("print-msg")
                .long("print-msg")
                .value_name("NAME")
                .help("Display a message's field layout and exit"),
        )
        .arg(
            Arg::new("heavy")
                .long("heavy")
                .action(ArgAction::SetTrue)
                .help("Use the heavy payload layout (seq/len/crc16)"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .default_value("5000")
                .help("Transaction deadline in milliseconds"),
        );
    if let Some(schema) = schema {
        cmd = cmd.subcommands(msgcli::subcommands(schema));
    }
    cmd
}

/// Pulls the `--schema` value out of the raw argv so the per-message
/// subcommands can be registered before the real parse.
fn peek_schema_path() -> Option<PathBuf> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == "--schema" {
            return args.next().map(PathBuf::from);
        }
        if let Some(value) = arg.strip_prefix("--schema=") {
            return Some(PathBuf::from(value));
        }
    }
    None
}

fn build_payload(
    schema: &Schema,
    registry: &MessageRegistry,
    matches: &ArgMatches,
) -> anyhow::Result<(u8, Vec<u8>)> {
    if let Some((name, sub)) = matches.subcommand() {
        let msg = msgcli::message_from_matches(schema, name, sub)?;
        let id = registry
            .id_of(name)
            .ok_or_else(|| anyhow::anyhow!("`{name}` has no message id"))?;
        let data = encode(schema, &msg)?;
        println!("sending {name}:");
        print!("{msg}");
        Ok((id as u8, data))
    } else {
        let pid: u8 = matches.get_one("pid").copied().unwrap_or(0);
        let data: Vec<u8> = matches
            .get_many::<u8>("data")
            .map(|values| values.copied().collect())
            .unwrap_or_default();
        println!("sending raw payload pid=0x{pid:02X}, {} bytes", data.len());
        Ok((pid, data))
    }
}

async fn run(matches: &ArgMatches, schema: Schema) -> anyhow::Result<()> {
    if let Some(name) = matches.get_one::<String>("print-msg") {
        let helper = schema
            .helper(name)
            .ok_or_else(|| anyhow::anyhow!("no message named `{name}` in the schema"))?;
        print!("{helper}");
        return Ok(());
    }

    let registry = Arc::new(MessageRegistry::new(Arc::new(schema)));
    let (pid, data) = build_payload(registry.schema(), &registry, matches)?;

    let interface: &PathBuf = matches
        .get_one("interface")
        .ok_or_else(|| anyhow::anyhow!("--interface is required to send"))?;
    let baudrate: u32 = matches.get_one("baudrate").copied().unwrap_or(115_200);
    let variant = if matches.get_flag("heavy") {
        Variant::Heavy
    } else {
        Variant::Light
    };
    let timeout = Duration::from_millis(matches.get_one("timeout-ms").copied().unwrap_or(5000));

    // The port driver is external; the interface is used as a plain byte
    // stream and must already be configured for the requested baudrate.
    log::info!(
        "opening {} at {baudrate} baud ({variant:?} layout)",
        interface.display()
    );
    let port = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(interface)
        .await
        .map_err(|err| anyhow::anyhow!("opening {}: {err}", interface.display()))?;
    let (source, sink) = tokio::io::split(port);

    let mut endpoint = Transaction::new(source, sink, variant, registry);
    let outcome = endpoint.transact(pid, &data, timeout).await?;

    for frame in &outcome.intermediate {
        println!("received:");
        print!("{frame}");
    }
    println!("response:");
    print!("{}", outcome.response);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    // Two-phase parse: the subcommand set depends on the schema.
    let Some(schema_path) = peek_schema_path() else {
        // Without a schema the full parse cannot succeed; surface clap's
        // own diagnostics (including --help/--version).
        return match command(None).try_get_matches() {
            Ok(_) => ExitCode::from(EXIT_USAGE),
            Err(err) => fail_usage(&err),
        };
    };
    let schema = match rustymsg_cli::load_schema(&schema_path) {
        Ok(schema) => schema,
        Err(err) => return fail(&err),
    };

    let matches = match command(Some(&schema)).try_get_matches() {
        Ok(matches) => matches,
        Err(err) => return fail_usage(&err),
    };

    match run(&matches, schema).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err.downcast_ref::<rustymsg::CodecError>().is_some() {
                eprintln!("error: {err:#}");
                return ExitCode::from(EXIT_USAGE);
            }
            fail(&err)
        }
    }
}
