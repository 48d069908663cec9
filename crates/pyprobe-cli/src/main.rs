use std::path::PathBuf;

use clap::{ArgAction, Parser};
use color_eyre::Result;
use pyprobe_core::{ParseRequest, SetupMetadata, OUTPUT_DELIMITER};

#[derive(Parser, Debug)]
#[command(
    name = "pyprobe",
    version,
    about = "Extract the arguments a setup.py passes to setup() by running it",
    after_help = "Examples:\n  pyprobe ./pkg/setup.py\n  pyprobe --trusted --mockimports ./pkg/setup.py\n  PYPROBE_SANDBOX_IMAGE=registry.local/probe:py312 pyprobe ./pkg/setup.py"
)]
struct PyprobeCli {
    #[arg(value_name = "FILENAME", help = "Path to the setup.py file to parse")]
    filename: PathBuf,

    #[arg(
        long,
        help = "Run the script directly on this host instead of inside a container (only for scripts you already trust)"
    )]
    trusted: bool,

    #[arg(
        long = "mockimports",
        help = "Substitute inert stub modules for imports that fail and retry once"
    )]
    mockimports: bool,

    #[arg(
        long = "printdelimiter",
        help = "Emit captured script output and the output delimiter before the JSON document; the envelope form the sandbox layer consumes"
    )]
    printdelimiter: bool,

    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity (-v debug, -vv trace)")]
    verbose: u8,

    #[arg(short, long, help = "Only warnings and errors on stderr")]
    quiet: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PyprobeCli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let request = ParseRequest {
        filename: cli.filename.clone(),
        trusted: cli.trusted,
        mock_imports: cli.mockimports,
    };
    let metadata = pyprobe_core::parse_setup(&request)?;
    emit_output(&cli, &metadata)?;
    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("pyprobe={level},pyprobe_core={level}"));
    // stdout carries the result; all logging goes to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &PyprobeCli, metadata: &SetupMetadata) -> Result<()> {
    if cli.printdelimiter {
        if let Some(diagnostics) = metadata.diagnostics() {
            print!("{diagnostics}");
        }
        println!("{OUTPUT_DELIMITER}");
        println!("{}", serde_json::to_string_pretty(&metadata.args_value())?);
    } else {
        println!("{}", serde_json::to_string_pretty(&metadata.to_value())?);
    }
    Ok(())
}
