use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use cfu_bench::config::{BenchConfig, ProtocolConfig};
use cfu_bench::dataset::{self, TestCase};
use cfu_bench::driver::{self, Evaluation};
use cfu_bench::telemetry::init_tracing;
use cfu_bench::transport::{self, SerialTransport};
use cfu_bench::{EditDistanceWer, Session};
use clap::Parser;

#[derive(Parser)]
#[command(name = "evaluate", about = "Wav2letter accuracy and latency evaluation over a labeled dataset")]
struct Cli {
    /// Serial port of the board, e.g. /dev/ttyUSB0
    #[arg(long)]
    port: Option<String>,

    /// Baud rate; must match the firmware's UART setting
    #[arg(long)]
    baud: Option<u32>,

    /// Label file: header row, then `filename,<unused>,transcript`
    #[arg(long, default_value = "y_labels.csv")]
    csv: PathBuf,

    /// Optional TOML file overriding serial and protocol settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not echo board output while inference runs
    #[arg(long)]
    quiet: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = BenchConfig::load(cli.config.as_deref(), ProtocolConfig::evaluation())
        .context("failed to load configuration")?;
    init_tracing(&config.logging.level);

    if cli.list_ports {
        for name in transport::list_ports().context("could not enumerate serial ports")? {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }
    if cli.quiet {
        config.protocol.echo_inference = false;
    }

    let cases = dataset::load_test_cases(&cli.csv)
        .with_context(|| format!("cannot load test cases from {}", cli.csv.display()))?;
    tracing::info!(count = cases.len(), csv = %cli.csv.display(), "loaded test cases");
    dataset::check_inputs_exist(&cases).context("input file missing")?;

    let transport = SerialTransport::open(&config.serial)?;
    let mut session = Session::new(transport, config.protocol.clone(), config.serial.timeout())
        .context("invalid protocol configuration")?;

    let summary = Evaluation::new(&mut session).run(&cases, |case: &TestCase| {
        dataset::read_payload(&case.input_path, None)
    });
    session.close();
    let summary = summary.context("could not bring the board into benchmark mode")?;

    println!();
    println!("{}", driver::render_report(&summary, &EditDistanceWer));
    Ok(ExitCode::SUCCESS)
}
