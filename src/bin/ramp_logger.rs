use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::{error, info};

use ls625_lib::constants::{DEFAULT_BAUD_RATE, DEFAULT_PORT};
use ls625_lib::logger::{format_header, format_separator};
use ls625_lib::{LS625, LoggerConfig, RampLogger, SerialConfig, StopSignal};
use ls625_rs::setup_logging;

/// Logs ramp rate, current, voltage and field of a Lake Shore 625 at a fixed interval.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port the supply is attached to.
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Directory the daily log files are written to.
    #[arg(short, long, default_value = "ramps")]
    output_dir: PathBuf,
    /// Seconds between samples.
    #[arg(short, long, default_value_t = 60)]
    interval_secs: u64,
    /// Stop after this many samples instead of running until Ctrl+C.
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    samples: Option<u32>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    if let Err(e) = run(cli) {
        error!("Ramp logging failed: {:?}", e);
        process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let stop = StopSignal::new();
    let handle = stop.handle();
    ctrlc::set_handler(move || handle.stop()).context("Failed to install Ctrl+C handler")?;

    let serial = SerialConfig::new(&cli.port).baud_rate(cli.baud);
    let device = LS625::open(&serial).with_context(|| {
        format!(
            "Make sure the Lake Shore 625 is connected to {} and the port is correct",
            cli.port
        )
    })?;

    let config = LoggerConfig::new(&cli.output_dir)
        .interval(Duration::from_secs(cli.interval_secs))
        .samples(cli.samples);
    let mut logger = RampLogger::new(device, config).context("Failed to create ramp log")?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "Starting Lake Shore 625 ramp data logging...")?;
    writeln!(stdout, "Recording interval: {} seconds", cli.interval_secs)?;
    writeln!(stdout, "Log file: {}", logger.path().display())?;
    writeln!(stdout, "Press Ctrl+C to stop recording")?;
    writeln!(stdout, "{}", "-".repeat(120))?;
    writeln!(stdout)?;
    writeln!(stdout, "{}", format_header(true))?;
    writeln!(stdout, "{}", format_separator())?;
    stdout.flush()?;

    let summary = logger.run(&mut stdout, &stop)?;

    if summary.interrupted {
        writeln!(stdout, "\n\nStopping ramp data logging.")?;
    }
    writeln!(stdout, "Total readings recorded: {}", summary.records)?;
    writeln!(stdout, "File location: {}", summary.path.display())?;
    info!(records = summary.records, "Ramp log saved");
    Ok(())
}
