use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::Display;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

use ls625_lib::command::format_value;
use ls625_lib::constants::{DEFAULT_BAUD_RATE, DEFAULT_PORT};
use ls625_lib::{Command, LS625, LsError, RawResponse, Reply, SerialConfig};
use ls625_rs::setup_logging;

/// Controller for the Lake Shore 625 superconducting magnet power supply.
///
/// Requested operations run in a fixed order over one serial connection
/// (7 data bits, odd parity, 1 stop bit).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port the supply is attached to.
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,
    /// Host side baud rate; must match the front-panel setting.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Send a command verbatim, print the reply and exit.
    #[arg(long, value_name = "COMMAND")]
    raw_command: Option<String>,

    /// Identification and baud rate (*IDN?, BAUD?).
    #[arg(long)]
    info: bool,
    /// Baud rate setting (BAUD?).
    #[arg(long)]
    get_baud: bool,
    /// Magnetic field in T (RDGF?).
    #[arg(long)]
    get_field: bool,
    /// Output current in A (RDGI?).
    #[arg(long)]
    get_current: bool,
    /// Output voltage in V (RDGV?).
    #[arg(long)]
    get_voltage: bool,
    /// Compliance voltage limit in V (SETV?).
    #[arg(long)]
    get_compliance_voltage: bool,
    /// Set the compliance voltage limit, 0.1 to 5.0 V (SETV).
    #[arg(long, value_name = "VOLTS", allow_negative_numbers = true)]
    set_compliance_voltage: Option<f64>,
    /// Set the target current in A (SETI).
    #[arg(long, value_name = "AMPS", allow_negative_numbers = true)]
    set_current: Option<f64>,
    /// Ramp rate in A/s (RATE?).
    #[arg(long)]
    get_rate: bool,
    /// Set the ramp rate in A/s (RATE).
    #[arg(long, value_name = "AMPS_PER_S", allow_negative_numbers = true)]
    set_rate: Option<f64>,
    /// Start ramping to the target current (RAMP).
    #[arg(long)]
    start_ramp: bool,
    /// Pause the ramp (STOP).
    #[arg(long)]
    stop_ramp: bool,
    /// Quench detection state and step limit (QNCH?).
    #[arg(long)]
    quench_status: bool,
    /// Enable quench detection (QNCH 1).
    #[arg(long)]
    enable_quench: bool,
    /// Disable quench detection (QNCH 0).
    #[arg(long)]
    disable_quench: bool,
    /// Enable quench detection with a step limit in A/s (QNCH 1,<limit>).
    #[arg(long, value_name = "AMPS_PER_S", allow_negative_numbers = true)]
    set_quench_step_limit: Option<f64>,
    /// Maximum current, voltage and rate limits (LIMIT?).
    #[arg(long)]
    get_max_limits: bool,
    /// Set max limits: current 0-60.1 A, voltage 0.1-5.0 V, rate 0.0001-99.999 A/s (LIMIT).
    #[arg(
        long,
        num_args = 3,
        value_names = ["CURRENT", "VOLTAGE", "RATE"],
        allow_negative_numbers = true
    )]
    set_max_limits: Option<Vec<f64>>,
    /// Hardware, operational and PSH error registers (ERSTR?).
    #[arg(long)]
    error_status: bool,

    /// Print results as one JSON object instead of text.
    #[arg(long)]
    json: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

/// Collects results either as operator text on stdout or as a JSON object.
struct Report {
    json: bool,
    results: Map<String, Value>,
}

impl Report {
    fn new(json: bool) -> Self {
        Self {
            json,
            results: Map::new(),
        }
    }

    fn command(&self, command: impl Display) {
        if !self.json {
            println!("Command: {command}");
        }
    }

    fn line(&self, text: impl Display) {
        if !self.json {
            println!("{text}");
        }
    }

    fn record(&mut self, key: &str, value: &impl Serialize) -> Result<()> {
        if self.json {
            let value = serde_json::to_value(value)
                .with_context(|| format!("Failed to serialize result for {key}"))?;
            self.results.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Setter acknowledgement. Only a non-empty reply is shown.
    fn acknowledge(&mut self, key: &str, message: String, response: RawResponse) -> Result<()> {
        self.line(message);
        if !response.is_empty() {
            self.line(format!("Response: {response}"));
        }
        self.record(key, &response)
    }

    /// A rejected operation is reported and the run moves on; a broken link is fatal.
    fn check<T>(&mut self, key: &str, result: Result<T, LsError>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if !e.is_transport() => {
                if self.json {
                    self.results
                        .insert(key.to_string(), serde_json::json!({ "error": e.to_string() }));
                } else {
                    println!("Error: {e}");
                }
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("{key} failed")),
        }
    }

    fn finish(self) -> Result<()> {
        if self.json {
            let text = serde_json::to_string_pretty(&Value::Object(self.results))
                .context("Failed to serialize results")?;
            println!("{text}");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    let config = SerialConfig::new(&cli.port).baud_rate(cli.baud);
    let mut device = match LS625::open(&config) {
        Ok(device) => device,
        Err(e) => {
            error!("Serial connection error: {e}");
            error!(
                "Make sure the Lake Shore 625 is connected to {} and the port is correct.",
                cli.port
            );
            process::exit(1);
        }
    };

    let mut report = Report::new(cli.json);
    let outcome = run(&cli, &mut device, &mut report);
    device.close();

    if let Err(e) = outcome {
        error!("{e:?}");
        process::exit(1);
    }
    report.finish()
}

fn run(cli: &Cli, device: &mut LS625, report: &mut Report) -> Result<()> {
    if let Some(raw) = &cli.raw_command {
        report.command(raw);
        if let Some(response) = report.check("raw_command", device.send_command(raw))? {
            report.line(format!("Response: {response}"));
            report.record("raw_command", &response)?;
        }
        return Ok(());
    }

    if cli.info {
        report.line("Device Information:");
        report.command(Command::Identify);
        let identification = device
            .get_identification()
            .context("Identification query failed")?;
        report.command(Command::BaudQuery);
        let baud = device.get_baud_rate().context("Baud rate query failed")?;
        report.line(format!("  ID: {identification}"));
        report.line(format!("  Baud Rate: {baud}"));
        report.line("");
        report.record("identification", &identification)?;
        report.record("baud_rate", &baud)?;
    }

    if cli.get_baud {
        report.command(Command::BaudQuery);
        let baud = device.get_baud_rate().context("Baud rate query failed")?;
        report.line(format!("Current baud rate: {baud}"));
        report.record("baud_rate", &baud)?;
    }

    if cli.get_field {
        report.command(Command::FieldQuery);
        let field = device.get_field().context("Field query failed")?;
        report.line(format!("Magnetic field: {field} T"));
        report.record("field", &field)?;
    }

    if cli.get_current {
        report.command(Command::CurrentQuery);
        let current = device.get_current().context("Current query failed")?;
        report.line(format!("Current: {current} A"));
        report.record("current", &current)?;
    }

    if cli.get_voltage {
        report.command(Command::VoltageQuery);
        let voltage = device.get_voltage().context("Voltage query failed")?;
        report.line(format!("Voltage: {voltage} V"));
        report.record("voltage", &voltage)?;
    }

    if cli.get_compliance_voltage {
        report.command(Command::ComplianceVoltageQuery);
        let voltage = device
            .get_compliance_voltage()
            .context("Compliance voltage query failed")?;
        report.line(format!("Compliance voltage limit: {voltage} V"));
        report.record("compliance_voltage", &voltage)?;
    }

    if let Some(volts) = cli.set_compliance_voltage {
        report.command(Command::SetComplianceVoltage(volts));
        let key = "set_compliance_voltage";
        if let Some(response) = report.check(key, device.set_compliance_voltage(volts))? {
            let message = format!("Set compliance voltage limit to {} V", format_value(volts));
            report.acknowledge(key, message, response)?;
        }
    }

    if let Some(amps) = cli.set_current {
        report.command(Command::SetCurrent(amps));
        if let Some(response) = report.check("set_current", device.set_current(amps))? {
            let message = format!("Set current to {} A", format_value(amps));
            report.acknowledge("set_current", message, response)?;
        }
    }

    if cli.get_rate {
        report.command(Command::RampRateQuery);
        let rate = device.get_ramp_rate().context("Ramp rate query failed")?;
        report.line(format!("Ramp rate: {rate} A/s"));
        report.record("ramp_rate", &rate)?;
    }

    if let Some(rate) = cli.set_rate {
        report.command(Command::SetRampRate(rate));
        if let Some(response) = report.check("set_rate", device.set_ramp_rate(rate))? {
            let message = format!("Set ramp rate to {} A/s", format_value(rate));
            report.acknowledge("set_rate", message, response)?;
        }
    }

    if cli.start_ramp {
        report.command(Command::StartRamp);
        let response = device.start_ramp().context("Start ramp failed")?;
        report.acknowledge("start_ramp", "Started current ramp".to_string(), response)?;
        report.line("Tip: run ramp_logger in a separate terminal to log ramp data");
    }

    if cli.stop_ramp {
        report.command(Command::StopRamp);
        let response = device.stop_ramp().context("Stop ramp failed")?;
        report.acknowledge("stop_ramp", "Stopped current ramp".to_string(), response)?;
    }

    if cli.quench_status {
        report.command(Command::QuenchQuery);
        let quench = device
            .get_quench_detect()
            .context("Quench status query failed")?;
        match &quench {
            Reply::Decoded(status) => {
                report.line(format!(
                    "Quench Detection: {}",
                    if status.enabled { "ON" } else { "OFF" }
                ));
                if let Some(limit) = status.step_limit {
                    report.line(format!("Step Limit: {limit} A/s"));
                }
            }
            other => report.line(format!("Quench detection: {other}")),
        }
        report.record("quench", &quench)?;
    }

    if cli.enable_quench {
        report.command(Command::SetQuenchDetect(true));
        let response = device
            .set_quench_detect(true)
            .context("Enable quench detection failed")?;
        let message = "Enabled quench detection".to_string();
        report.acknowledge("enable_quench", message, response)?;
    }

    if cli.disable_quench {
        report.command(Command::SetQuenchDetect(false));
        let response = device
            .set_quench_detect(false)
            .context("Disable quench detection failed")?;
        let message = "Disabled quench detection".to_string();
        report.acknowledge("disable_quench", message, response)?;
    }

    if let Some(limit) = cli.set_quench_step_limit {
        report.command(Command::SetQuenchStepLimit(limit));
        let key = "set_quench_step_limit";
        if let Some(response) = report.check(key, device.set_quench_step_limit(limit))? {
            let message = format!(
                "Enabled quench detection with step limit {} A/s",
                format_value(limit)
            );
            report.acknowledge(key, message, response)?;
        }
    }

    if cli.get_max_limits {
        report.command(Command::LimitsQuery);
        let limits = device.get_limits().context("Limits query failed")?;
        match &limits {
            Reply::Decoded(limits) => {
                report.line(format!("Current limit: {} A", limits.current));
                report.line(format!("Voltage limit: {} V", limits.voltage));
                report.line(format!("Rate limit: {} A/s", limits.rate));
            }
            Reply::Raw(text) => report.line(format!("Limits: {text}")),
            Reply::NoResponse => report.line("No response from device"),
        }
        report.record("limits", &limits)?;
    }

    if let Some(values) = &cli.set_max_limits {
        // clap enforces exactly three values
        if let [current, voltage, rate] = values[..] {
            report.command(Command::SetLimits {
                current,
                voltage,
                rate,
            });
            let key = "set_max_limits";
            if let Some(response) = report.check(key, device.set_limits(current, voltage, rate))? {
                let message = format!(
                    "Set limits to: Current={}A, Voltage={}V, Rate={}A/s",
                    format_value(current),
                    format_value(voltage),
                    format_value(rate)
                );
                report.acknowledge(key, message, response)?;
            }
        }
    }

    if cli.error_status {
        report.command(Command::ErrorStatusQuery);
        let status = device
            .get_error_status()
            .context("Error status query failed")?;
        match &status {
            Reply::Decoded(status) => report.line(status),
            other => report.line(format!("Error status: {other}")),
        }
        report.record("error_status", &status)?;
    }

    info!("Done");
    Ok(())
}
