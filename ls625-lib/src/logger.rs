//! Periodic ramp logging.
//!
//! [`RampLogger`] samples ramp rate, current, voltage and field on a fixed interval
//! and appends each record to a per-day fixed-width text file as soon as it is read.
//! A reading that cannot be decoded is logged as absent; the rest of the record is
//! still captured.

use crate::constants::LOG_INTERVAL;
use crate::device::LS625;
use crate::error::LsError;
use crate::response::Reply;
use crate::transport::{SerialTransport, Transport};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Column headings and widths of the log file.
pub const COLUMNS: [(&str, usize); 8] = [
    ("Timestamp", 28),
    ("Date", 12),
    ("Time", 12),
    ("Elapsed_Seconds", 16),
    ("Ramp_Rate_A_per_s", 18),
    ("Current_A", 14),
    ("Voltage_V", 14),
    ("Field_T", 14),
];

const ABSENT: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Directory the daily log files are written to.
    pub output_dir: PathBuf,
    pub interval: Duration,
    /// Stop after this many records; `None` runs until interrupted.
    pub samples: Option<u32>,
    pub file_stem: String,
}

impl LoggerConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            interval: LOG_INTERVAL,
            samples: None,
            file_stem: "ramp_log".to_string(),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn samples(mut self, samples: Option<u32>) -> Self {
        self.samples = samples;
        self
    }
}

/// First unused name among `<date>_<stem>.csv`, `<date>_<stem>_1.csv`, `<date>_<stem>_2.csv`, ...
pub fn next_log_path(dir: &Path, date: NaiveDate, stem: &str) -> PathBuf {
    let date = date.format("%Y-%m-%d");
    let base = dir.join(format!("{date}_{stem}.csv"));
    if !base.exists() {
        return base;
    }
    (1u32..)
        .map(|counter| dir.join(format!("{date}_{stem}_{counter}.csv")))
        .find(|path| !path.exists())
        .unwrap_or(base)
}

/// One timestamped sample. Readings are `None` when the instrument stayed silent or
/// the reply could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub elapsed_secs: f64,
    pub ramp_rate: Option<f64>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub field: Option<f64>,
}

fn format_reading(value: Option<f64>) -> String {
    value.map_or_else(|| ABSENT.to_string(), |v| format!("{v:.4}"))
}

fn format_columns<S: AsRef<str>>(cells: &[S], pad_last: bool) -> String {
    let mut line = String::new();
    for (i, (cell, (_, width))) in cells.iter().zip(COLUMNS).enumerate() {
        let cell = cell.as_ref();
        if i == COLUMNS.len() - 1 && !pad_last {
            line.push_str(cell);
        } else {
            line.push_str(&format!("{cell:<width$.width$}"));
        }
    }
    line
}

/// The heading line. The terminal view pads the last column, the file does not.
pub fn format_header(pad_last: bool) -> String {
    let names: Vec<&str> = COLUMNS.iter().map(|(name, _)| *name).collect();
    format_columns(&names, pad_last)
}

/// Dashed rule as wide as the header.
pub fn format_separator() -> String {
    "-".repeat(COLUMNS.iter().map(|(_, width)| width).sum())
}

impl LogRecord {
    pub fn date(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }

    pub fn time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }

    fn cells(&self) -> [String; 8] {
        [
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            self.date(),
            self.time(),
            format!("{:.1}", self.elapsed_secs),
            format_reading(self.ramp_rate),
            format_reading(self.current),
            format_reading(self.voltage),
            format_reading(self.field),
        ]
    }

    pub fn format_row(&self, pad_last: bool) -> String {
        format_columns(&self.cells(), pad_last)
    }
}

/// Append-only log file. The header is written at creation and every record is
/// flushed as soon as it is appended.
pub struct LogFile {
    path: PathBuf,
    file: File,
    records: usize,
}

impl LogFile {
    /// Create the next free log file for `date` inside `dir`, creating `dir` if needed.
    pub fn create(dir: &Path, date: NaiveDate, stem: &str) -> Result<Self, LsError> {
        let wrap = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| LsError::Logger { path, source }
        };

        fs::create_dir_all(dir).map_err(wrap(dir))?;
        let path = next_log_path(dir, date, stem);
        let mut file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .map_err(wrap(&path))?;
        writeln!(file, "{}", format_header(false)).map_err(wrap(&path))?;
        file.flush().map_err(wrap(&path))?;

        info!(path = %path.display(), "Created ramp log");
        Ok(Self {
            path,
            file,
            records: 0,
        })
    }

    pub fn append(&mut self, record: &LogRecord) -> Result<(), LsError> {
        let line = format!("{}\n", record.format_row(false));
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| LsError::Logger {
                path: self.path.clone(),
                source,
            })?;
        self.records += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> usize {
        self.records
    }
}

/// Sender half of a [`StopSignal`]. Cheap to clone and safe to use from a signal handler.
#[derive(Clone)]
pub struct StopHandle {
    tx: flume::Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // The signal owns a sender too, so the channel is never disconnected
        let _ = self.tx.send(());
    }
}

/// Interrupt request for the polling loop, observed only between samples.
pub struct StopSignal {
    tx: flume::Sender<()>,
    rx: flume::Receiver<()>,
    stopped: AtomicBool,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            tx,
            rx,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn handle(&self) -> StopHandle {
        StopHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        if self.rx.try_recv().is_ok() {
            self.stopped.store(true, Ordering::SeqCst);
        }
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, returning early with `true` if a stop is requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        if self.rx.recv_timeout(timeout).is_ok() {
            self.stopped.store(true, Ordering::SeqCst);
        }
        self.stopped.load(Ordering::SeqCst)
    }
}

/// What a finished logging run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    pub path: PathBuf,
    pub records: usize,
    pub interrupted: bool,
}

pub struct RampLogger<T: Transport = SerialTransport> {
    device: LS625<T>,
    log: LogFile,
    config: LoggerConfig,
}

impl<T: Transport> RampLogger<T> {
    /// Create today's log file and take ownership of the connection.
    pub fn new(device: LS625<T>, config: LoggerConfig) -> Result<Self, LsError> {
        let log = LogFile::create(
            &config.output_dir,
            Local::now().date_naive(),
            &config.file_stem,
        )?;
        Ok(Self {
            device,
            log,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    fn limit_reached(&self) -> bool {
        self.config
            .samples
            .is_some_and(|limit| self.log.records() >= limit as usize)
    }

    /// Take one reading of every logged quantity.
    pub fn sample(&mut self, start: Instant) -> LogRecord {
        let timestamp = Local::now().naive_local();
        let elapsed_secs = start.elapsed().as_secs_f64();

        let ramp_rate = reading("ramp rate", self.device.get_ramp_rate());
        let current = reading("current", self.device.get_current());
        let voltage = reading("voltage", self.device.get_voltage());
        let field = reading("field", self.device.get_field());

        LogRecord {
            timestamp,
            elapsed_secs,
            ramp_rate,
            current,
            voltage,
            field,
        }
    }

    /// Sample until the configured count is reached or `stop` fires, echoing each row
    /// to `echo`. The connection is closed when this returns, whatever the outcome.
    pub fn run(&mut self, echo: &mut impl Write, stop: &StopSignal) -> Result<LogSummary, LsError> {
        let result = self.poll(echo, stop);
        self.device.close();
        info!(
            records = self.log.records(),
            path = %self.log.path().display(),
            "Ramp logging finished"
        );
        result
    }

    fn poll(&mut self, echo: &mut impl Write, stop: &StopSignal) -> Result<LogSummary, LsError> {
        let start = Instant::now();
        let mut interrupted = false;

        loop {
            if self.limit_reached() {
                break;
            }
            if stop.is_stopped() {
                interrupted = true;
                break;
            }

            let record = self.sample(start);
            if stop.is_stopped() {
                info!("Interrupted while sampling, discarding the incomplete interval");
                interrupted = true;
                break;
            }

            self.log.append(&record)?;
            writeln!(echo, "{}", record.format_row(true))
                .and_then(|()| echo.flush())
                .map_err(LsError::Echo)?;

            if self.limit_reached() {
                break;
            }
            let pause = next_slot(start, self.config.interval, Instant::now())
                .map_or(self.config.interval, |slot| {
                    slot.saturating_duration_since(Instant::now())
                });
            if stop.wait(pause) {
                interrupted = true;
                break;
            }
        }

        Ok(LogSummary {
            path: self.log.path().to_path_buf(),
            records: self.log.records(),
            interrupted,
        })
    }
}

/// Start of the first sampling slot after `now`. Slots sit on a fixed grid of
/// `interval` from `start`, so time spent talking to the instrument does not
/// stretch the period; a slot already missed is skipped.
pub fn next_slot(start: Instant, interval: Duration, now: Instant) -> Option<Instant> {
    if interval.is_zero() {
        return Some(now);
    }
    let slots = now.saturating_duration_since(start).as_nanos() / interval.as_nanos() + 1;
    let offset = u64::try_from(interval.as_nanos().checked_mul(slots)?).ok()?;
    start.checked_add(Duration::from_nanos(offset))
}

fn reading(name: &str, reply: Result<Reply<f64>, LsError>) -> Option<f64> {
    match reply {
        Ok(Reply::Decoded(value)) => Some(value),
        Ok(Reply::Raw(text)) => {
            warn!(reading = name, response = %text, "Could not decode reading");
            None
        }
        Ok(Reply::NoResponse) => {
            warn!(reading = name, "No response");
            None
        }
        Err(e) => {
            warn!(reading = name, error = %e, "Reading failed");
            None
        }
    }
}
