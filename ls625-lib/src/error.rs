use std::io;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `ls625-lib` library.
///
/// A silent instrument is not an error: timeouts and empty replies surface as
/// [`Reply::NoResponse`](crate::response::Reply::NoResponse), and replies that do not
/// match the expected shape surface as [`Reply::Raw`](crate::response::Reply::Raw).
#[derive(Error, Debug)]
pub enum LsError {
    #[error("Serial port error: {0}. Is the Lake Shore 625 connected?")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial connection is closed")]
    NotConnected,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Command contains non-ASCII characters: {0:?}")]
    NonAscii(String),

    #[error("Failed to echo log output: {0}")]
    Echo(#[source] io::Error),

    #[error("Log file error at {path:?}: {source}")]
    Logger {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LsError {
    /// True for failures of the connection itself, as opposed to rejected input.
    pub fn is_transport(&self) -> bool {
        matches!(self, LsError::Serial(_) | LsError::Io(_) | LsError::NotConnected)
    }
}

/// Settable parameters that carry a legal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Parameter {
    #[strum(to_string = "compliance voltage")]
    ComplianceVoltage,
    #[strum(to_string = "current limit")]
    CurrentLimit,
    #[strum(to_string = "voltage limit")]
    VoltageLimit,
    #[strum(to_string = "rate limit")]
    RateLimit,
    #[strum(to_string = "output current")]
    Current,
    #[strum(to_string = "ramp rate")]
    RampRate,
    #[strum(to_string = "quench step limit")]
    QuenchStepLimit,
}

/// A caller-supplied value fell outside its legal range. Raised before any byte is written.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{parameter} must be between {} and {} {unit}, got {value}", .range.start(), .range.end())]
pub struct ValidationError {
    pub parameter: Parameter,
    pub value: f64,
    pub range: RangeInclusive<f64>,
    pub unit: &'static str,
}
