use crate::constants::TERMINATOR;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// One request understood by the Lake Shore 625.
///
/// A `Command` is immutable once built. [`Command::encode`] produces the ASCII text
/// and [`Command::to_bytes`] the exact bytes put on the wire, terminator included.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `*IDN?`
    Identify,
    /// `BAUD?`
    BaudQuery,
    /// `RDGF?`
    FieldQuery,
    /// `RDGI?`
    CurrentQuery,
    /// `RDGV?`
    VoltageQuery,
    /// `SETI <A>`
    SetCurrent(f64),
    /// `SETV?`
    ComplianceVoltageQuery,
    /// `SETV <V>`
    SetComplianceVoltage(f64),
    /// `RATE?`
    RampRateQuery,
    /// `RATE <A/s>`
    SetRampRate(f64),
    /// `RAMP`
    StartRamp,
    /// `STOP`
    StopRamp,
    /// `LIMIT?`
    LimitsQuery,
    /// `LIMIT <A>, <V>, <A/s>`
    SetLimits { current: f64, voltage: f64, rate: f64 },
    /// `QNCH?`
    QuenchQuery,
    /// `QNCH <0|1>`
    SetQuenchDetect(bool),
    /// `QNCH 1,<A/s>`, enables detection with the given step limit
    SetQuenchStepLimit(f64),
    /// `ERSTR?`
    ErrorStatusQuery,
    /// Sent verbatim, for diagnostics
    Raw(String),
}

impl Command {
    /// The ASCII command text without the line terminator.
    pub fn encode(&self) -> String {
        match self {
            Command::Identify => "*IDN?".to_string(),
            Command::BaudQuery => "BAUD?".to_string(),
            Command::FieldQuery => "RDGF?".to_string(),
            Command::CurrentQuery => "RDGI?".to_string(),
            Command::VoltageQuery => "RDGV?".to_string(),
            Command::SetCurrent(amps) => format!("SETI {}", format_value(*amps)),
            Command::ComplianceVoltageQuery => "SETV?".to_string(),
            Command::SetComplianceVoltage(volts) => format!("SETV {}", format_value(*volts)),
            Command::RampRateQuery => "RATE?".to_string(),
            Command::SetRampRate(rate) => format!("RATE {}", format_value(*rate)),
            Command::StartRamp => "RAMP".to_string(),
            Command::StopRamp => "STOP".to_string(),
            Command::LimitsQuery => "LIMIT?".to_string(),
            // The setter separates fields with ", " although LIMIT? replies use bare commas
            Command::SetLimits {
                current,
                voltage,
                rate,
            } => format!(
                "LIMIT {}, {}, {}",
                format_value(*current),
                format_value(*voltage),
                format_value(*rate)
            ),
            Command::QuenchQuery => "QNCH?".to_string(),
            Command::SetQuenchDetect(enable) => format!("QNCH {}", u8::from(*enable)),
            Command::SetQuenchStepLimit(limit) => format!("QNCH 1,{}", format_value(*limit)),
            Command::ErrorStatusQuery => "ERSTR?".to_string(),
            Command::Raw(text) => text.clone(),
        }
    }

    /// Wire bytes: the encoded text followed by CR+LF.
    pub fn to_bytes(&self) -> Bytes {
        let text = self.encode();
        let mut buf = BytesMut::with_capacity(text.len() + TERMINATOR.len());
        buf.put_slice(text.as_bytes());
        buf.put_slice(TERMINATOR);
        buf.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Plain decimal notation; integral values keep one decimal place (`5.0`, `12.5`, `0.0001`).
pub fn format_value(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}
