//! Reply decoding for the Lake Shore 625.
//!
//! Every decoder is total: a reply that does not have the expected shape comes back
//! as [`Reply::Raw`] holding the text as received, and an empty reply as
//! [`Reply::NoResponse`]. Nothing in here fails.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use std::fmt;
use strum_macros::Display;

/// One line read back from the instrument, or the marker for a read that timed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RawResponse {
    /// A line was received. The text is ASCII with surrounding whitespace removed and
    /// may be empty if the instrument sent a bare terminator.
    Line(String),
    /// Nothing arrived before the read timeout.
    NoResponse,
}

impl RawResponse {
    /// Decodes raw bytes as ASCII, silently dropping bytes outside the ASCII range.
    pub fn from_bytes(bytes: Option<&[u8]>) -> Self {
        match bytes {
            None => RawResponse::NoResponse,
            Some(bytes) => {
                let text: String = bytes
                    .iter()
                    .filter(|b| b.is_ascii())
                    .map(|&b| char::from(b))
                    .collect();
                RawResponse::Line(text.trim().to_string())
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawResponse::Line(text) => Some(text),
            RawResponse::NoResponse => None,
        }
    }

    /// True when there is nothing to show: a timeout or an empty line.
    pub fn is_empty(&self) -> bool {
        self.as_str().is_none_or(str::is_empty)
    }

    /// Applies a decoder, mapping a timeout or an empty line to [`Reply::NoResponse`].
    pub fn decode_with<T>(&self, decode: impl FnOnce(&str) -> Reply<T>) -> Reply<T> {
        match self.as_str() {
            Some(text) if !text.is_empty() => decode(text),
            _ => Reply::NoResponse,
        }
    }
}

impl fmt::Display for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawResponse::Line(text) => f.write_str(text),
            RawResponse::NoResponse => f.write_str("NO_RESPONSE"),
        }
    }
}

/// Outcome of a query that reached the instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Reply<T> {
    /// The reply had the expected shape.
    Decoded(T),
    /// The reply did not match the expected shape; the text is kept as received.
    Raw(String),
    /// Timeout or empty line.
    NoResponse,
}

impl<T> Reply<T> {
    pub fn into_decoded(self) -> Option<T> {
        match self {
            Reply::Decoded(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Decoded(value) => value.fmt(f),
            Reply::Raw(text) => f.write_str(text),
            Reply::NoResponse => f.write_str("NO_RESPONSE"),
        }
    }
}

/// Scalar readings: `RDGF?`, `RDGI?`, `RDGV?`, `RATE?`, `SETV?`.
///
/// Accepts an explicit leading `+` and exponent notation such as `+1.2345E+00`.
/// Non-finite values are treated as malformed.
pub fn decode_reading(text: &str) -> Reply<f64> {
    match parse_number(text) {
        Some(value) => Reply::Decoded(value),
        None => Reply::Raw(text.to_string()),
    }
}

fn parse_number(field: &str) -> Option<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Maximum limits reported by `LIMIT?`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Limits {
    /// A
    pub current: f64,
    /// V
    pub voltage: f64,
    /// A/s
    pub rate: f64,
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Current limit: {} A, Voltage limit: {} V, Rate limit: {} A/s",
            self.current, self.voltage, self.rate
        )
    }
}

/// `LIMIT?` replies carry exactly three comma-separated numbers.
pub fn decode_limits(text: &str) -> Reply<Limits> {
    let fields: Vec<&str> = text.split(',').collect();
    let [current, voltage, rate] = fields.as_slice() else {
        return Reply::Raw(text.to_string());
    };
    match (parse_number(current), parse_number(voltage), parse_number(rate)) {
        (Some(current), Some(voltage), Some(rate)) => Reply::Decoded(Limits {
            current,
            voltage,
            rate,
        }),
        _ => Reply::Raw(text.to_string()),
    }
}

/// Quench detection state reported by `QNCH?`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuenchStatus {
    pub enabled: bool,
    /// A/s. Absent when the reply only carried the status field.
    pub step_limit: Option<f64>,
}

impl fmt::Display for QuenchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Quench Detection: {}",
            if self.enabled { "ON" } else { "OFF" }
        )?;
        if let Some(limit) = self.step_limit {
            write!(f, ", Step Limit: {limit} A/s")?;
        }
        Ok(())
    }
}

/// First field `0`/`1`, second field the step limit; any further fields are ignored.
pub fn decode_quench(text: &str) -> Reply<QuenchStatus> {
    let mut fields = text.split(',');
    let enabled = match fields.next().map(str::trim) {
        Some("0") => false,
        Some("1") => true,
        _ => return Reply::Raw(text.to_string()),
    };
    let step_limit = match fields.next() {
        None => None,
        Some(field) => match parse_number(field) {
            Some(limit) => Some(limit),
            None => return Reply::Raw(text.to_string()),
        },
    };
    Reply::Decoded(QuenchStatus {
        enabled,
        step_limit,
    })
}

/// `*IDN?` reply: manufacturer, model, serial number, firmware version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identification {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

pub fn decode_identification(text: &str) -> Reply<Identification> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    match fields.as_slice() {
        [manufacturer, model, serial, firmware] if fields.iter().all(|f| !f.is_empty()) => {
            Reply::Decoded(Identification {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial: serial.to_string(),
                firmware: firmware.to_string(),
            })
        }
        _ => Reply::Raw(text.to_string()),
    }
}

/// Serial baud rates selectable on the instrument, keyed by their `BAUD?` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BaudRate {
    #[strum(to_string = "9600")]
    Baud9600 = 0,
    #[strum(to_string = "19200")]
    Baud19200 = 1,
    #[strum(to_string = "38400")]
    Baud38400 = 2,
    #[strum(to_string = "57600")]
    Baud57600 = 3,
}

impl BaudRate {
    pub fn bits_per_second(&self) -> u32 {
        match self {
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud57600 => 57600,
        }
    }

    pub fn code(&self) -> u8 {
        (*self).into()
    }
}

/// Decoded `BAUD?` reply. Codes outside the table are kept, never rejected.
///
/// Serializes as `{"bits_per_second": 38400, "code": "2"}`, with a null rate for
/// unknown codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaudSetting {
    Known(BaudRate),
    Unknown(String),
}

impl BaudSetting {
    pub fn bits_per_second(&self) -> Option<u32> {
        match self {
            BaudSetting::Known(rate) => Some(rate.bits_per_second()),
            BaudSetting::Unknown(_) => None,
        }
    }
}

impl Serialize for BaudSetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BaudSetting", 2)?;
        match self {
            BaudSetting::Known(rate) => {
                state.serialize_field("bits_per_second", &Some(rate.bits_per_second()))?;
                state.serialize_field("code", &rate.code().to_string())?;
            }
            BaudSetting::Unknown(code) => {
                state.serialize_field("bits_per_second", &None::<u32>)?;
                state.serialize_field("code", code)?;
            }
        }
        state.end()
    }
}

impl fmt::Display for BaudSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaudSetting::Known(rate) => write!(f, "{rate} baud (code: {})", rate.code()),
            BaudSetting::Unknown(code) => write!(f, "unknown (code: {code})"),
        }
    }
}

pub fn decode_baud(text: &str) -> Reply<BaudSetting> {
    let code = text.trim();
    let known = code
        .parse::<u8>()
        .ok()
        .and_then(|c| BaudRate::try_from(c).ok());
    Reply::Decoded(match known {
        Some(rate) => BaudSetting::Known(rate),
        None => BaudSetting::Unknown(code.to_string()),
    })
}

/// Hardware error register bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive)]
#[repr(u16)]
pub enum HardwareFault {
    #[strum(to_string = "Temperature Fault")]
    TemperatureFault = 1,
    #[strum(to_string = "Low Line Voltage")]
    LowLineVoltage = 2,
    #[strum(to_string = "Output Over Current")]
    OutputOverCurrent = 4,
    #[strum(to_string = "Output Over Voltage")]
    OutputOverVoltage = 8,
    #[strum(to_string = "Output Control Failure")]
    OutputControlFailure = 16,
    #[strum(to_string = "DAC Processor Not Responding")]
    DacProcessorNotResponding = 32,
}

impl HardwareFault {
    pub const ALL: [HardwareFault; 6] = [
        HardwareFault::TemperatureFault,
        HardwareFault::LowLineVoltage,
        HardwareFault::OutputOverCurrent,
        HardwareFault::OutputOverVoltage,
        HardwareFault::OutputControlFailure,
        HardwareFault::DacProcessorNotResponding,
    ];
}

/// Operational error register bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive)]
#[repr(u16)]
pub enum OperationalFault {
    #[strum(to_string = "Calibration Error")]
    CalibrationError = 1,
    #[strum(to_string = "External Current Program Error")]
    ExternalCurrentProgramError = 2,
    #[strum(to_string = "High Line Voltage")]
    HighLineVoltage = 4,
    #[strum(to_string = "Temperature High")]
    TemperatureHigh = 8,
    #[strum(to_string = "Remote Inhibit Detected")]
    RemoteInhibitDetected = 16,
    #[strum(to_string = "Magnet Quench Detected")]
    MagnetQuenchDetected = 32,
    #[strum(to_string = "Magnet Discharging Through Crowbar")]
    MagnetDischargingThroughCrowbar = 64,
}

impl OperationalFault {
    pub const ALL: [OperationalFault; 7] = [
        OperationalFault::CalibrationError,
        OperationalFault::ExternalCurrentProgramError,
        OperationalFault::HighLineVoltage,
        OperationalFault::TemperatureHigh,
        OperationalFault::RemoteInhibitDetected,
        OperationalFault::MagnetQuenchDetected,
        OperationalFault::MagnetDischargingThroughCrowbar,
    ];
}

/// Persistent switch heater error register bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive)]
#[repr(u16)]
pub enum PshFault {
    #[strum(to_string = "PSH Open Circuit")]
    OpenCircuit = 1,
    #[strum(to_string = "PSH Short Circuit")]
    ShortCircuit = 2,
}

impl PshFault {
    pub const ALL: [PshFault; 2] = [PshFault::OpenCircuit, PshFault::ShortCircuit];
}

/// Raw `ERSTR?` registers. Bits without a known meaning are kept but not named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorStatus {
    pub hardware: u16,
    pub operational: u16,
    pub psh: u16,
}

fn set_flags<F: Copy + Into<u16>>(register: u16, all: &[F]) -> Vec<F> {
    all.iter()
        .copied()
        .filter(|flag| register & (*flag).into() != 0)
        .collect()
}

/// Comma-joined names, or `None` when no flag is set.
pub fn describe_flags<F: fmt::Display>(flags: &[F]) -> String {
    if flags.is_empty() {
        "None".to_string()
    } else {
        flag_names(flags).join(", ")
    }
}

fn flag_names<F: fmt::Display>(flags: &[F]) -> Vec<String> {
    flags.iter().map(ToString::to_string).collect()
}

impl ErrorStatus {
    pub fn hardware_faults(&self) -> Vec<HardwareFault> {
        set_flags(self.hardware, &HardwareFault::ALL)
    }

    pub fn operational_faults(&self) -> Vec<OperationalFault> {
        set_flags(self.operational, &OperationalFault::ALL)
    }

    pub fn psh_faults(&self) -> Vec<PshFault> {
        set_flags(self.psh, &PshFault::ALL)
    }

    pub fn is_clear(&self) -> bool {
        self.hardware == 0 && self.operational == 0 && self.psh == 0
    }
}

/// Registers alongside the names of the conditions they flag.
impl Serialize for ErrorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ErrorStatus", 6)?;
        state.serialize_field("hardware", &self.hardware)?;
        state.serialize_field("hardware_errors", &flag_names(&self.hardware_faults()))?;
        state.serialize_field("operational", &self.operational)?;
        state.serialize_field("operational_errors", &flag_names(&self.operational_faults()))?;
        state.serialize_field("psh", &self.psh)?;
        state.serialize_field("psh_errors", &flag_names(&self.psh_faults()))?;
        state.end()
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hardware Errors: {}", describe_flags(&self.hardware_faults()))?;
        writeln!(
            f,
            "Operational Errors: {}",
            describe_flags(&self.operational_faults())
        )?;
        write!(f, "PSH Errors: {}", describe_flags(&self.psh_faults()))
    }
}

/// `ERSTR?` replies carry exactly three integers: hardware, operational, PSH.
pub fn decode_error_status(text: &str) -> Reply<ErrorStatus> {
    let registers: Option<Vec<u16>> = text
        .split(',')
        .map(|field| field.trim().parse::<u16>().ok())
        .collect();
    match registers.as_deref() {
        Some(&[hardware, operational, psh]) => Reply::Decoded(ErrorStatus {
            hardware,
            operational,
            psh,
        }),
        _ => Reply::Raw(text.to_string()),
    }
}
