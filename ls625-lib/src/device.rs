use crate::command::Command;
use crate::constants::SETTLE_DELAY;
use crate::error::LsError;
use crate::response::{
    BaudSetting, ErrorStatus, Identification, Limits, QuenchStatus, RawResponse, Reply,
    decode_baud, decode_error_status, decode_identification, decode_limits, decode_quench,
    decode_reading,
};
use crate::transport::{SerialConfig, SerialTransport, Transport};
use crate::validate;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// A connection to a Lake Shore 625 superconducting magnet power supply.
///
/// Every method is one blocking request/response transaction: encode, write, wait
/// for the settle delay, read one line, decode. The instrument is half-duplex with
/// no request identifiers, so all methods take `&mut self` and a connection has a
/// single owner. Share it across threads only behind a mutex.
pub struct LS625<T: Transport = SerialTransport> {
    transport: T,
    settle_delay: Duration,
}

impl LS625<SerialTransport> {
    /// Open the serial port described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self, LsError> {
        let transport = SerialTransport::open(config)?;
        info!(port = %config.port, "Connected to Lake Shore 625");
        Ok(Self::with_transport(transport))
    }
}

impl<T: Transport> LS625<T> {
    /// Wrap an already open transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override the pause between writing a command and reading its reply.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Send an arbitrary command verbatim and return whatever comes back.
    ///
    /// No validation is applied beyond requiring ASCII text.
    pub fn send_command(&mut self, raw: &str) -> Result<RawResponse, LsError> {
        self.transact(&Command::Raw(raw.to_string()))
    }

    /// Run one request/response exchange.
    pub fn transact(&mut self, command: &Command) -> Result<RawResponse, LsError> {
        let bytes = command.to_bytes();
        if !bytes.is_ascii() {
            return Err(LsError::NonAscii(command.encode()));
        }
        if !self.transport.is_open() {
            return Err(LsError::NotConnected);
        }

        debug!(command = %bytes.escape_ascii(), "Serial write");
        self.transport.write_line(&bytes)?;
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }

        let line = self.transport.read_line()?;
        let response = RawResponse::from_bytes(line.as_deref());
        match &response {
            RawResponse::Line(text) => debug!(%command, response = %text, "Serial read"),
            RawResponse::NoResponse => debug!(%command, "No response before read timeout"),
        }
        Ok(response)
    }

    fn query<U>(
        &mut self,
        command: Command,
        decode: impl FnOnce(&str) -> Reply<U>,
    ) -> Result<Reply<U>, LsError> {
        Ok(self.transact(&command)?.decode_with(decode))
    }

    // --- Queries ---

    /// Magnetic field in tesla (`RDGF?`).
    pub fn get_field(&mut self) -> Result<Reply<f64>, LsError> {
        self.query(Command::FieldQuery, decode_reading)
    }

    /// Output current in amps (`RDGI?`).
    pub fn get_current(&mut self) -> Result<Reply<f64>, LsError> {
        self.query(Command::CurrentQuery, decode_reading)
    }

    /// Output voltage in volts (`RDGV?`).
    pub fn get_voltage(&mut self) -> Result<Reply<f64>, LsError> {
        self.query(Command::VoltageQuery, decode_reading)
    }

    /// Ramp rate in A/s (`RATE?`).
    pub fn get_ramp_rate(&mut self) -> Result<Reply<f64>, LsError> {
        self.query(Command::RampRateQuery, decode_reading)
    }

    /// Compliance voltage limit in volts (`SETV?`).
    pub fn get_compliance_voltage(&mut self) -> Result<Reply<f64>, LsError> {
        self.query(Command::ComplianceVoltageQuery, decode_reading)
    }

    pub fn get_limits(&mut self) -> Result<Reply<Limits>, LsError> {
        self.query(Command::LimitsQuery, decode_limits)
    }

    pub fn get_quench_detect(&mut self) -> Result<Reply<QuenchStatus>, LsError> {
        self.query(Command::QuenchQuery, decode_quench)
    }

    pub fn get_identification(&mut self) -> Result<Reply<Identification>, LsError> {
        self.query(Command::Identify, decode_identification)
    }

    pub fn get_baud_rate(&mut self) -> Result<Reply<BaudSetting>, LsError> {
        self.query(Command::BaudQuery, decode_baud)
    }

    pub fn get_error_status(&mut self) -> Result<Reply<ErrorStatus>, LsError> {
        self.query(Command::ErrorStatusQuery, decode_error_status)
    }

    // --- Settings ---
    //
    // Each setter validates before anything is written and returns the
    // acknowledgement line, which the instrument frequently leaves empty.

    /// Target output current in amps (`SETI`).
    pub fn set_current(&mut self, amps: f64) -> Result<RawResponse, LsError> {
        validate::validate_current(amps)?;
        self.transact(&Command::SetCurrent(amps))
    }

    /// Ramp rate in A/s (`RATE`).
    pub fn set_ramp_rate(&mut self, rate: f64) -> Result<RawResponse, LsError> {
        validate::validate_ramp_rate(rate)?;
        self.transact(&Command::SetRampRate(rate))
    }

    /// Compliance voltage limit in volts (`SETV`), 0.1 to 5.0 V.
    pub fn set_compliance_voltage(&mut self, volts: f64) -> Result<RawResponse, LsError> {
        validate::validate_compliance_voltage(volts)?;
        self.transact(&Command::SetComplianceVoltage(volts))
    }

    /// Maximum current, voltage and rate limits (`LIMIT`).
    pub fn set_limits(&mut self, current: f64, voltage: f64, rate: f64) -> Result<RawResponse, LsError> {
        validate::validate_limits(current, voltage, rate)?;
        self.transact(&Command::SetLimits {
            current,
            voltage,
            rate,
        })
    }

    /// Enable or disable quench detection (`QNCH 0|1`).
    pub fn set_quench_detect(&mut self, enable: bool) -> Result<RawResponse, LsError> {
        self.transact(&Command::SetQuenchDetect(enable))
    }

    /// Enable quench detection with the given step limit in A/s (`QNCH 1,<limit>`).
    pub fn set_quench_step_limit(&mut self, step_limit: f64) -> Result<RawResponse, LsError> {
        validate::validate_quench_step_limit(step_limit)?;
        self.transact(&Command::SetQuenchStepLimit(step_limit))
    }

    /// Start ramping toward the target current (`RAMP`).
    pub fn start_ramp(&mut self) -> Result<RawResponse, LsError> {
        self.transact(&Command::StartRamp)
    }

    /// Pause the ramp at the present output (`STOP`).
    pub fn stop_ramp(&mut self) -> Result<RawResponse, LsError> {
        self.transact(&Command::StopRamp)
    }

    /// Release the connection. Safe to call repeatedly; also runs on drop.
    pub fn close(&mut self) {
        if self.transport.is_open() {
            info!("Closing connection to Lake Shore 625");
        }
        self.transport.close();
    }
}

impl<T: Transport> Drop for LS625<T> {
    fn drop(&mut self) {
        self.close();
    }
}
