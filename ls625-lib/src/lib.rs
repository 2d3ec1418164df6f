//! Serial protocol client for the Lake Shore 625 superconducting magnet power supply.
//!
//! [`LS625`] wraps the ASCII command set (`RDGI?`, `SETI`, `LIMIT`, `QNCH`, ...) behind
//! typed methods, and [`logger::RampLogger`] samples the supply on a fixed interval
//! into a per-day log file.

pub mod command;
pub mod constants;
pub mod device;
pub mod error;
pub mod logger;
pub mod response;
pub mod transport;
pub mod validate;


// Re-export the main types for easy access
pub use command::Command;
pub use device::LS625;
pub use error::{LsError, ValidationError};
pub use logger::{LoggerConfig, RampLogger, StopSignal};
pub use response::{RawResponse, Reply};
pub use transport::{SerialConfig, SerialTransport, Transport};
