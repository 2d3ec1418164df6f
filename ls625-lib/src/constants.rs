// Protocol constants for the Lake Shore 625

use std::ops::RangeInclusive;
use std::time::Duration;

/// Default serial device path
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Factory default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Per-read timeout for a response line
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Time the instrument needs between receiving a command and having the reply ready
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Command line terminator expected by the instrument
pub const TERMINATOR: &[u8] = b"\r\n";

/// Default interval between ramp log samples
pub const LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Legal range of the output current limit (A)
pub const CURRENT_LIMIT_RANGE: RangeInclusive<f64> = 0.0..=60.1;

/// Legal range of the compliance voltage and the voltage limit (V)
pub const VOLTAGE_LIMIT_RANGE: RangeInclusive<f64> = 0.1..=5.0;

/// Legal range of the ramp rate limit (A/s)
pub const RATE_LIMIT_RANGE: RangeInclusive<f64> = 0.0001..=99.999;

/// Legal range of the output current setpoint (A), the supply is bipolar
pub const CURRENT_SETPOINT_RANGE: RangeInclusive<f64> = -60.1..=60.1;

/// Legal range of the quench detection step limit (A/s)
pub const QUENCH_STEP_LIMIT_RANGE: RangeInclusive<f64> = 0.01..=10.0;
