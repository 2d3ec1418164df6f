//! Range checks for settable parameters.
//!
//! These run before a command is encoded. A rejected value never reaches the
//! transport, so a failed check leaves both the instrument and the connection untouched.

use std::ops::RangeInclusive;

use crate::constants::{
    CURRENT_LIMIT_RANGE, CURRENT_SETPOINT_RANGE, QUENCH_STEP_LIMIT_RANGE, RATE_LIMIT_RANGE,
    VOLTAGE_LIMIT_RANGE,
};
use crate::error::{Parameter, ValidationError};

fn check(
    parameter: Parameter,
    value: f64,
    range: RangeInclusive<f64>,
    unit: &'static str,
) -> Result<(), ValidationError> {
    // NaN fails `contains`, infinities fall outside every range
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError {
            parameter,
            value,
            range,
            unit,
        })
    }
}

/// Compliance voltage must lie in [0.1, 5.0] V.
pub fn validate_compliance_voltage(voltage: f64) -> Result<(), ValidationError> {
    check(Parameter::ComplianceVoltage, voltage, VOLTAGE_LIMIT_RANGE, "V")
}

/// Checks a limit triple, reporting the first field that is out of range.
pub fn validate_limits(current: f64, voltage: f64, rate: f64) -> Result<(), ValidationError> {
    check(Parameter::CurrentLimit, current, CURRENT_LIMIT_RANGE, "A")?;
    check(Parameter::VoltageLimit, voltage, VOLTAGE_LIMIT_RANGE, "V")?;
    check(Parameter::RateLimit, rate, RATE_LIMIT_RANGE, "A/s")
}

pub fn validate_current(current: f64) -> Result<(), ValidationError> {
    check(Parameter::Current, current, CURRENT_SETPOINT_RANGE, "A")
}

pub fn validate_ramp_rate(rate: f64) -> Result<(), ValidationError> {
    check(Parameter::RampRate, rate, RATE_LIMIT_RANGE, "A/s")
}

pub fn validate_quench_step_limit(step_limit: f64) -> Result<(), ValidationError> {
    check(Parameter::QuenchStepLimit, step_limit, QUENCH_STEP_LIMIT_RANGE, "A/s")
}
