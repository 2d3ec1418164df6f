//! Tests for the request/response client over a scripted transport

mod common;

use common::*;
use ls625_lib::response::{BaudRate, BaudSetting, ErrorStatus, Limits, QuenchStatus};

#[test]
fn test_query_writes_terminated_command() {
    let (mut device, state) = mock_device([Scripted::Line("+12.3456")]);

    let current = device.get_current().expect("transport should not fail");
    assert_eq!(current, Reply::Decoded(12.3456));
    assert_eq!(state.borrow().written_lines(), vec!["RDGI?\r\n"]);
}

#[test]
fn test_each_query_mnemonic() {
    let (mut device, state) = mock_device([
        Scripted::Line("+0.5000E+00"),
        Scripted::Line("+0.0123"),
        Scripted::Line("+0.1000"),
        Scripted::Line("2.5000"),
        Scripted::Line("60.1000,5.0000,99.9990"),
        Scripted::Line("1,0.0500"),
        Scripted::Line("LSCI,MODEL625,1234567,1.3"),
        Scripted::Line("1"),
        Scripted::Line("0,32,0"),
    ]);

    assert_eq!(device.get_field().unwrap(), Reply::Decoded(0.5));
    assert_eq!(device.get_voltage().unwrap(), Reply::Decoded(0.0123));
    assert_eq!(device.get_ramp_rate().unwrap(), Reply::Decoded(0.1));
    assert_eq!(device.get_compliance_voltage().unwrap(), Reply::Decoded(2.5));
    assert_eq!(
        device.get_limits().unwrap(),
        Reply::Decoded(Limits {
            current: 60.1,
            voltage: 5.0,
            rate: 99.999,
        })
    );
    assert_eq!(
        device.get_quench_detect().unwrap(),
        Reply::Decoded(QuenchStatus {
            enabled: true,
            step_limit: Some(0.05),
        })
    );
    let id = device.get_identification().unwrap().into_decoded().unwrap();
    assert_eq!(id.model, "MODEL625");
    assert_eq!(
        device.get_baud_rate().unwrap(),
        Reply::Decoded(BaudSetting::Known(BaudRate::Baud19200))
    );
    assert_eq!(
        device.get_error_status().unwrap(),
        Reply::Decoded(ErrorStatus {
            hardware: 0,
            operational: 32,
            psh: 0,
        })
    );

    assert_eq!(
        state.borrow().written_lines(),
        vec![
            "RDGF?\r\n", "RDGV?\r\n", "RATE?\r\n", "SETV?\r\n", "LIMIT?\r\n", "QNCH?\r\n",
            "*IDN?\r\n", "BAUD?\r\n", "ERSTR?\r\n",
        ]
    );
}

#[test]
fn test_timeout_is_no_response() {
    let (mut device, _state) = mock_device([Scripted::Timeout]);
    assert_eq!(device.get_field().unwrap(), Reply::NoResponse);
}

#[test]
fn test_empty_line_is_no_response_for_queries() {
    let (mut device, _state) = mock_device([Scripted::Line("")]);
    assert_eq!(device.get_ramp_rate().unwrap(), Reply::NoResponse);
}

#[test]
fn test_raw_command_distinguishes_timeout_from_empty_line() {
    let (mut device, _state) = mock_device([Scripted::Line(""), Scripted::Timeout]);

    let empty = device.send_command("RAMP").unwrap();
    assert_eq!(empty, RawResponse::Line(String::new()));
    let silent = device.send_command("RAMP").unwrap();
    assert_eq!(silent, RawResponse::NoResponse);
    assert_ne!(empty, silent);
}

#[test]
fn test_raw_command_sent_verbatim() {
    let (mut device, state) = mock_device([Scripted::Line("  LSCI,MODEL625,1,1.0  ")]);
    let response = device.send_command("*idn?").unwrap();
    assert_eq!(response, RawResponse::Line("LSCI,MODEL625,1,1.0".to_string()));
    assert_eq!(state.borrow().written_lines(), vec!["*idn?\r\n"]);
}

#[test]
fn test_non_ascii_raw_command_is_rejected_before_io() {
    let (mut device, state) = mock_device(Vec::<Scripted>::new());
    let err = device.send_command("SETI 5µ").unwrap_err();
    assert!(matches!(err, LsError::NonAscii(_)));
    assert!(state.borrow().written.is_empty());
}

#[test]
fn test_malformed_reading_falls_back_to_raw() {
    let (mut device, _state) = mock_device([Scripted::Line("OVLD")]);
    assert_eq!(device.get_voltage().unwrap(), Reply::Raw("OVLD".to_string()));
}

#[test]
fn test_setters_encode_and_return_acknowledgement() {
    let (mut device, state) = mock_device([
        Scripted::Timeout,
        Scripted::Line("OK"),
        Scripted::Timeout,
        Scripted::Timeout,
        Scripted::Timeout,
        Scripted::Timeout,
        Scripted::Timeout,
        Scripted::Timeout,
    ]);

    assert_eq!(device.set_current(12.5).unwrap(), RawResponse::NoResponse);
    assert_eq!(
        device.set_ramp_rate(0.1).unwrap(),
        RawResponse::Line("OK".to_string())
    );
    device.set_compliance_voltage(2.0).unwrap();
    device.set_limits(10.0, 2.5, 0.01).unwrap();
    device.set_quench_detect(false).unwrap();
    device.set_quench_step_limit(0.05).unwrap();
    device.start_ramp().unwrap();
    device.stop_ramp().unwrap();

    assert_eq!(
        state.borrow().written_lines(),
        vec![
            "SETI 12.5\r\n",
            "RATE 0.1\r\n",
            "SETV 2.0\r\n",
            "LIMIT 10.0, 2.5, 0.01\r\n",
            "QNCH 0\r\n",
            "QNCH 1,0.05\r\n",
            "RAMP\r\n",
            "STOP\r\n",
        ]
    );
}

#[test]
fn test_validation_failure_has_no_side_effect() {
    let (mut device, state) = mock_device([Scripted::Line("should never be read")]);

    let err = device.set_compliance_voltage(5.0001).unwrap_err();
    assert!(matches!(err, LsError::Validation(_)));
    let err = device.set_limits(10.0, 2.5, 100.0).unwrap_err();
    match err {
        LsError::Validation(ValidationError { parameter, value, .. }) => {
            assert_eq!(parameter, Parameter::RateLimit);
            assert_eq!(value, 100.0);
        }
        other => panic!("Expected validation error, got {other:?}"),
    }
    assert!(device.set_current(75.0).is_err());
    assert!(device.set_ramp_rate(-1.0).is_err());
    assert!(device.set_quench_step_limit(50.0).is_err());

    let state = state.borrow();
    assert!(state.written.is_empty(), "nothing may be written");
    assert_eq!(state.reads, 0, "nothing may be read");
    assert!(state.open, "the connection stays open");
    assert_eq!(state.replies.len(), 1);
}

#[test]
fn test_transport_fault_is_an_error_not_no_response() {
    let (mut device, _state) = mock_device([Scripted::Fault]);
    let err = device.get_current().unwrap_err();
    assert!(err.is_transport(), "expected a transport error, got {err:?}");
    assert!(matches!(err, LsError::Io(_)));
}

#[test]
fn test_close_is_idempotent() {
    let (mut device, state) = mock_device(Vec::<Scripted>::new());
    device.close();
    device.close();
    assert!(!device.is_open());
    assert!(!state.borrow().open);

    let err = device.get_field().unwrap_err();
    assert!(matches!(err, LsError::NotConnected));
    assert!(state.borrow().written.is_empty());

    drop(device);
    assert!(!state.borrow().open);
}
