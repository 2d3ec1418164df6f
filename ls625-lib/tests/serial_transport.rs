//! Tests for the serial transport over a pseudo-terminal pair

#![cfg(unix)]

mod common;

use common::*;
use ls625_lib::SerialTransport;
use serialport::{SerialPort, TTYPort};
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};

const READ_TIMEOUT: Duration = Duration::from_millis(300);

/// The transport on one end, the simulated instrument on the other.
fn pty_link() -> (SerialTransport, TTYPort) {
    let (mut instrument, mut host) = TTYPort::pair().expect("failed to open a pty pair");
    host.set_timeout(READ_TIMEOUT).unwrap();
    instrument.set_timeout(Duration::from_secs(2)).unwrap();
    (SerialTransport::from_port(Box::new(host)), instrument)
}

fn read_command(instrument: &mut TTYPort, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    instrument.read_exact(&mut buf).unwrap();
    buf
}

#[test]
fn test_stale_input_is_discarded_before_write() {
    let (mut transport, mut instrument) = pty_link();

    instrument.write_all(b"+9.9999\r\n").unwrap();
    instrument.flush().unwrap();
    // let the leftover reply land in the host's input queue
    thread::sleep(Duration::from_millis(100));

    transport.write_line(b"RDGI?\r\n").unwrap();
    assert_eq!(read_command(&mut instrument, 7), b"RDGI?\r\n");

    instrument.write_all(b"+1.5000\r\n").unwrap();
    assert_eq!(
        transport.read_line().unwrap(),
        Some(b"+1.5000\r\n".to_vec()),
        "only the reply written after the command should be read"
    );
}

#[test]
fn test_partial_line_is_returned_at_the_deadline() {
    let (mut transport, mut instrument) = pty_link();

    instrument.write_all(b"+1.2").unwrap();
    instrument.flush().unwrap();

    let started = Instant::now();
    let line = transport.read_line().unwrap();
    assert_eq!(line, Some(b"+1.2".to_vec()));
    assert!(started.elapsed() >= READ_TIMEOUT - Duration::from_millis(50));
}

#[test]
fn test_silence_reads_as_none() {
    let (mut transport, _instrument) = pty_link();

    let started = Instant::now();
    assert_eq!(transport.read_line().unwrap(), None);
    assert!(started.elapsed() >= READ_TIMEOUT - Duration::from_millis(50));
}

#[test]
fn test_client_waits_the_settle_delay() {
    let (transport, mut instrument) = pty_link();
    let responder = thread::spawn(move || {
        let command = read_command(&mut instrument, 7);
        instrument.write_all(b"+0.4500E+00\r\n").unwrap();
        instrument.flush().unwrap();
        // keep the pty open until the client has read the reply
        thread::sleep(Duration::from_millis(500));
        command
    });

    // default 200 ms settle delay
    let mut device = LS625::with_transport(transport);
    let started = Instant::now();
    let field = device.get_field().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(field, Reply::Decoded(0.45));
    assert!(elapsed >= Duration::from_millis(200), "took {elapsed:?}");
    assert_eq!(responder.join().unwrap(), b"RDGF?\r\n");

    device.close();
    assert!(!device.is_open());
}
