//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use ls625_lib::error::{LsError, Parameter, ValidationError};
#[allow(unused_imports)]
pub use ls625_lib::logger::{StopHandle, StopSignal};
#[allow(unused_imports)]
pub use ls625_lib::response::{RawResponse, Reply};
#[allow(unused_imports)]
pub use ls625_lib::{LS625, Transport};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

/// One scripted outcome of `read_line`.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Scripted {
    /// A reply line; CR+LF is appended.
    Line(&'static str),
    /// Bytes returned exactly as given.
    Bytes(Vec<u8>),
    /// The read times out with nothing received.
    Timeout,
    /// The port fails mid-transaction.
    Fault,
}

/// What the mock saw; shared with the test after the transport is moved into a client.
#[derive(Debug, Default)]
pub struct MockState {
    pub replies: VecDeque<Scripted>,
    pub written: Vec<Vec<u8>>,
    pub reads: usize,
    pub open: bool,
    pub close_calls: usize,
}

#[allow(dead_code)]
impl MockState {
    pub fn written_lines(&self) -> Vec<String> {
        self.written
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }
}

/// Scripted in-memory [`Transport`]. Once the script runs out every read times out.
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
    stop_on_read: Option<(usize, StopHandle)>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new(replies: impl IntoIterator<Item = Scripted>) -> (Self, Rc<RefCell<MockState>>) {
        let state = Rc::new(RefCell::new(MockState {
            replies: replies.into_iter().collect(),
            open: true,
            ..Default::default()
        }));
        (
            Self {
                state: Rc::clone(&state),
                stop_on_read: None,
            },
            state,
        )
    }

    /// Request a stop through `handle` while serving the `nth` read (1-based).
    pub fn stop_on_read(mut self, nth: usize, handle: StopHandle) -> Self {
        self.stop_on_read = Some((nth, handle));
        self
    }
}

impl Transport for MockTransport {
    fn write_line(&mut self, line: &[u8]) -> Result<(), LsError> {
        let mut state = self.state.borrow_mut();
        if !state.open {
            return Err(LsError::NotConnected);
        }
        state.written.push(line.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, LsError> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if let Some((nth, handle)) = &self.stop_on_read {
            if state.reads == *nth {
                handle.stop();
            }
        }
        match state.replies.pop_front().unwrap_or(Scripted::Timeout) {
            Scripted::Line(text) => Ok(Some(format!("{text}\r\n").into_bytes())),
            Scripted::Bytes(bytes) => Ok(Some(bytes)),
            Scripted::Timeout => Ok(None),
            Scripted::Fault => Err(LsError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
        }
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open = false;
        state.close_calls += 1;
    }

    fn is_open(&self) -> bool {
        self.state.borrow().open
    }
}

/// A client over a scripted transport with no settle delay.
#[allow(dead_code)]
pub fn mock_device(
    replies: impl IntoIterator<Item = Scripted>,
) -> (LS625<MockTransport>, Rc<RefCell<MockState>>) {
    let (transport, state) = MockTransport::new(replies);
    (
        LS625::with_transport(transport).with_settle_delay(std::time::Duration::ZERO),
        state,
    )
}
