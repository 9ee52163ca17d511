//! Recording virtual device for tests.

use std::time::Instant;

use keyflux_core::KeyEvent;

use super::{OutputError, VirtualDevice};

/// Records everything sent to it; tests assert on the recorded stream.
pub struct RecordingVirtualDevice {
    /// Key events in send order.
    pub key_events: Vec<KeyEvent>,
    /// Arrival time of each key event, for timing assertions.
    pub key_event_times: Vec<Instant>,
    /// Non-key events forwarded verbatim as `(type, code, value)`.
    pub raw_events: Vec<(u16, u16, i32)>,
    pub flushes: usize,
    /// When set, the next flush fails, tearing the session down.
    pub fail_flush: bool,
}

impl RecordingVirtualDevice {
    pub fn new() -> Self {
        Self {
            key_events: Vec::new(),
            key_event_times: Vec::new(),
            raw_events: Vec::new(),
            flushes: 0,
            fail_flush: false,
        }
    }
}

impl Default for RecordingVirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDevice for RecordingVirtualDevice {
    fn send_key_event(&mut self, event: &KeyEvent) -> Result<(), OutputError> {
        self.key_events.push(*event);
        self.key_event_times.push(Instant::now());
        Ok(())
    }

    fn send_event(&mut self, event_type: u16, code: u16, value: i32) -> Result<(), OutputError> {
        self.raw_events.push((event_type, code, value));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        if self.fail_flush {
            return Err(OutputError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected flush failure",
            )));
        }
        self.flushes += 1;
        Ok(())
    }
}
