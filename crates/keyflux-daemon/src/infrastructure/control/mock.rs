//! Mock control channel for the event loop tests.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::time::Duration;

use keyflux_core::Message;

use super::{ClientPort, PortError};

pub struct MockClientPort {
    queued: VecDeque<Message>,
    /// Actions the session reported, in order.
    pub triggered_actions: Vec<u32>,
    /// Returned from `interrupt_fd`; a dummy descriptor by default so the
    /// event loop takes the message-draining path.
    pub interrupt: Option<RawFd>,
    /// When set, the next read fails as a dropped connection would.
    pub fail_next_read: bool,
}

impl MockClientPort {
    pub fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            triggered_actions: Vec::new(),
            interrupt: Some(0),
            fail_next_read: false,
        }
    }

    /// Queues a message for the next `read_messages` call.
    pub fn push_message(&mut self, message: Message) {
        self.queued.push_back(message);
    }
}

impl Default for MockClientPort {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPort for MockClientPort {
    fn interrupt_fd(&self) -> Option<RawFd> {
        self.interrupt
    }

    fn read_messages(&mut self, _timeout: Option<Duration>) -> Result<Vec<Message>, PortError> {
        if self.fail_next_read {
            self.fail_next_read = false;
            return Err(PortError::Disconnected);
        }
        Ok(self.queued.drain(..).collect())
    }

    fn send_triggered_action(&mut self, index: u32) -> Result<(), PortError> {
        self.triggered_actions.push(index);
        Ok(())
    }
}
