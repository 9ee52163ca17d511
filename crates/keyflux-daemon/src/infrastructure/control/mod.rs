//! The control channel to the configuration client.
//!
//! One client at a time connects over a Unix stream socket, pushes compiled
//! configurations and context updates, and receives triggered actions back.
//! The very first message after a connection must be a `Configuration`;
//! anything else discards the connection.

use std::os::unix::io::RawFd;
use std::time::Duration;

use thiserror::Error;

use keyflux_core::{Message, ProtocolError};

pub mod mock;
pub mod socket;

/// Connection lifecycle, driven by the daemon's outer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Listening,
    Connected,
    Disconnected,
}

/// Error type for the control channel.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("client disconnected")]
    Disconnected,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The session-facing side of the control channel.
pub trait ClientPort {
    /// Descriptor that becomes readable when the client sent something, used
    /// to interrupt the device wait. `None` while no client is connected.
    fn interrupt_fd(&self) -> Option<RawFd>;

    /// Reads every complete message available within `timeout` (a zero
    /// timeout only drains what already arrived; `None` blocks).
    fn read_messages(&mut self, timeout: Option<Duration>) -> Result<Vec<Message>, PortError>;

    /// Reports a fired action key to the client.
    fn send_triggered_action(&mut self, index: u32) -> Result<(), PortError>;
}
