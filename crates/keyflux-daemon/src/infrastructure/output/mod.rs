//! The synthetic output device the remapped stream appears to come from.
//!
//! Key events are queued with `send_key_event`/`send_event` and hit the
//! device on `flush`, mirroring how the kernel expects batches terminated by
//! a sync marker. Any failure is fatal to the session; there is no retry
//! queue.

use thiserror::Error;

use keyflux_core::KeyEvent;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod uinput;

/// Error type for virtual device creation and output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("creating virtual device failed: {0}")]
    Create(std::io::Error),
    #[error("sending to virtual device failed: {0}")]
    Send(std::io::Error),
}

/// Trait abstracting the synthetic output device.
pub trait VirtualDevice {
    /// Queues a key press or release. Only physical key events reach this
    /// point; latches, actions and timing markers are consumed by the event
    /// loop.
    fn send_key_event(&mut self, event: &KeyEvent) -> Result<(), OutputError>;

    /// Queues a non-key event verbatim (relative motion and the like).
    fn send_event(&mut self, event_type: u16, code: u16, value: i32) -> Result<(), OutputError>;

    /// Writes everything queued to the device.
    fn flush(&mut self) -> Result<(), OutputError>;
}
