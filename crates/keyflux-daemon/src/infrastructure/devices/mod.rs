//! Grabbed physical input devices.
//!
//! The production implementation ([`evdev::EvdevDeviceSet`] on Linux)
//! enumerates `/dev/input`, takes an exclusive grab on every keyboard (and,
//! when the configuration maps buttons or wheel motion, every pointer
//! device) and multiplexes their file descriptors with `poll(2)`. The
//! [`DeviceSet`] trait keeps the event loop unaware of all of that; tests
//! drive it with [`mock::MockDeviceSet`] instead.

use std::os::unix::io::RawFd;
use std::time::Duration;

use smallvec::smallvec;
use thiserror::Error;

use keyflux_core::domain::codes;
use keyflux_core::{Key, KeyEvent, KeySequence};

pub mod mock;

#[cfg(target_os = "linux")]
pub mod evdev;

// Kernel input event types and codes the daemon cares about.
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const REL_HWHEEL: u16 = 0x06;
pub const REL_WHEEL: u16 = 0x08;
pub const REL_WHEEL_HI_RES: u16 = 0x0B;
pub const REL_HWHEEL_HI_RES: u16 = 0x0C;

/// A raw event as read from a grabbed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    /// Index into [`DeviceSet::device_names`].
    pub device_index: usize,
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

/// Error type for device grabbing and reading.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no grabbable input devices found")]
    NoDevices,
}

/// Trait abstracting the set of grabbed input devices.
pub trait DeviceSet {
    /// Re-grabs matching devices, excluding the daemon's own virtual device
    /// by name. Idempotent: an existing grab is released first.
    fn grab(&mut self, virtual_device_name: &str, include_pointer: bool)
        -> Result<(), DeviceError>;

    /// Display names of the grabbed devices, indexed by device index.
    fn device_names(&self) -> &[String];

    /// Blocks for up to `timeout` (indefinitely when `None`) until an event
    /// is available. Returns `Ok(None)` on timeout and when `interrupt`
    /// becomes readable; an `Err` is fatal to the session.
    fn read_input_event(
        &mut self,
        timeout: Option<Duration>,
        interrupt: Option<RawFd>,
    ) -> Result<Option<RawInputEvent>, DeviceError>;
}

/// Converts a raw event into the key events the stage consumes.
///
/// Key presses and releases map one to one (autorepeat counts as a press).
/// A wheel notch has no release of its own, so it becomes a momentary
/// press/release pair of the matching wheel pseudo-key. Everything else
/// returns an empty sequence and is forwarded verbatim.
pub fn to_key_events(event: &RawInputEvent) -> KeySequence {
    match event.event_type {
        EV_KEY => {
            let key = Key::Code(event.code);
            if event.value == 0 {
                smallvec![KeyEvent::up(key)]
            } else {
                smallvec![KeyEvent::down(key)]
            }
        }
        EV_REL if event.code == REL_WHEEL || event.code == REL_HWHEEL => {
            let code = match (event.code, event.value > 0) {
                (REL_WHEEL, true) => codes::WHEEL_UP,
                (REL_WHEEL, false) => codes::WHEEL_DOWN,
                (_, true) => codes::WHEEL_RIGHT,
                (_, false) => codes::WHEEL_LEFT,
            };
            let key = Key::Code(code);
            let mut sequence = KeySequence::new();
            for _ in 0..event.value.unsigned_abs() {
                sequence.push(KeyEvent::down(key));
                sequence.push(KeyEvent::up(key));
            }
            sequence
        }
        _ => KeySequence::new(),
    }
}
