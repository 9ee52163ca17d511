//! Key identifiers, key events and key sequences.
//!
//! A [`Key`] is drawn from three disjoint namespaces: physical key codes
//! (keyboard keys, mouse buttons and the wheel pseudo-codes), user-defined
//! virtual keys that act as latches, and action keys whose "press" is a
//! message to the configuration client rather than an OS key event. Two
//! distinguished keys exist besides those: [`Key::Timeout`], which carries a
//! duration in the surrounding [`KeyEvent`], and [`Key::None`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::domain::codes;

/// A physical key or button code, numbered like the kernel input codes.
pub type KeyCode = u16;

/// Index of a grabbed device, used to evaluate per-context device filters.
pub type DeviceIndex = usize;

/// Sentinel device index for events that did not originate from a grabbed
/// device (virtual-key feedback and synthetic timeout events). It matches
/// every device filter.
pub const NO_DEVICE_INDEX: DeviceIndex = usize::MAX;

/// Distinguishes the two roles a timeout event can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutKind {
    /// A pause inserted into the output stream; consumed by the flush
    /// scheduler before the remaining events are sent.
    Output,
    /// A request to wait for further *input*: either the state machine asking
    /// the event loop to start a timer, or the loop reporting back how much
    /// of that timer elapsed before it fired or was cut short.
    AwaitInput,
}

/// A key identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// A physical key, mouse button or wheel pseudo-code.
    Code(KeyCode),
    /// A user-defined latch, toggled by mappings and usable as a condition
    /// in other mappings.
    Virtual(u16),
    /// An index into the client-side action list.
    Action(u16),
    /// A timing marker; the duration lives in the enclosing [`KeyEvent`].
    Timeout(TimeoutKind),
    /// The absence of a key. Never emitted to a device.
    None,
}

impl Key {
    /// Returns `true` for user-defined latch keys.
    pub fn is_virtual_key(self) -> bool {
        matches!(self, Key::Virtual(_))
    }

    /// Returns `true` for client-side action keys.
    pub fn is_action_key(self) -> bool {
        matches!(self, Key::Action(_))
    }

    /// Returns `true` for timing markers of either kind.
    pub fn is_timeout_key(self) -> bool {
        matches!(self, Key::Timeout(_))
    }

    /// Returns `true` for mouse buttons and wheel pseudo-codes, the key
    /// classes that require grabbing pointer devices.
    pub fn is_pointer_key(self) -> bool {
        matches!(self, Key::Code(code) if codes::is_button(code) || codes::is_wheel(code))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Code(code) => match codes::name(*code) {
                Some(name) => f.write_str(name),
                None => write!(f, "Code({code})"),
            },
            Key::Virtual(id) => write!(f, "Virtual{id}"),
            Key::Action(id) => write!(f, "Action{id}"),
            Key::Timeout(TimeoutKind::Output) => f.write_str("Wait"),
            Key::Timeout(TimeoutKind::AwaitInput) => f.write_str("AwaitInput"),
            Key::None => f.write_str("None"),
        }
    }
}

/// The state carried by a key event.
///
/// Only `Down` and `Up` appear in device input and output. `DownMatched`
/// marks a pressed key inside the state machine's window whose press has
/// already produced output, and `Not` appears in mapping patterns as the
/// requirement that a key is currently released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyState {
    Down,
    Up,
    DownMatched,
    Not,
}

/// A single key transition, plus a duration when `key` is a timing marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    pub state: KeyState,
    /// Meaningful only when `key` is [`Key::Timeout`]; zero otherwise.
    pub timeout: Duration,
}

impl KeyEvent {
    pub fn new(key: Key, state: KeyState) -> Self {
        Self {
            key,
            state,
            timeout: Duration::ZERO,
        }
    }

    pub fn down(key: Key) -> Self {
        Self::new(key, KeyState::Down)
    }

    pub fn up(key: Key) -> Self {
        Self::new(key, KeyState::Up)
    }

    /// A timing marker event of the given role and duration.
    pub fn timeout(kind: TimeoutKind, duration: Duration) -> Self {
        Self {
            key: Key::Timeout(kind),
            state: KeyState::Down,
            timeout: duration,
        }
    }

    /// Placeholder event; compares unequal to every real key event.
    pub fn none() -> Self {
        Self::new(Key::None, KeyState::Up)
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            KeyState::Down => write!(f, "+{}", self.key),
            KeyState::Up => write!(f, "-{}", self.key),
            KeyState::DownMatched => write!(f, "#{}", self.key),
            KeyState::Not => write!(f, "!{}", self.key),
        }?;
        if self.key.is_timeout_key() {
            write!(f, "[{}ms]", self.timeout.as_millis())?;
        }
        Ok(())
    }
}

/// An ordered sequence of key events.
///
/// Sequences are short in the overwhelming majority of updates, so they are
/// kept inline up to eight events to avoid heap traffic on the hot path.
pub type KeySequence = SmallVec<[KeyEvent; 8]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_namespaces_are_disjoint() {
        assert_ne!(Key::Code(30), Key::Virtual(30));
        assert_ne!(Key::Virtual(0), Key::Action(0));
        assert!(Key::Virtual(3).is_virtual_key());
        assert!(Key::Action(0).is_action_key());
        assert!(Key::Timeout(TimeoutKind::Output).is_timeout_key());
        assert!(Key::Timeout(TimeoutKind::AwaitInput).is_timeout_key());
        assert!(!Key::Code(30).is_virtual_key());
    }

    #[test]
    fn pointer_keys_cover_buttons_and_wheel() {
        assert!(Key::Code(codes::BTN_LEFT).is_pointer_key());
        assert!(Key::Code(codes::WHEEL_UP).is_pointer_key());
        assert!(!Key::Code(codes::KEY_A).is_pointer_key());
        assert!(!Key::Virtual(0).is_pointer_key());
    }

    #[test]
    fn timeout_events_carry_their_duration() {
        let ev = KeyEvent::timeout(TimeoutKind::AwaitInput, Duration::from_millis(500));
        assert_eq!(ev.key, Key::Timeout(TimeoutKind::AwaitInput));
        assert_eq!(ev.timeout, Duration::from_millis(500));
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(KeyEvent::down(Key::Code(codes::KEY_A)).to_string(), "+A");
        assert_eq!(KeyEvent::up(Key::Virtual(1)).to_string(), "-Virtual1");
        assert_eq!(
            KeyEvent::timeout(TimeoutKind::Output, Duration::from_millis(20)).to_string(),
            "+Wait[20ms]"
        );
    }
}
