//! Typed forms of the control protocol messages.

use serde::{Deserialize, Serialize};

use crate::domain::config::CompiledConfig;

/// Version byte leading the compiled-configuration blob.
pub const CONFIG_VERSION: u8 = 0x01;

/// Magic bytes leading the compiled-configuration blob.
pub const CONFIG_MAGIC: [u8; 4] = *b"KFXC";

/// Size of the frame header: one type byte plus a little-endian u32 payload
/// length.
pub const HEADER_SIZE: usize = 5;

/// Message type codes on the wire. Values below 0x80 flow from the client to
/// the daemon, values from 0x80 up flow the other way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Configuration = 0x01,
    ActiveContexts = 0x02,
    TriggeredAction = 0x81,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Configuration),
            0x02 => Ok(MessageType::ActiveContexts),
            0x81 => Ok(MessageType::TriggeredAction),
            _ => Err(()),
        }
    }
}

/// A control protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Replaces the daemon's mapping configuration.
    Configuration(CompiledConfig),
    /// Replaces the set of active context indices.
    ActiveContexts(Vec<u32>),
    /// An action key fired; the index points into the client's action list.
    TriggeredAction(u32),
}

impl Message {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Configuration(_) => MessageType::Configuration,
            Message::ActiveContexts(_) => MessageType::ActiveContexts,
            Message::TriggeredAction(_) => MessageType::TriggeredAction,
        }
    }
}
