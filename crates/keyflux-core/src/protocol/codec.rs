//! Binary codec for the control protocol.
//!
//! Wire format:
//! ```text
//! [msg_type:1][payload_len:4][payload:N]
//! ```
//! All multi-byte integers are little-endian. The `Configuration` payload is
//! the compiled-configuration blob, itself versioned by a leading magic:
//! ```text
//! [magic:4 = "KFXC"][version:1][commands][contexts]
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::domain::config::{
    CompiledConfig, Command, Context, DeviceFilter, Mapping, MappingTarget,
};
use crate::domain::key::{Key, KeyEvent, KeySequence, KeyState, TimeoutKind};
use crate::protocol::messages::{
    Message, MessageType, CONFIG_MAGIC, CONFIG_VERSION, HEADER_SIZE,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than a complete frame. When reading from a
    /// stream this simply means more bytes have to arrive.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The configuration blob carries an unsupported version.
    #[error("unsupported configuration version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl ProtocolError {
    /// Whether the error only signals an incomplete read from a stream.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProtocolError::InsufficientData { .. })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into a byte vector including the 5-byte header.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let payload = encode_payload(message);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(message.message_type() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes one [`Message`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header plus payload), so a streaming caller can advance its read cursor.
///
/// # Errors
///
/// [`ProtocolError::InsufficientData`] when the frame is not complete yet;
/// any other variant means the stream is corrupt.
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let msg_type = MessageType::try_from(bytes[0])
        .map_err(|_| ProtocolError::UnknownMessageType(bytes[0]))?;
    let payload_len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;

    let total = HEADER_SIZE + payload_len;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let payload = &bytes[HEADER_SIZE..total];
    let message = match msg_type {
        MessageType::Configuration => Message::Configuration(decode_config(payload)?),
        MessageType::ActiveContexts => {
            let mut cursor = Cursor::new(payload);
            let count = cursor.read_u32()? as usize;
            let mut indices = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                indices.push(cursor.read_u32()?);
            }
            Message::ActiveContexts(indices)
        }
        MessageType::TriggeredAction => {
            let mut cursor = Cursor::new(payload);
            Message::TriggeredAction(cursor.read_u32()?)
        }
    };
    Ok((message, total))
}

/// Encodes a compiled configuration into its versioned blob form.
pub fn encode_config(config: &CompiledConfig) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&CONFIG_MAGIC);
    buf.push(CONFIG_VERSION);
    write_u16(&mut buf, config.commands.len() as u16);
    for command in &config.commands {
        write_string(&mut buf, &command.name);
        write_key_sequence(&mut buf, &command.output);
    }
    write_u16(&mut buf, config.contexts.len() as u16);
    for context in &config.contexts {
        match &context.device_filter {
            DeviceFilter::Any => buf.push(0x00),
            DeviceFilter::Literal(name) => {
                buf.push(0x01);
                write_string(&mut buf, name);
            }
            DeviceFilter::Pattern(pattern) => {
                buf.push(0x02);
                write_string(&mut buf, pattern);
            }
        }
        write_u16(&mut buf, context.mappings.len() as u16);
        for mapping in &context.mappings {
            write_key_sequence(&mut buf, &mapping.input);
            match &mapping.target {
                MappingTarget::Keys(sequence) => {
                    buf.push(0x00);
                    write_key_sequence(&mut buf, sequence);
                }
                MappingTarget::Command(index) => {
                    buf.push(0x01);
                    write_u16(&mut buf, *index);
                }
                MappingTarget::Exit => buf.push(0x02),
            }
        }
        write_u16(&mut buf, context.command_overrides.len() as u16);
        for (index, sequence) in &context.command_overrides {
            write_u16(&mut buf, *index);
            write_key_sequence(&mut buf, sequence);
        }
    }
    buf
}

/// Decodes a compiled-configuration blob.
pub fn decode_config(bytes: &[u8]) -> Result<CompiledConfig, ProtocolError> {
    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read_bytes(4)?;
    if magic != CONFIG_MAGIC {
        return Err(ProtocolError::MalformedPayload(format!(
            "bad configuration magic: {magic:02X?}"
        )));
    }
    let version = cursor.read_u8()?;
    if version != CONFIG_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let command_count = cursor.read_u16()? as usize;
    let mut commands = Vec::with_capacity(command_count.min(256));
    for _ in 0..command_count {
        let name = cursor.read_string()?;
        let output = cursor.read_key_sequence()?;
        commands.push(Command { name, output });
    }

    let context_count = cursor.read_u16()? as usize;
    let mut contexts = Vec::with_capacity(context_count.min(256));
    for _ in 0..context_count {
        let device_filter = match cursor.read_u8()? {
            0x00 => DeviceFilter::Any,
            0x01 => DeviceFilter::Literal(cursor.read_string()?),
            0x02 => DeviceFilter::Pattern(cursor.read_string()?),
            tag => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "unknown device filter tag: {tag}"
                )))
            }
        };
        let mapping_count = cursor.read_u16()? as usize;
        let mut mappings = Vec::with_capacity(mapping_count.min(1024));
        for _ in 0..mapping_count {
            let input = cursor.read_key_sequence()?;
            let target = match cursor.read_u8()? {
                0x00 => MappingTarget::Keys(cursor.read_key_sequence()?),
                0x01 => MappingTarget::Command(cursor.read_u16()?),
                0x02 => MappingTarget::Exit,
                tag => {
                    return Err(ProtocolError::MalformedPayload(format!(
                        "unknown mapping target tag: {tag}"
                    )))
                }
            };
            mappings.push(Mapping { input, target });
        }
        let override_count = cursor.read_u16()? as usize;
        let mut command_overrides = Vec::with_capacity(override_count.min(256));
        for _ in 0..override_count {
            let index = cursor.read_u16()?;
            let sequence = cursor.read_key_sequence()?;
            command_overrides.push((index, sequence));
        }
        contexts.push(Context {
            device_filter,
            mappings,
            command_overrides,
        });
    }

    Ok(CompiledConfig { commands, contexts })
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(message: &Message) -> Vec<u8> {
    match message {
        Message::Configuration(config) => encode_config(config),
        Message::ActiveContexts(indices) => {
            let mut buf = Vec::with_capacity(4 + indices.len() * 4);
            buf.extend_from_slice(&(indices.len() as u32).to_le_bytes());
            for index in indices {
                buf.extend_from_slice(&index.to_le_bytes());
            }
            buf
        }
        Message::TriggeredAction(index) => index.to_le_bytes().to_vec(),
    }
}

// ── Key event encoding ────────────────────────────────────────────────────────

fn write_key_event(buf: &mut Vec<u8>, event: &KeyEvent) {
    match event.key {
        Key::Code(code) => {
            buf.push(0x00);
            write_u16(buf, code);
        }
        Key::Virtual(id) => {
            buf.push(0x01);
            write_u16(buf, id);
        }
        Key::Action(id) => {
            buf.push(0x02);
            write_u16(buf, id);
        }
        Key::Timeout(TimeoutKind::Output) => buf.push(0x03),
        Key::Timeout(TimeoutKind::AwaitInput) => buf.push(0x04),
        Key::None => buf.push(0x05),
    }
    buf.push(match event.state {
        KeyState::Down => 0x00,
        KeyState::Up => 0x01,
        KeyState::DownMatched => 0x02,
        KeyState::Not => 0x03,
    });
    if event.key.is_timeout_key() {
        buf.extend_from_slice(&(event.timeout.as_millis() as u32).to_le_bytes());
    }
}

fn write_key_sequence(buf: &mut Vec<u8>, sequence: &KeySequence) {
    write_u16(buf, sequence.len() as u16);
    for event in sequence {
        write_key_event(buf, event);
    }
}

fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    write_u16(buf, len);
    buf.extend_from_slice(&bytes[..len as usize]);
}

// ── Decode cursor ─────────────────────────────────────────────────────────────

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ProtocolError> {
        if self.bytes.len() < self.offset + count {
            return Err(ProtocolError::MalformedPayload(format!(
                "need {count} bytes at offset {}, got {}",
                self.offset,
                self.bytes.len().saturating_sub(self.offset)
            )));
        }
        let slice = &self.bytes[self.offset..self.offset + count];
        self.offset += count;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
    }

    fn read_key_event(&mut self) -> Result<KeyEvent, ProtocolError> {
        let key = match self.read_u8()? {
            0x00 => Key::Code(self.read_u16()?),
            0x01 => Key::Virtual(self.read_u16()?),
            0x02 => Key::Action(self.read_u16()?),
            0x03 => Key::Timeout(TimeoutKind::Output),
            0x04 => Key::Timeout(TimeoutKind::AwaitInput),
            0x05 => Key::None,
            tag => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "unknown key tag: {tag}"
                )))
            }
        };
        let state = match self.read_u8()? {
            0x00 => KeyState::Down,
            0x01 => KeyState::Up,
            0x02 => KeyState::DownMatched,
            0x03 => KeyState::Not,
            state => {
                return Err(ProtocolError::MalformedPayload(format!(
                    "unknown key state: {state}"
                )))
            }
        };
        let timeout = if key.is_timeout_key() {
            Duration::from_millis(self.read_u32()? as u64)
        } else {
            Duration::ZERO
        };
        Ok(KeyEvent {
            key,
            state,
            timeout,
        })
    }

    fn read_key_sequence(&mut self) -> Result<KeySequence, ProtocolError> {
        let count = self.read_u16()? as usize;
        let mut sequence = KeySequence::new();
        for _ in 0..count {
            sequence.push(self.read_key_event()?);
        }
        Ok(sequence)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
