//! # keyflux-core
//!
//! Shared library for keyflux containing the key event domain model, the
//! compiled mapping configuration, the mapping state machine (the [`Stage`])
//! and the binary client protocol codec.
//!
//! This crate is used by the daemon and by configuration tooling. It has zero
//! dependencies on OS APIs, device files or sockets, so the entire event
//! translation pipeline can be exercised on any platform.
//!
//! The three top-level modules:
//!
//! - **`domain`** – key identifiers, key events and sequences, and the
//!   compiled configuration the client pushes to the daemon: contexts with
//!   device filters, mappings, commands and virtual-key latches.
//!
//! - **`stage`** – the mapping state machine. It consumes one key event at a
//!   time (plus the index of the originating device), maintains a rolling
//!   window of pressed keys, and produces the remapped output sequence.
//!
//! - **`protocol`** – how bytes travel over the daemon's control socket.
//!   Messages are encoded into a compact length-framed binary format and
//!   decoded back into typed Rust structs on the other end.

pub mod domain;
pub mod protocol;
pub mod stage;

// Re-export the most-used types at the crate root so callers can write
// `keyflux_core::Stage` instead of `keyflux_core::stage::Stage`.
pub use domain::config::{
    CompiledConfig, Command, Context, DeviceFilter, Mapping, MappingTarget,
};
pub use domain::key::{
    DeviceIndex, Key, KeyEvent, KeySequence, KeyState, TimeoutKind, NO_DEVICE_INDEX,
};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{Message, MessageType};
pub use stage::Stage;
