//! The control protocol between the daemon and the configuration client.
//!
//! The client compiles the textual mapping language, pushes the result to
//! the daemon and keeps it informed about the focused application; the
//! daemon reports triggered actions back. Three messages exist:
//!
//! - `Configuration` – a compiled configuration blob (client → daemon),
//! - `ActiveContexts` – the set of enabled context indices (client → daemon),
//! - `TriggeredAction` – an action key fired (daemon → client).
//!
//! `messages` defines the typed forms, `codec` the length-framed binary
//! encoding.

pub mod codec;
pub mod messages;
