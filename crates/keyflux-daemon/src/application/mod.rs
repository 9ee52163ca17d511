//! The daemon's application layer: the per-connection event loop
//! ([`event_loop::Session`]), the outer connection lifecycle (`daemon`)
//! and press debouncing ([`debounce::KeyDebouncer`]).

#[cfg(target_os = "linux")]
pub mod daemon;
pub mod debounce;
pub mod event_loop;
