//! # keyflux-daemon
//!
//! The `keyfluxd` process: it exclusively grabs physical input devices,
//! routes every key event through the mapping state machine from
//! [`keyflux_core`] and emits the remapped stream through a synthetic
//! input device, while a configuration client drives it over a Unix socket.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ daemon::run()            -- binds the control socket, accepts a client
//!       ├─ initial Configuration over the ClientPort
//!       ├─ VirtualDevice::create() + DeviceSet::grab()
//!       └─ Session::run()      -- the single-threaded event loop
//!            ├─ DeviceSet::read_input_event()   (poll with deadline)
//!            ├─ Stage::update()                 (keyflux-core)
//!            ├─ send buffer -> Debouncer -> VirtualDevice
//!            └─ ClientPort::read_messages()     (reconfiguration)
//! ```
//!
//! Everything below `Session` is reached through traits, so the loop is
//! driven by mock infrastructure in the integration tests.

pub mod application;
pub mod infrastructure;
pub mod settings;
