//! OS-facing infrastructure: grabbed input devices, the synthetic output
//! device and the control socket. Each concern is reached through a trait
//! with a production implementation and a mock for tests.

pub mod control;
pub mod devices;
pub mod output;
