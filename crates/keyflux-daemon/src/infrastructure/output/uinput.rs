//! uinput-backed virtual device for Linux.

use evdev::uinput::{VirtualDevice as UinputHandle, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, RelativeAxisType};

use keyflux_core::domain::codes;
use keyflux_core::{Key, KeyEvent, KeyState};

use super::{OutputError, VirtualDevice};
use crate::infrastructure::devices::{
    EV_REL, REL_HWHEEL, REL_HWHEEL_HI_RES, REL_WHEEL, REL_WHEEL_HI_RES,
};

pub struct UinputDevice {
    device: UinputHandle,
    pending: Vec<InputEvent>,
}

impl UinputDevice {
    /// Creates the device with every key and button code plus relative
    /// pointer axes, so it can voice whatever a configuration produces.
    pub fn create(name: &str) -> Result<Self, OutputError> {
        let mut keys = AttributeSet::<evdev::Key>::new();
        for code in 1..0x300u16 {
            keys.insert(evdev::Key::new(code));
        }
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);
        axes.insert(RelativeAxisType::REL_HWHEEL);

        let device = VirtualDeviceBuilder::new()
            .map_err(OutputError::Create)?
            .name(name)
            .with_keys(&keys)
            .map_err(OutputError::Create)?
            .with_relative_axes(&axes)
            .map_err(OutputError::Create)?
            .build()
            .map_err(OutputError::Create)?;

        Ok(Self {
            device,
            pending: Vec::new(),
        })
    }

    /// A wheel pseudo-key press turns back into the relative event it came
    /// from; the pairing release carries no information.
    fn wheel_event(code: u16, state: KeyState) -> Option<InputEvent> {
        if state != KeyState::Down {
            return None;
        }
        let (axis, value) = match code {
            codes::WHEEL_UP => (REL_WHEEL, 1),
            codes::WHEEL_DOWN => (REL_WHEEL, -1),
            codes::WHEEL_RIGHT => (REL_HWHEEL, 1),
            _ => (REL_HWHEEL, -1),
        };
        Some(InputEvent::new(EventType(EV_REL), axis, value))
    }
}

impl VirtualDevice for UinputDevice {
    fn send_key_event(&mut self, event: &KeyEvent) -> Result<(), OutputError> {
        let Key::Code(code) = event.key else {
            debug_assert!(false, "non-physical key reached the virtual device");
            return Ok(());
        };
        if codes::is_wheel(code) {
            if let Some(rel) = Self::wheel_event(code, event.state) {
                self.pending.push(rel);
            }
            return Ok(());
        }
        let value = i32::from(event.state == KeyState::Down);
        self.pending
            .push(InputEvent::new(EventType::KEY, code, value));
        Ok(())
    }

    fn send_event(&mut self, event_type: u16, code: u16, value: i32) -> Result<(), OutputError> {
        // high-resolution wheel deltas would double the scroll produced by
        // the converted wheel pseudo-keys
        if event_type == EV_REL && (code == REL_WHEEL_HI_RES || code == REL_HWHEEL_HI_RES) {
            return Ok(());
        }
        self.pending
            .push(InputEvent::new(EventType(event_type), code, value));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), OutputError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.device
            .emit(&self.pending)
            .map_err(OutputError::Send)?;
        self.pending.clear();
        Ok(())
    }
}
