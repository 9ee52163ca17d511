//! Mock device set for the event loop tests.
//!
//! Tests script a timeline of events and gaps; the mock honors read
//! deadlines against that timeline, so timer-driven behavior (flush
//! scheduling, input timeouts, debouncing) runs exactly as it would against
//! real devices, just on a compressed clock.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

use super::{DeviceError, DeviceSet, RawInputEvent, EV_KEY};

enum Step {
    Event(RawInputEvent),
    /// Quiet time before the next scripted event.
    Gap(Duration),
    /// The interrupt descriptor became readable (the client sent data).
    Interrupt,
}

pub struct MockDeviceSet {
    names: Vec<String>,
    script: VecDeque<Step>,
    grabbed: Vec<(String, bool)>,
}

impl MockDeviceSet {
    pub fn new<S: Into<String>>(names: Vec<S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            script: VecDeque::new(),
            grabbed: Vec::new(),
        }
    }

    /// Scripts a raw event, delivered as soon as it is reached.
    pub fn push_event(&mut self, event: RawInputEvent) {
        self.script.push_back(Step::Event(event));
    }

    /// Scripts a key press or release on the given device.
    pub fn push_key(&mut self, device_index: usize, code: u16, pressed: bool) {
        self.push_event(RawInputEvent {
            device_index,
            event_type: EV_KEY,
            code,
            value: i32::from(pressed),
        });
    }

    /// Scripts a period of silence before the next event.
    pub fn push_gap(&mut self, gap: Duration) {
        self.script.push_back(Step::Gap(gap));
    }

    /// Scripts an interrupted wait, as when the client socket turns
    /// readable.
    pub fn push_interrupt(&mut self) {
        self.script.push_back(Step::Interrupt);
    }

    /// Arguments of every `grab` call, for assertions.
    pub fn grab_calls(&self) -> &[(String, bool)] {
        &self.grabbed
    }
}

impl DeviceSet for MockDeviceSet {
    fn grab(
        &mut self,
        virtual_device_name: &str,
        include_pointer: bool,
    ) -> Result<(), DeviceError> {
        self.grabbed
            .push((virtual_device_name.to_string(), include_pointer));
        Ok(())
    }

    fn device_names(&self) -> &[String] {
        &self.names
    }

    fn read_input_event(
        &mut self,
        timeout: Option<Duration>,
        _interrupt: Option<RawFd>,
    ) -> Result<Option<RawInputEvent>, DeviceError> {
        match self.script.pop_front() {
            Some(Step::Event(event)) => Ok(Some(event)),
            Some(Step::Interrupt) => Ok(None),
            Some(Step::Gap(gap)) => match timeout {
                // the deadline expires inside the gap
                Some(limit) if limit < gap => {
                    thread::sleep(limit);
                    self.script.push_front(Step::Gap(gap - limit));
                    Ok(None)
                }
                _ => {
                    thread::sleep(gap);
                    match self.script.pop_front() {
                        Some(Step::Event(event)) => Ok(Some(event)),
                        Some(step) => {
                            self.script.push_front(step);
                            Ok(None)
                        }
                        None => Ok(None),
                    }
                }
            },
            // script exhausted: let a pending deadline fire, otherwise end
            // the session the way a vanished device would
            None => match timeout {
                Some(limit) => {
                    thread::sleep(limit);
                    Ok(None)
                }
                None => Err(DeviceError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "scripted input exhausted",
                ))),
            },
        }
    }
}
