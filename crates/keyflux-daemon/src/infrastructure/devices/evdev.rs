//! evdev-backed device grabbing for Linux.
//!
//! Devices are opened non-blocking and grabbed with `EVIOCGRAB`, so their
//! events reach only this daemon. A single `poll(2)` multiplexes every
//! device descriptor plus the optional interrupt descriptor, which is how
//! the event loop waits on devices, timers and the control socket at once
//! from one thread.

use std::collections::VecDeque;
use std::os::fd::BorrowedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use evdev::Device;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags};
use tracing::{debug, warn};

use super::{DeviceError, DeviceSet, RawInputEvent, EV_SYN};

pub struct EvdevDeviceSet {
    devices: Vec<Device>,
    names: Vec<String>,
    queue: VecDeque<RawInputEvent>,
}

impl EvdevDeviceSet {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            names: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    fn release(&mut self) {
        for device in &mut self.devices {
            let _ = device.ungrab();
        }
        self.devices.clear();
        self.names.clear();
        self.queue.clear();
    }

    fn is_keyboard(device: &Device) -> bool {
        device
            .supported_keys()
            .map_or(false, |keys| keys.contains(evdev::Key::KEY_A))
    }

    fn is_pointer(device: &Device) -> bool {
        device
            .supported_keys()
            .map_or(false, |keys| keys.contains(evdev::Key::BTN_LEFT))
    }

    fn set_nonblocking(fd: RawFd) -> Result<(), DeviceError> {
        let current = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL).map_err(io_error)?);
        fcntl(fd, FcntlArg::F_SETFL(current | OFlag::O_NONBLOCK)).map_err(io_error)?;
        Ok(())
    }

    /// Reads everything a ready device has queued into the event queue.
    fn drain_device(&mut self, index: usize) -> Result<(), DeviceError> {
        let device = &mut self.devices[index];
        let events = device.fetch_events()?;
        for event in events {
            // the virtual device emits its own sync markers on flush
            if event.event_type().0 == EV_SYN {
                continue;
            }
            self.queue.push_back(RawInputEvent {
                device_index: index,
                event_type: event.event_type().0,
                code: event.code(),
                value: event.value(),
            });
        }
        Ok(())
    }
}

impl Default for EvdevDeviceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EvdevDeviceSet {
    fn drop(&mut self) {
        self.release();
    }
}

impl DeviceSet for EvdevDeviceSet {
    fn grab(
        &mut self,
        virtual_device_name: &str,
        include_pointer: bool,
    ) -> Result<(), DeviceError> {
        self.release();

        for (path, mut device) in evdev::enumerate() {
            let name = device.name().unwrap_or("").to_string();
            // never capture our own output device
            if name == virtual_device_name {
                continue;
            }
            let wanted =
                Self::is_keyboard(&device) || (include_pointer && Self::is_pointer(&device));
            if !wanted {
                continue;
            }
            Self::set_nonblocking(device.as_raw_fd())?;
            if let Err(e) = device.grab() {
                warn!("could not grab {name:?} ({}): {e}", path.display());
                continue;
            }
            debug!("grabbed {name:?} ({})", path.display());
            self.devices.push(device);
            self.names.push(name);
        }

        if self.devices.is_empty() {
            return Err(DeviceError::NoDevices);
        }
        Ok(())
    }

    fn device_names(&self) -> &[String] {
        &self.names
    }

    fn read_input_event(
        &mut self,
        timeout: Option<Duration>,
        interrupt: Option<RawFd>,
    ) -> Result<Option<RawInputEvent>, DeviceError> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Some(event));
            }

            let timeout_ms: i32 = match timeout {
                Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
                None => -1,
            };

            let raw_fds: Vec<RawFd> = self
                .devices
                .iter()
                .map(|device| device.as_raw_fd())
                .chain(interrupt)
                .collect();
            // SAFETY: the descriptors stay open for the duration of the
            // poll; devices are owned by self and the interrupt by the
            // caller's client port.
            let borrowed_fds: Vec<BorrowedFd> = raw_fds
                .iter()
                .map(|&fd| unsafe { BorrowedFd::borrow_raw(fd) })
                .collect();
            let mut fds: Vec<PollFd> = borrowed_fds
                .iter()
                .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
                .collect();

            let ready = match poll(&mut fds, timeout_ms) {
                Ok(n) => n,
                Err(Errno::EINTR) => return Ok(None),
                Err(e) => return Err(io_error(e)),
            };
            if ready == 0 {
                // timeout
                return Ok(None);
            }

            if interrupt.is_some() {
                let interrupted = fds
                    .last()
                    .and_then(|fd| fd.revents())
                    .map_or(false, |revents| !revents.is_empty());
                if interrupted {
                    return Ok(None);
                }
            }

            let ready_devices: Vec<usize> = fds[..self.devices.len()]
                .iter()
                .enumerate()
                .filter(|(_, fd)| {
                    fd.revents().map_or(false, |revents| !revents.is_empty())
                })
                .map(|(i, _)| i)
                .collect();
            drop(fds);
            for index in ready_devices {
                self.drain_device(index)?;
            }
        }
    }
}

fn io_error(errno: Errno) -> DeviceError {
    DeviceError::Io(std::io::Error::from_raw_os_error(errno as i32))
}
