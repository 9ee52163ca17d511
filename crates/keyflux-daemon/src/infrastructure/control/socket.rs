//! Unix-socket implementation of the control channel.

use std::io::{ErrorKind, Read, Write};
use std::os::fd::BorrowedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags};
use tracing::info;

use keyflux_core::protocol::codec::{decode_message, encode_message};
use keyflux_core::Message;

use super::{ClientPort, ConnectionState, PortError};

pub struct UnixClientPort {
    listener: UnixListener,
    stream: Option<UnixStream>,
    state: ConnectionState,
    read_buffer: Vec<u8>,
    path: PathBuf,
}

impl UnixClientPort {
    /// Binds the well-known endpoint. A stale socket file from a previous
    /// run is replaced.
    pub fn bind(path: &Path) -> Result<Self, PortError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let listener = UnixListener::bind(path)?;
        info!("listening on {}", path.display());
        Ok(Self {
            listener,
            stream: None,
            state: ConnectionState::Listening,
            read_buffer: Vec::new(),
            path: path.to_path_buf(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Blocks until a client connects.
    pub fn accept(&mut self) -> Result<(), PortError> {
        let (stream, _) = self.listener.accept()?;
        stream.set_nonblocking(true)?;
        self.read_buffer.clear();
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
        self.read_buffer.clear();
        self.state = ConnectionState::Listening;
    }

    fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool, PortError> {
        let timeout_ms: i32 = match timeout {
            Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };
        // SAFETY: the descriptor belongs to the stream owned by self.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(&borrowed, PollFlags::POLLIN)];
        match poll(&mut fds, timeout_ms) {
            Ok(n) => Ok(n > 0),
            Err(nix::errno::Errno::EINTR) => Ok(false),
            Err(e) => Err(PortError::Io(std::io::Error::from_raw_os_error(e as i32))),
        }
    }

    fn wait_writable(fd: RawFd) -> Result<(), PortError> {
        // SAFETY: as above.
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(&borrowed, PollFlags::POLLOUT)];
        match poll(&mut fds, 1000) {
            Ok(_) => Ok(()),
            Err(nix::errno::Errno::EINTR) => Ok(()),
            Err(e) => Err(PortError::Io(std::io::Error::from_raw_os_error(e as i32))),
        }
    }
}

impl Drop for UnixClientPort {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl ClientPort for UnixClientPort {
    fn interrupt_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|stream| stream.as_raw_fd())
    }

    fn read_messages(&mut self, timeout: Option<Duration>) -> Result<Vec<Message>, PortError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(PortError::Disconnected);
        };

        if !matches!(timeout, Some(Duration::ZERO))
            && !Self::wait_readable(stream.as_raw_fd(), timeout)?
        {
            return Ok(Vec::new());
        }

        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    self.disconnect();
                    return Err(PortError::Disconnected);
                }
                Ok(n) => self.read_buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.disconnect();
                    return Err(e.into());
                }
            }
        }

        let mut messages = Vec::new();
        let mut offset = 0;
        loop {
            match decode_message(&self.read_buffer[offset..]) {
                Ok((message, consumed)) => {
                    messages.push(message);
                    offset += consumed;
                }
                Err(e) if e.is_incomplete() => break,
                Err(e) => {
                    self.disconnect();
                    return Err(e.into());
                }
            }
        }
        self.read_buffer.drain(..offset);
        Ok(messages)
    }

    fn send_triggered_action(&mut self, index: u32) -> Result<(), PortError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(PortError::Disconnected);
        };
        let bytes = encode_message(&Message::TriggeredAction(index));
        let mut written = 0;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    Self::wait_writable(stream.as_raw_fd())?;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.disconnect();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}
