//! The per-connection event loop.
//!
//! A [`Session`] owns the translation state for one connected client: the
//! mapping stage, the send buffer, the two timers (scheduled flush and
//! pending input timeout) and the set of latched virtual keys. It runs
//! single-threaded; the only suspension point is the device read, which
//! takes a deadline derived from the timers and an interrupt descriptor so
//! client messages can cut the wait short.
//!
//! Each loop iteration, in order: wait for input, translate it, fire a due
//! input timeout, flush the send buffer, drain client messages (only while
//! no output key is held down, so a configuration swap can never strand a
//! pressed key), and check for a matched exit sequence.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use keyflux_core::{
    DeviceIndex, Key, KeyEvent, KeySequence, KeyState, Message, Stage, TimeoutKind,
    NO_DEVICE_INDEX,
};

use crate::application::debounce::KeyDebouncer;
use crate::infrastructure::control::ClientPort;
use crate::infrastructure::devices::{to_key_events, DeviceSet};
use crate::infrastructure::output::VirtualDevice;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// An exit mapping fired; the daemon should terminate gracefully.
    ExitRequested,
    /// A device, socket or output failure; the daemon recycles the devices
    /// and waits for the client to reconnect.
    ConnectionLost,
}

enum ControlFlow {
    Continue,
    EndSession,
}

pub struct Session<'a, D: DeviceSet, V: VirtualDevice, C: ClientPort> {
    devices: &'a mut D,
    output: &'a mut V,
    client: &'a mut C,
    stage: Stage,
    debouncer: Option<KeyDebouncer>,

    send_buffer: KeySequence,
    virtual_keys_down: Vec<Key>,
    flush_scheduled_at: Option<Instant>,
    input_timeout_start: Option<Instant>,
    input_timeout: Duration,
    last_key_event: KeyEvent,
    last_device_index: DeviceIndex,
    pending_inputs: VecDeque<(KeyEvent, DeviceIndex)>,
}

impl<'a, D: DeviceSet, V: VirtualDevice, C: ClientPort> Session<'a, D, V, C> {
    pub fn new(
        devices: &'a mut D,
        output: &'a mut V,
        client: &'a mut C,
        stage: Stage,
        debouncer: Option<KeyDebouncer>,
    ) -> Self {
        Self {
            devices,
            output,
            client,
            stage,
            debouncer,
            send_buffer: KeySequence::new(),
            virtual_keys_down: Vec::new(),
            flush_scheduled_at: None,
            input_timeout_start: None,
            input_timeout: Duration::ZERO,
            last_key_event: KeyEvent::none(),
            last_device_index: NO_DEVICE_INDEX,
            pending_inputs: VecDeque::new(),
        }
    }

    pub fn run(&mut self) -> SessionEnd {
        loop {
            let now = Instant::now();

            // wait no longer than the nearest timer
            let mut timeout: Option<Duration> = None;
            let mut consider = |deadline: Instant| {
                let remaining = deadline.saturating_duration_since(now);
                timeout = Some(timeout.map_or(remaining, |t: Duration| t.min(remaining)));
            };
            if let Some(at) = self.flush_scheduled_at {
                consider(at);
            }
            if let Some(start) = self.input_timeout_start {
                consider(start + self.input_timeout);
            }

            // while an output key is down a configuration swap could strand
            // it, so the client only interrupts when everything is released
            let interrupt = if self.stage.is_output_down() {
                None
            } else {
                self.client.interrupt_fd()
            };

            let event = match self.devices.read_input_event(timeout, interrupt) {
                Ok(event) => event,
                Err(e) => {
                    warn!("reading input failed: {e}");
                    return SessionEnd::ConnectionLost;
                }
            };

            let now = Instant::now();

            if let Some(raw) = event {
                let key_events = to_key_events(&raw);
                if key_events.is_empty() {
                    // forward other event kinds verbatim, right away
                    if self
                        .output
                        .send_event(raw.event_type, raw.code, raw.value)
                        .and_then(|_| self.output.flush())
                        .is_err()
                    {
                        warn!("forwarding event failed");
                        return SessionEnd::ConnectionLost;
                    }
                    continue;
                }
                for key_event in key_events {
                    self.translate_input(key_event, raw.device_index);
                }
            }

            // a pending input timeout that expired fires as a synthetic event
            if let Some(start) = self.input_timeout_start {
                if now >= start + self.input_timeout {
                    self.input_timeout_start = None;
                    let elapsed = self.input_timeout;
                    self.translate_input(
                        KeyEvent::timeout(TimeoutKind::AwaitInput, elapsed),
                        self.last_device_index,
                    );
                }
            }

            if self.flush_scheduled_at.map_or(true, |at| now > at) {
                self.flush_scheduled_at = None;
                if !self.flush_send_buffer() {
                    warn!("sending output failed");
                    return SessionEnd::ConnectionLost;
                }
            }

            if interrupt.is_some() {
                match self.drain_client_messages() {
                    ControlFlow::Continue => {}
                    ControlFlow::EndSession => return SessionEnd::ConnectionLost,
                }
            }

            if self.stage.should_exit() {
                info!("exit sequence matched");
                return SessionEnd::ExitRequested;
            }
        }
    }

    /// Runs one input through the stage, plus whatever it spawns: a pending
    /// input timeout is cancelled by reporting the elapsed time first, and
    /// virtual-key toggles during a flush re-enter here. The queue makes
    /// those inner translations iterative instead of recursive.
    fn translate_input(&mut self, input: KeyEvent, device_index: DeviceIndex) {
        self.pending_inputs.push_back((input, device_index));
        while let Some((input, device_index)) = self.pending_inputs.pop_front() {
            self.translate_one(input, device_index);
        }
    }

    fn translate_one(&mut self, input: KeyEvent, device_index: DeviceIndex) {
        // ignore key repeat while a flush or an input timeout is pending
        if input == self.last_key_event
            && (self.flush_scheduled_at.is_some() || self.input_timeout_start.is_some())
        {
            return;
        }

        // new input cuts a pending timeout short; the stage hears about the
        // elapsed time before the event itself
        if let Some(start) = self.input_timeout_start.take() {
            let elapsed = start.elapsed();
            self.pending_inputs.push_front((input, device_index));
            self.pending_inputs.push_front((
                KeyEvent::timeout(TimeoutKind::AwaitInput, elapsed),
                device_index,
            ));
            return;
        }

        self.last_key_event = input;
        self.last_device_index = device_index;

        let mut output = self.stage.update(input, device_index);
        trace!("translated {input} -> {}", format_sequence(&output));

        // a trailing AwaitInput marker arms the input timer
        if let Some(&last) = output.last() {
            if last.key == Key::Timeout(TimeoutKind::AwaitInput) {
                output.pop();
                self.input_timeout_start = Some(Instant::now());
                self.input_timeout = last.timeout;
            }
        }

        self.send_buffer.extend(output.iter().copied());
        self.stage.reuse_buffer(output);
    }

    /// Walks the send buffer from the front, dispatching each event to its
    /// consumer. Stops early when an output pause is consumed or a press is
    /// being debounced; the remainder stays queued for the rescheduled
    /// flush. Returns `false` when the virtual device failed.
    fn flush_send_buffer(&mut self) -> bool {
        let mut consumed = 0;
        while consumed < self.send_buffer.len() {
            let event = self.send_buffer[consumed];
            let is_last = consumed + 1 == self.send_buffer.len();

            match event.key {
                Key::Action(index) => {
                    if event.state == KeyState::Down {
                        if let Err(e) = self.client.send_triggered_action(u32::from(index)) {
                            warn!("reporting action {index} failed: {e}");
                        }
                    }
                    consumed += 1;
                }
                Key::Virtual(_) => {
                    if event.state == KeyState::Down {
                        self.toggle_virtual_key(event.key);
                    }
                    consumed += 1;
                }
                Key::Timeout(TimeoutKind::Output) => {
                    // pause; the rest of the buffer follows after it
                    self.schedule_flush(event.timeout);
                    consumed += 1;
                    break;
                }
                Key::Timeout(TimeoutKind::AwaitInput) | Key::None => {
                    debug_assert!(false, "{event} does not belong in the send buffer");
                    consumed += 1;
                }
                Key::Code(_) => {
                    if event.state == KeyState::Down {
                        if let Some(debouncer) = self.debouncer.as_mut() {
                            let delay = debouncer.on_key_down(event.key, !is_last);
                            if !delay.is_zero() {
                                // not consumed; retried when the timer fires
                                self.schedule_flush(delay);
                                break;
                            }
                        }
                    }
                    if self.output.send_key_event(&event).is_err() {
                        return false;
                    }
                    consumed += 1;
                }
            }
        }
        self.send_buffer.drain(..consumed);
        self.output.flush().is_ok()
    }

    /// Flips a latch and reports the new state back through the stage, so
    /// mappings conditioned on it see the change before the rest of the
    /// buffer drains.
    fn toggle_virtual_key(&mut self, key: Key) {
        let state = if let Some(i) = self.virtual_keys_down.iter().position(|&held| held == key) {
            self.virtual_keys_down.remove(i);
            KeyState::Up
        } else {
            self.virtual_keys_down.push(key);
            KeyState::Down
        };
        debug!("virtual key {key} toggled {state:?}");
        self.translate_input(KeyEvent::new(key, state), NO_DEVICE_INDEX);
    }

    /// Arms the flush timer; an already scheduled flush is never postponed.
    fn schedule_flush(&mut self, delay: Duration) {
        if self.flush_scheduled_at.is_none() {
            self.flush_scheduled_at = Some(Instant::now() + delay);
        }
    }

    fn drain_client_messages(&mut self) -> ControlFlow {
        let messages = match self.client.read_messages(Some(Duration::ZERO)) {
            Ok(messages) => messages,
            Err(e) => {
                info!("client connection ended: {e}");
                return ControlFlow::EndSession;
            }
        };
        for message in messages {
            match message {
                Message::Configuration(config) => {
                    debug!("received configuration");
                    if config.has_mouse_mappings() != self.stage.has_mouse_mappings() {
                        // the device grab no longer covers the right set;
                        // recycle the whole session
                        info!("mouse usage in configuration changed");
                        return ControlFlow::EndSession;
                    }
                    let mut stage = Stage::new(config);
                    stage.set_grabbed_devices(self.devices.device_names());
                    self.stage = stage;
                    // latches belong to the replaced configuration
                    self.virtual_keys_down.clear();
                }
                Message::ActiveContexts(indices) => {
                    debug!("received active contexts ({})", indices.len());
                    self.stage.set_active_contexts(&indices);
                }
                Message::TriggeredAction(_) => {
                    warn!("client sent a daemon-only message");
                    return ControlFlow::EndSession;
                }
            }
        }
        ControlFlow::Continue
    }
}

fn format_sequence(sequence: &KeySequence) -> String {
    let parts: Vec<String> = sequence.iter().map(ToString::to_string).collect();
    parts.join(" ")
}
