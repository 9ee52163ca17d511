//! The mapping state machine.
//!
//! The [`Stage`] consumes one key event at a time together with the index of
//! the device it came from and produces the remapped output sequence. It
//! never performs I/O and never fails; everything it needs to know about the
//! outside world arrives through [`Stage::update`], [`set_active_contexts`]
//! and [`set_grabbed_devices`].
//!
//! # How an update proceeds
//!
//! Presses are appended to the rolling window and the window is re-matched
//! against every mapping of every applicable context. Three things can come
//! out of that:
//!
//! - a mapping matches: its output is emitted, the matched presses are
//!   marked so their releases stay silent, and matching continues in case
//!   more of the window can be consumed;
//! - some mapping could still match once more input arrives: the undecided
//!   events stay buffered and nothing is emitted (if the missing piece is a
//!   period of silence, the returned sequence ends with an `AwaitInput`
//!   marker asking the event loop to start a timer);
//! - nothing matches: the oldest undecided event is forwarded unchanged and
//!   matching restarts on the remainder.
//!
//! Releases of keys whose press produced output release exactly what that
//! press emitted; releases of still-buffered presses join the window so
//! patterns with explicit releases can complete.
//!
//! [`set_active_contexts`]: Stage::set_active_contexts
//! [`set_grabbed_devices`]: Stage::set_grabbed_devices

mod matcher;

use std::mem;
use std::time::Duration;

use smallvec::SmallVec;

use crate::domain::config::{CompiledConfig, DeviceFilter, MappingTarget};
use crate::domain::key::{
    DeviceIndex, Key, KeyEvent, KeySequence, KeyState, TimeoutKind, NO_DEVICE_INDEX,
};
use matcher::{key_is_down, match_pattern, MatchDetails, MatchResult};

/// An output key currently held down, and the input key whose release will
/// let go of it.
#[derive(Debug, Clone, Copy)]
struct OutputDown {
    key: Key,
    trigger: Key,
}

/// Decision for the current window state.
enum Outcome {
    Matched {
        context: usize,
        mapping: usize,
        details: MatchDetails,
    },
    Buffer {
        awaits: Option<Duration>,
    },
    NoMatch,
}

pub struct Stage {
    config: CompiledConfig,
    /// Context activation as pushed by the client; all contexts start active.
    active_contexts: Vec<bool>,
    /// Per context, per grabbed-device index: does the context's device
    /// filter match that device. Empty until devices are known.
    device_matches: Vec<Vec<bool>>,
    /// Rolling record of recent input: undecided presses and releases,
    /// presses that already produced output, and elapsed-timeout markers.
    window: Vec<KeyEvent>,
    output_down: Vec<OutputDown>,
    exit_requested: bool,
    /// Recycled output buffer; see [`Stage::reuse_buffer`].
    spare_buffer: KeySequence,
}

impl Stage {
    pub fn new(config: CompiledConfig) -> Self {
        let context_count = config.contexts.len();
        Self {
            config,
            active_contexts: vec![true; context_count],
            device_matches: Vec::new(),
            window: Vec::new(),
            output_down: Vec::new(),
            exit_requested: false,
            spare_buffer: KeySequence::new(),
        }
    }

    /// Replaces the set of active contexts. Indices out of range are
    /// ignored.
    pub fn set_active_contexts(&mut self, indices: &[u32]) {
        for slot in &mut self.active_contexts {
            *slot = false;
        }
        for &index in indices {
            if let Some(slot) = self.active_contexts.get_mut(index as usize) {
                *slot = true;
            }
        }
    }

    /// Re-evaluates every context's device filter against the grabbed
    /// device names.
    pub fn set_grabbed_devices<S: AsRef<str>>(&mut self, device_names: &[S]) {
        self.device_matches = self
            .config
            .contexts
            .iter()
            .map(|context| {
                device_names
                    .iter()
                    .map(|name| context.device_filter.matches(name.as_ref()))
                    .collect()
            })
            .collect();
    }

    /// Whether any mapping involves mouse buttons or wheel motion, deciding
    /// at connect time whether pointer devices must be grabbed.
    pub fn has_mouse_mappings(&self) -> bool {
        self.config.has_mouse_mappings()
    }

    /// Whether any output key is currently held down on the virtual device.
    /// While this is true, configuration swaps are deferred to avoid stuck
    /// keys.
    pub fn is_output_down(&self) -> bool {
        !self.output_down.is_empty()
    }

    /// True once an exit mapping has fired.
    pub fn should_exit(&self) -> bool {
        self.exit_requested
    }

    /// Hands a previously returned sequence back for reuse, so steady-state
    /// translation allocates nothing.
    pub fn reuse_buffer(&mut self, mut buffer: KeySequence) {
        buffer.clear();
        self.spare_buffer = buffer;
    }

    /// Translates one input event into an output sequence.
    ///
    /// When the returned sequence ends with an
    /// [`AwaitInput`](TimeoutKind::AwaitInput) marker the caller must start
    /// a timer for the marker's duration and feed the elapsed time back as a
    /// synthetic timeout event, either when the timer fires or earlier when
    /// new input cuts it short.
    pub fn update(&mut self, event: KeyEvent, device_index: DeviceIndex) -> KeySequence {
        let mut output = mem::take(&mut self.spare_buffer);
        match (event.key, event.state) {
            (Key::Timeout(_), _) => {
                // elapsed-time report; timed patterns inspect it in place
                self.window
                    .push(KeyEvent::timeout(TimeoutKind::AwaitInput, event.timeout));
                self.match_window(device_index, &mut output);
            }
            (Key::None, _) => {}
            (_, KeyState::Down) => {
                if key_is_down(&self.window, event.key) {
                    // key repeat: voice the outputs this key is holding again
                    for held in &self.output_down {
                        if held.trigger == event.key && matches!(held.key, Key::Code(_)) {
                            output.push(KeyEvent::down(held.key));
                        }
                    }
                    return output;
                }
                self.window.push(KeyEvent::down(event.key));
                self.match_window(device_index, &mut output);
            }
            (_, KeyState::Up) => self.key_released(event.key, device_index, &mut output),
            _ => {}
        }
        output
    }

    fn key_released(&mut self, key: Key, device_index: DeviceIndex, output: &mut KeySequence) {
        let position = self.window.iter().rposition(|entry| {
            entry.key == key && matches!(entry.state, KeyState::Down | KeyState::DownMatched)
        });
        match position {
            Some(i) if self.window[i].state == KeyState::DownMatched => {
                self.window.remove(i);
                self.release_triggered(key, output);
            }
            Some(_) => {
                // the press is still buffered; the release may complete a
                // pattern with an explicit release
                self.window.push(KeyEvent::up(key));
                self.match_window(device_index, output);
            }
            Option::None => {
                // pressed before the grab started; forward the release so
                // the key does not stay stuck
                if matches!(key, Key::Code(_)) {
                    output.push(KeyEvent::up(key));
                }
            }
        }
    }

    fn match_window(&mut self, device_index: DeviceIndex, output: &mut KeySequence) {
        while self.window.iter().any(is_undecided) {
            match self.find_match(device_index) {
                Outcome::Matched {
                    context,
                    mapping,
                    details,
                } => self.apply_match(context, mapping, details, output),
                Outcome::Buffer { awaits } => {
                    if let Some(duration) = awaits {
                        output.push(KeyEvent::timeout(TimeoutKind::AwaitInput, duration));
                    }
                    return;
                }
                Outcome::NoMatch => self.forward_first_undecided(output),
            }
        }
    }

    fn find_match(&self, device_index: DeviceIndex) -> Outcome {
        let mut best: Option<(usize, usize, MatchDetails)> = Option::None;
        let mut saw_partial = false;
        let mut awaits: Option<Duration> = Option::None;

        // Later contexts win, so scan in reverse; the first context with a
        // full match freezes the candidate and the rest of the scan only
        // looks for still-possible longer matches.
        for ci in (0..self.config.contexts.len()).rev() {
            if !self.context_applies(ci, device_index) {
                continue;
            }
            for (mi, mapping) in self.config.contexts[ci].mappings.iter().enumerate() {
                match match_pattern(&mapping.input, &self.window) {
                    MatchResult::Match(details) => {
                        // a match that consumes nothing would not make progress
                        if details.consumed.is_empty() {
                            continue;
                        }
                        let replace = match &best {
                            Option::None => true,
                            Some((best_ci, _, best_details)) => {
                                *best_ci == ci && details.weight > best_details.weight
                            }
                        };
                        if replace {
                            best = Some((ci, mi, details));
                        }
                    }
                    MatchResult::Partial { awaits: wanted } => {
                        saw_partial = true;
                        awaits = match (awaits, wanted) {
                            (Option::None, w) => w,
                            (a, Option::None) => a,
                            (Some(a), Some(w)) => Some(a.min(w)),
                        };
                    }
                    MatchResult::NoMatch => {}
                }
            }
        }

        if let Some((context, mapping, details)) = best {
            // A full match normally defers to a still-possible longer
            // pattern. When the last window entry is a fired timer the
            // silence the match waited for has actually happened, so it
            // fires even though other patterns remain possible.
            let completed_by_timeout = self
                .window
                .last()
                .map_or(false, |entry| entry.key.is_timeout_key())
                && details.consumed.last() == Some(&(self.window.len() - 1));
            if !saw_partial || completed_by_timeout {
                return Outcome::Matched {
                    context,
                    mapping,
                    details,
                };
            }
        }
        if saw_partial {
            Outcome::Buffer { awaits }
        } else {
            Outcome::NoMatch
        }
    }

    fn context_applies(&self, context_index: usize, device_index: DeviceIndex) -> bool {
        if !self.active_contexts[context_index] {
            return false;
        }
        // synthetic events (virtual-key feedback, timeouts) match any filter
        if device_index == NO_DEVICE_INDEX {
            return true;
        }
        match self.device_matches.get(context_index) {
            Some(bits) if !bits.is_empty() => bits.get(device_index).copied().unwrap_or(false),
            _ => matches!(
                self.config.contexts[context_index].device_filter,
                DeviceFilter::Any
            ),
        }
    }

    fn apply_match(
        &mut self,
        context_index: usize,
        mapping_index: usize,
        details: MatchDetails,
        output: &mut KeySequence,
    ) {
        let resolved: Option<KeySequence> =
            match &self.config.contexts[context_index].mappings[mapping_index].target {
                MappingTarget::Exit => {
                    self.exit_requested = true;
                    Option::None
                }
                MappingTarget::Keys(sequence) => Some(sequence.clone()),
                MappingTarget::Command(index) => Some(self.resolve_command(*index)),
            };

        // Consume the matched entries: presses stay in the window so their
        // releases are recognized, releases retire their press, timeout
        // markers disappear.
        let mut remove: SmallVec<[usize; 8]> = SmallVec::new();
        for &i in &details.consumed {
            let entry = self.window[i];
            if entry.key.is_timeout_key() {
                remove.push(i);
                continue;
            }
            match entry.state {
                KeyState::Down => self.window[i].state = KeyState::DownMatched,
                KeyState::Up => {
                    remove.push(i);
                    if let Some(j) = self.window[..i].iter().rposition(|press| {
                        press.key == entry.key && press.state == KeyState::DownMatched
                    }) {
                        remove.push(j);
                    }
                }
                _ => {}
            }
        }
        remove.sort_unstable();
        remove.dedup();
        for &i in remove.iter().rev() {
            self.window.remove(i);
        }

        let Some(sequence) = resolved else { return };
        let trigger = details.trigger;
        for (i, ev) in sequence.iter().enumerate() {
            match ev.key {
                Key::None => {}
                Key::Timeout(_) => {
                    output.push(KeyEvent::timeout(TimeoutKind::Output, ev.timeout));
                }
                _ => match ev.state {
                    KeyState::Down => {
                        let released_later = sequence[i + 1..]
                            .iter()
                            .any(|later| later.key == ev.key && later.state == KeyState::Up);
                        // a physical key held by another trigger must not be
                        // pressed a second time
                        let already_held = matches!(ev.key, Key::Code(_))
                            && self.output_down.iter().any(|held| held.key == ev.key);
                        if !released_later {
                            self.output_down.push(OutputDown {
                                key: ev.key,
                                trigger,
                            });
                        }
                        if !already_held {
                            output.push(KeyEvent::down(ev.key));
                        }
                    }
                    KeyState::Up => {
                        // mirror of the press suppression above: a key still
                        // held by another trigger must not be released by
                        // this tap
                        let still_held = matches!(ev.key, Key::Code(_))
                            && self.output_down.iter().any(|held| held.key == ev.key);
                        if !still_held {
                            output.push(KeyEvent::up(ev.key));
                        }
                    }
                    _ => {}
                },
            }
        }

        // A pattern ending in a release leaves no held trigger; close the
        // held outputs right away.
        if !key_is_down(&self.window, trigger) {
            self.release_triggered(trigger, output);
        }
    }

    /// Resolves a command against the active contexts, later contexts first,
    /// falling back to the command's default output.
    fn resolve_command(&self, index: u16) -> KeySequence {
        for ci in (0..self.config.contexts.len()).rev() {
            if !self.active_contexts[ci] {
                continue;
            }
            let overrides = &self.config.contexts[ci].command_overrides;
            if let Some((_, sequence)) = overrides.iter().find(|(i, _)| *i == index) {
                return sequence.clone();
            }
        }
        self.config
            .commands
            .get(index as usize)
            .map(|command| command.output.clone())
            .unwrap_or_default()
    }

    /// Emits the oldest undecided window event unchanged.
    fn forward_first_undecided(&mut self, output: &mut KeySequence) {
        let Some(i) = self.window.iter().position(is_undecided) else {
            return;
        };
        let entry = self.window[i];
        if entry.key.is_timeout_key() {
            self.window.remove(i);
            return;
        }
        match entry.state {
            KeyState::Down => {
                // virtual and action keys never reach the device themselves
                if matches!(entry.key, Key::Code(_)) {
                    output.push(KeyEvent::down(entry.key));
                    self.output_down.push(OutputDown {
                        key: entry.key,
                        trigger: entry.key,
                    });
                }
                self.window[i].state = KeyState::DownMatched;
            }
            KeyState::Up => {
                self.window.remove(i);
                if let Some(j) = self.window[..i].iter().rposition(|press| {
                    press.key == entry.key && press.state == KeyState::DownMatched
                }) {
                    self.window.remove(j);
                }
                self.release_triggered(entry.key, output);
            }
            _ => {}
        }
    }

    /// Releases every output key held by `trigger`, newest first. The
    /// release is suppressed while another trigger still holds the same key.
    fn release_triggered(&mut self, trigger: Key, output: &mut KeySequence) {
        let mut i = self.output_down.len();
        while i > 0 {
            i -= 1;
            if self.output_down[i].trigger != trigger {
                continue;
            }
            let entry = self.output_down.remove(i);
            let still_held = self.output_down.iter().any(|held| held.key == entry.key);
            if !still_held {
                output.push(KeyEvent::up(entry.key));
            }
        }
    }
}

fn is_undecided(entry: &KeyEvent) -> bool {
    matches!(entry.state, KeyState::Down | KeyState::Up)
}
