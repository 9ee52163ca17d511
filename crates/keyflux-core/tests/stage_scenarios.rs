//! End-to-end scenarios for the mapping state machine, driven the way the
//! daemon's event loop drives it: one event at a time, with virtual-key
//! toggles and timer expirations fed back as synthetic events.

use std::time::Duration;

use smallvec::smallvec;

use keyflux_core::domain::codes::{
    KEY_1, KEY_A, KEY_B, KEY_C, KEY_J, KEY_LEFT, KEY_LEFTCTRL, KEY_X,
};
use keyflux_core::{
    CompiledConfig, Context, DeviceFilter, Key, KeyEvent, KeySequence, KeyState, Mapping,
    MappingTarget, Stage, TimeoutKind, NO_DEVICE_INDEX,
};

fn down(code: u16) -> KeyEvent {
    KeyEvent::down(Key::Code(code))
}

fn up(code: u16) -> KeyEvent {
    KeyEvent::up(Key::Code(code))
}

fn single_context(mappings: Vec<Mapping>) -> CompiledConfig {
    CompiledConfig {
        commands: Vec::new(),
        contexts: vec![Context {
            device_filter: DeviceFilter::Any,
            mappings,
            command_overrides: Vec::new(),
        }],
    }
}

fn keys(input: KeySequence, output: KeySequence) -> Mapping {
    Mapping {
        input,
        target: MappingTarget::Keys(output),
    }
}

/// Feeds events and collects everything the stage emits, handling the two
/// feedback channels the event loop normally provides: virtual-key toggles
/// and input-timeout requests (which this harness lets expire immediately
/// unless `silence` is false).
fn drive(stage: &mut Stage, events: &[KeyEvent], silence_for_timers: bool) -> Vec<KeyEvent> {
    let mut collected = Vec::new();
    let mut latched: Vec<Key> = Vec::new();
    for &event in events {
        let mut pending = vec![(event, 0usize)];
        while !pending.is_empty() {
            let (input, device) = pending.remove(0);
            let mut output = stage.update(input, device);

            // an AwaitInput marker at the end asks for a timer
            if let Some(&last) = output.last() {
                if last.key == Key::Timeout(TimeoutKind::AwaitInput) {
                    output.pop();
                    if silence_for_timers {
                        // pretend the full duration of silence passed
                        pending.push((
                            KeyEvent::timeout(TimeoutKind::AwaitInput, last.timeout),
                            NO_DEVICE_INDEX,
                        ));
                    }
                }
            }

            for out in output.iter().copied() {
                match out.key {
                    Key::Virtual(_) if out.state == KeyState::Down => {
                        // toggle the latch and report the new state back
                        let state = if let Some(i) = latched.iter().position(|&k| k == out.key) {
                            latched.remove(i);
                            KeyState::Up
                        } else {
                            latched.push(out.key);
                            KeyState::Down
                        };
                        pending.push((KeyEvent::new(out.key, state), NO_DEVICE_INDEX));
                    }
                    Key::Virtual(_) => {}
                    _ => collected.push(out),
                }
            }
            stage.reuse_buffer(output);
        }
    }
    collected
}

// ── S1: simple remap ──────────────────────────────────────────────────────────

#[test]
fn simple_remap_replaces_press_and_release() {
    let mut stage = Stage::new(single_context(vec![keys(
        smallvec![down(KEY_A)],
        smallvec![down(KEY_B)],
    )]));
    let out = drive(&mut stage, &[down(KEY_A), up(KEY_A)], false);
    assert_eq!(out, vec![down(KEY_B), up(KEY_B)]);
}

// ── S2: sequence on the left-hand side ────────────────────────────────────────

#[test]
fn sequence_fires_once_completed() {
    let mut stage = Stage::new(single_context(vec![keys(
        smallvec![down(KEY_A), down(KEY_B)],
        smallvec![down(KEY_C)],
    )]));
    let out = drive(
        &mut stage,
        &[down(KEY_A), down(KEY_B), up(KEY_B), up(KEY_A)],
        false,
    );
    assert_eq!(out, vec![down(KEY_C), up(KEY_C)]);
}

// ── S3: timeout on the left-hand side ─────────────────────────────────────────

#[test]
fn held_alone_long_enough_matches() {
    let mut stage = Stage::new(single_context(vec![keys(
        smallvec![
            down(KEY_A),
            KeyEvent::timeout(TimeoutKind::AwaitInput, Duration::from_millis(500)),
        ],
        smallvec![down(KEY_X)],
    )]));
    // the harness lets the timer run out before the release arrives
    let out = drive(&mut stage, &[down(KEY_A), up(KEY_A)], true);
    assert_eq!(out, vec![down(KEY_X), up(KEY_X)]);
}

#[test]
fn interrupted_hold_falls_through() {
    let mut stage = Stage::new(single_context(vec![keys(
        smallvec![
            down(KEY_A),
            KeyEvent::timeout(TimeoutKind::AwaitInput, Duration::from_millis(500)),
        ],
        smallvec![down(KEY_X)],
    )]));
    // B arrives after only 100ms of silence
    let mut out = Vec::new();
    for event in [
        down(KEY_A),
        KeyEvent::timeout(TimeoutKind::AwaitInput, Duration::from_millis(100)),
        down(KEY_B),
    ] {
        let emitted = stage.update(event, 0);
        out.extend(emitted.iter().copied());
        stage.reuse_buffer(emitted);
    }
    assert_eq!(out, vec![down(KEY_A), down(KEY_B)]);
}

// ── S4: action dispatch ───────────────────────────────────────────────────────

#[test]
fn chord_to_action_emits_only_the_action() {
    let mut stage = Stage::new(single_context(vec![keys(
        smallvec![down(KEY_LEFTCTRL), down(KEY_1)],
        smallvec![KeyEvent::down(Key::Action(0))],
    )]));
    let out = drive(
        &mut stage,
        &[down(KEY_LEFTCTRL), down(KEY_1), up(KEY_1), up(KEY_LEFTCTRL)],
        false,
    );
    // the action press (and its pairing release) are all that comes out; no
    // physical key ever reaches the device
    assert_eq!(
        out,
        vec![KeyEvent::down(Key::Action(0)), KeyEvent::up(Key::Action(0))]
    );
}

// ── S5: virtual key toggle ────────────────────────────────────────────────────

#[test]
fn latch_toggles_a_layer() {
    let layer = Key::Virtual(0);
    let config = CompiledConfig {
        commands: Vec::new(),
        contexts: vec![Context {
            device_filter: DeviceFilter::Any,
            mappings: vec![
                keys(
                    smallvec![down(keyflux_core::domain::codes::KEY_CAPSLOCK)],
                    smallvec![KeyEvent::down(layer)],
                ),
                keys(
                    smallvec![KeyEvent::down(layer), down(KEY_J)],
                    smallvec![down(KEY_LEFT)],
                ),
            ],
            command_overrides: Vec::new(),
        }],
    };
    let mut stage = Stage::new(config);

    let caps = keyflux_core::domain::codes::KEY_CAPSLOCK;
    let out = drive(
        &mut stage,
        &[
            down(caps),
            up(caps),
            down(KEY_J),
            up(KEY_J),
            down(caps),
            up(caps),
            down(KEY_J),
            up(KEY_J),
        ],
        false,
    );
    // first J press lands in the layer, second passes through
    assert_eq!(
        out,
        vec![down(KEY_LEFT), up(KEY_LEFT), down(KEY_J), up(KEY_J)]
    );
}

// ── Pairing property ──────────────────────────────────────────────────────────

#[test]
fn downs_and_ups_stay_balanced() {
    // the mappings deliberately target X from several triggers, including a
    // tap, so overlapping holds must still pair up
    let mut stage = Stage::new(single_context(vec![
        keys(smallvec![down(KEY_A), down(KEY_B)], smallvec![down(KEY_C)]),
        keys(smallvec![down(KEY_A)], smallvec![down(KEY_X)]),
        keys(smallvec![down(KEY_J)], smallvec![down(KEY_X)]),
        keys(smallvec![down(KEY_1)], smallvec![down(KEY_X), up(KEY_X)]),
    ]));

    // a deterministic pseudo-random press/release schedule over a few keys
    let keys_pool = [KEY_A, KEY_B, KEY_C, KEY_J, KEY_1];
    let mut held = [false; 5];
    let mut events = Vec::new();
    let mut state = 0x2545_f491u64;
    for _ in 0..400 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let pick = (state >> 33) as usize % keys_pool.len();
        if held[pick] {
            events.push(up(keys_pool[pick]));
        } else {
            events.push(down(keys_pool[pick]));
        }
        held[pick] = !held[pick];
    }
    // release everything still held at the end
    for (i, &is_held) in held.iter().enumerate() {
        if is_held {
            events.push(up(keys_pool[i]));
        }
    }

    let out = drive(&mut stage, &events, false);

    let mut balance = std::collections::HashMap::new();
    for event in out {
        let counter = balance.entry(event.key).or_insert(0i32);
        match event.state {
            KeyState::Down => *counter += 1,
            KeyState::Up => *counter -= 1,
            _ => {}
        }
        assert!(*counter >= 0, "release before press for {:?}", event.key);
    }
    for (key, counter) in balance {
        assert_eq!(counter, 0, "unbalanced output for {key:?}");
    }
}
