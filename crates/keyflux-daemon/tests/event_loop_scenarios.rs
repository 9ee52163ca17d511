//! End-to-end event loop scenarios against mock infrastructure.
//!
//! Each test scripts a device timeline, runs a [`Session`] to completion
//! (the script running out ends it like a vanished device would) and
//! asserts on what reached the virtual device and the client.

use std::time::Duration;

use smallvec::smallvec;

use keyflux_core::domain::codes::{
    BTN_LEFT, KEY_1, KEY_A, KEY_B, KEY_C, KEY_CAPSLOCK, KEY_ESC, KEY_J, KEY_LEFT, KEY_LEFTCTRL,
    KEY_X, WHEEL_UP,
};
use keyflux_core::{
    CompiledConfig, Context, DeviceFilter, Key, KeyEvent, KeySequence, Mapping, MappingTarget,
    Message, Stage, TimeoutKind,
};

use keyflux_daemon::application::debounce::KeyDebouncer;
use keyflux_daemon::application::event_loop::{Session, SessionEnd};
use keyflux_daemon::infrastructure::control::mock::MockClientPort;
use keyflux_daemon::infrastructure::devices::mock::MockDeviceSet;
use keyflux_daemon::infrastructure::devices::{DeviceSet, RawInputEvent, EV_REL, REL_WHEEL};
use keyflux_daemon::infrastructure::output::mock::RecordingVirtualDevice;

fn down(code: u16) -> KeyEvent {
    KeyEvent::down(Key::Code(code))
}

fn up(code: u16) -> KeyEvent {
    KeyEvent::up(Key::Code(code))
}

fn keys(input: KeySequence, output: KeySequence) -> Mapping {
    Mapping {
        input,
        target: MappingTarget::Keys(output),
    }
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

struct Harness {
    devices: MockDeviceSet,
    output: RecordingVirtualDevice,
    client: MockClientPort,
    config: CompiledConfig,
    debouncer: Option<KeyDebouncer>,
}

impl Harness {
    fn new(config: CompiledConfig) -> Self {
        Self {
            devices: MockDeviceSet::new(vec!["Test Keyboard"]),
            output: RecordingVirtualDevice::new(),
            client: MockClientPort::new(),
            config,
            debouncer: None,
        }
    }

    fn run(&mut self) -> SessionEnd {
        let mut stage = Stage::new(self.config.clone());
        stage.set_grabbed_devices(self.devices.device_names());
        Session::new(
            &mut self.devices,
            &mut self.output,
            &mut self.client,
            stage,
            self.debouncer.take(),
        )
        .run()
    }
}

// ── S1: simple remap ──────────────────────────────────────────────────────────

#[test]
fn simple_remap() {
    let mut harness = Harness::new(single_context(vec![keys(
        smallvec![down(KEY_A)],
        smallvec![down(KEY_B)],
    )]));
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_key(0, KEY_A, false);

    assert_eq!(harness.run(), SessionEnd::ConnectionLost);
    assert_eq!(harness.output.key_events, vec![down(KEY_B), up(KEY_B)]);
}

// ── S2: sequence left-hand side ───────────────────────────────────────────────

#[test]
fn sequence_fires_on_completion() {
    let mut harness = Harness::new(single_context(vec![keys(
        smallvec![down(KEY_A), down(KEY_B)],
        smallvec![down(KEY_C)],
    )]));
    for (code, pressed) in [
        (KEY_A, true),
        (KEY_B, true),
        (KEY_B, false),
        (KEY_A, false),
    ] {
        harness.devices.push_key(0, code, pressed);
    }

    harness.run();
    assert_eq!(harness.output.key_events, vec![down(KEY_C), up(KEY_C)]);
}

// ── S3: timeout left-hand side ────────────────────────────────────────────────

fn hold_config(hold_ms: u64) -> CompiledConfig {
    single_context(vec![keys(
        smallvec![
            down(KEY_A),
            KeyEvent::timeout(TimeoutKind::AwaitInput, Duration::from_millis(hold_ms)),
        ],
        smallvec![down(KEY_X)],
    )])
}

#[test]
fn held_long_enough_produces_the_timed_mapping() {
    let mut harness = Harness::new(hold_config(60));
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_gap(Duration::from_millis(120));
    harness.devices.push_key(0, KEY_A, false);

    harness.run();
    assert_eq!(harness.output.key_events, vec![down(KEY_X), up(KEY_X)]);
}

#[test]
fn interrupted_hold_falls_through() {
    let mut harness = Harness::new(hold_config(100));
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_gap(Duration::from_millis(20));
    harness.devices.push_key(0, KEY_B, true);
    harness.devices.push_key(0, KEY_B, false);
    harness.devices.push_key(0, KEY_A, false);

    harness.run();
    assert_eq!(
        harness.output.key_events,
        vec![down(KEY_A), down(KEY_B), up(KEY_B), up(KEY_A)]
    );
}

// ── S4: action dispatch ───────────────────────────────────────────────────────

#[test]
fn chord_dispatches_an_action_to_the_client() {
    let mut harness = Harness::new(single_context(vec![keys(
        smallvec![down(KEY_LEFTCTRL), down(KEY_1)],
        smallvec![KeyEvent::down(Key::Action(0))],
    )]));
    for (code, pressed) in [
        (KEY_LEFTCTRL, true),
        (KEY_1, true),
        (KEY_1, false),
        (KEY_LEFTCTRL, false),
    ] {
        harness.devices.push_key(0, code, pressed);
    }

    harness.run();
    assert_eq!(harness.client.triggered_actions, vec![0]);
    assert!(
        harness.output.key_events.is_empty(),
        "no key event may reach the device: {:?}",
        harness.output.key_events
    );
}

// ── S5: virtual key toggle ────────────────────────────────────────────────────

#[test]
fn latched_layer_remaps_until_toggled_off() {
    let layer = Key::Virtual(0);
    let mut harness = Harness::new(single_context(vec![
        keys(smallvec![down(KEY_CAPSLOCK)], smallvec![KeyEvent::down(layer)]),
        keys(
            smallvec![KeyEvent::down(layer), down(KEY_J)],
            smallvec![down(KEY_LEFT)],
        ),
    ]));
    for (code, pressed) in [
        (KEY_CAPSLOCK, true),
        (KEY_CAPSLOCK, false),
        (KEY_J, true),
        (KEY_J, false),
        (KEY_CAPSLOCK, true),
        (KEY_CAPSLOCK, false),
        (KEY_J, true),
        (KEY_J, false),
    ] {
        harness.devices.push_key(0, code, pressed);
    }

    harness.run();
    assert_eq!(
        harness.output.key_events,
        vec![down(KEY_LEFT), up(KEY_LEFT), down(KEY_J), up(KEY_J)]
    );
}

// ── S6: debounced press ───────────────────────────────────────────────────────

#[test]
fn bouncing_press_is_spread_to_the_minimum_interval() {
    let mut harness = Harness::new(single_context(Vec::new()));
    harness.debouncer = Some(KeyDebouncer::new(Duration::from_millis(40)));
    harness.devices.push_key(0, BTN_LEFT, true);
    harness.devices.push_gap(Duration::from_millis(5));
    harness.devices.push_key(0, BTN_LEFT, true); // switch bounce
    harness.devices.push_gap(Duration::from_millis(100));
    harness.devices.push_key(0, BTN_LEFT, false);

    harness.run();

    let downs: Vec<usize> = harness
        .output
        .key_events
        .iter()
        .enumerate()
        .filter(|(_, ev)| **ev == down(BTN_LEFT))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(downs.len(), 2, "events: {:?}", harness.output.key_events);
    assert_eq!(*harness.output.key_events.last().unwrap(), up(BTN_LEFT));

    let spacing = harness.output.key_event_times[downs[1]]
        .duration_since(harness.output.key_event_times[downs[0]]);
    assert!(
        spacing >= Duration::from_millis(35),
        "presses only {spacing:?} apart"
    );
}

// ── Repeat suppression while a timer is pending ───────────────────────────────

#[test]
fn repeated_press_cannot_cancel_a_pending_hold() {
    let mut harness = Harness::new(hold_config(60));
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_gap(Duration::from_millis(20));
    harness.devices.push_key(0, KEY_A, true); // autorepeat
    harness.devices.push_gap(Duration::from_millis(120));
    harness.devices.push_key(0, KEY_A, false);

    harness.run();
    // the repeat is swallowed; the hold still completes
    assert_eq!(harness.output.key_events, vec![down(KEY_X), up(KEY_X)]);
}

// ── Reconfiguration ───────────────────────────────────────────────────────────

#[test]
fn configuration_swap_applies_to_subsequent_input() {
    let mut harness = Harness::new(single_context(vec![keys(
        smallvec![down(KEY_A)],
        smallvec![down(KEY_B)],
    )]));
    harness.client.push_message(Message::Configuration(single_context(vec![keys(
        smallvec![down(KEY_A)],
        smallvec![down(KEY_C)],
    )])));
    harness.devices.push_interrupt();
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_key(0, KEY_A, false);

    harness.run();
    assert_eq!(harness.output.key_events, vec![down(KEY_C), up(KEY_C)]);
}

#[test]
fn reapplying_the_same_configuration_is_invisible() {
    let config = single_context(vec![keys(smallvec![down(KEY_A)], smallvec![down(KEY_B)])]);
    let mut harness = Harness::new(config.clone());
    harness.client.push_message(Message::Configuration(config));
    harness.devices.push_interrupt();
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_key(0, KEY_A, false);

    harness.run();
    assert_eq!(harness.output.key_events, vec![down(KEY_B), up(KEY_B)]);
}

#[test]
fn mouse_mapping_change_recycles_the_session() {
    let mut harness = Harness::new(single_context(vec![keys(
        smallvec![down(KEY_A)],
        smallvec![down(KEY_B)],
    )]));
    harness.client.push_message(Message::Configuration(single_context(vec![keys(
        smallvec![down(BTN_LEFT)],
        smallvec![down(KEY_B)],
    )])));
    harness.devices.push_interrupt();
    harness.devices.push_key(0, KEY_A, true);

    // the new configuration needs pointer devices; the session must end so
    // the daemon can re-grab
    assert_eq!(harness.run(), SessionEnd::ConnectionLost);
    assert!(harness.output.key_events.is_empty());
}

#[test]
fn active_context_update_switches_mappings() {
    let config = CompiledConfig {
        commands: Vec::new(),
        contexts: vec![
            Context {
                device_filter: DeviceFilter::Any,
                mappings: vec![keys(smallvec![down(KEY_A)], smallvec![down(KEY_B)])],
                command_overrides: Vec::new(),
            },
            Context {
                device_filter: DeviceFilter::Any,
                mappings: vec![keys(smallvec![down(KEY_A)], smallvec![down(KEY_C)])],
                command_overrides: Vec::new(),
            },
        ],
    };
    let mut harness = Harness::new(config);
    harness.client.push_message(Message::ActiveContexts(vec![0]));
    harness.devices.push_interrupt();
    harness.devices.push_key(0, KEY_A, true);
    harness.devices.push_key(0, KEY_A, false);

    harness.run();
    // with the later context disabled the first one applies
    assert_eq!(harness.output.key_events, vec![down(KEY_B), up(KEY_B)]);
}

// ── Exit sequence ─────────────────────────────────────────────────────────────

#[test]
fn exit_mapping_ends_the_session_gracefully() {
    let mut harness = Harness::new(single_context(vec![Mapping {
        input: smallvec![down(KEY_ESC)],
        target: MappingTarget::Exit,
    }]));
    harness.devices.push_key(0, KEY_ESC, true);

    assert_eq!(harness.run(), SessionEnd::ExitRequested);
    assert!(harness.output.key_events.is_empty());
}

// ── Pass-through of non-key events ────────────────────────────────────────────

#[test]
fn non_key_events_are_forwarded_verbatim() {
    let mut harness = Harness::new(single_context(Vec::new()));
    harness.devices.push_event(RawInputEvent {
        device_index: 0,
        event_type: EV_REL,
        code: 0x00, // REL_X
        value: 7,
    });

    harness.run();
    assert_eq!(harness.output.raw_events, vec![(EV_REL, 0x00, 7)]);
}

#[test]
fn wheel_motion_can_drive_mappings() {
    let mut harness = Harness::new(single_context(vec![keys(
        smallvec![down(WHEEL_UP)],
        smallvec![down(KEY_B), up(KEY_B)],
    )]));
    harness.devices.push_event(RawInputEvent {
        device_index: 0,
        event_type: EV_REL,
        code: REL_WHEEL,
        value: 1,
    });

    harness.run();
    assert_eq!(harness.output.key_events, vec![down(KEY_B), up(KEY_B)]);
}

// ── Failure handling ──────────────────────────────────────────────────────────

#[test]
fn output_failure_tears_the_session_down() {
    let mut harness = Harness::new(single_context(Vec::new()));
    harness.output.fail_flush = true;
    harness.devices.push_key(0, KEY_A, true);

    assert_eq!(harness.run(), SessionEnd::ConnectionLost);
}

#[test]
fn client_read_failure_tears_the_session_down() {
    let mut harness = Harness::new(single_context(Vec::new()));
    harness.client.fail_next_read = true;
    harness.devices.push_interrupt();

    assert_eq!(harness.run(), SessionEnd::ConnectionLost);
}
