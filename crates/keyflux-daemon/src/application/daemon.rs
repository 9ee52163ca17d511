//! The outer connection lifecycle.
//!
//! The daemon serves one configuration client at a time. For every
//! connection it waits for the initial configuration, creates the virtual
//! device, grabs the matching physical devices and hands control to the
//! [`Session`] event loop. When the session loses its connection the devices
//! are released and the daemon goes back to listening; a matched exit
//! sequence terminates the process with exit code 0. Failures before the
//! first session (socket, virtual device, grab) are startup errors and exit
//! with code 1.

use anyhow::Context as _;
use tracing::{error, info};

use keyflux_core::{CompiledConfig, Message, Stage};

use crate::application::debounce::KeyDebouncer;
use crate::application::event_loop::{Session, SessionEnd};
use crate::infrastructure::control::{socket::UnixClientPort, ClientPort};
use crate::infrastructure::devices::{evdev::EvdevDeviceSet, DeviceSet};
use crate::infrastructure::output::uinput::UinputDevice;
use crate::settings::Settings;

pub fn run(settings: &Settings) -> anyhow::Result<()> {
    let mut client =
        UnixClientPort::bind(&settings.socket).context("initializing the control socket")?;

    loop {
        info!("waiting for configuration client");
        if let Err(e) = client.accept() {
            error!("accepting client connection failed: {e}");
            continue;
        }

        let Some((config, active_contexts)) = read_initial_config(&mut client) else {
            client.disconnect();
            continue;
        };
        let mut stage = Stage::new(config);
        if let Some(indices) = active_contexts {
            stage.set_active_contexts(&indices);
        }

        info!("creating virtual device {:?}", settings.device_name);
        let mut virtual_device =
            UinputDevice::create(&settings.device_name).context("creating the virtual device")?;

        let mut devices = EvdevDeviceSet::new();
        devices
            .grab(&settings.device_name, stage.has_mouse_mappings())
            .context("grabbing input devices")?;
        stage.set_grabbed_devices(devices.device_names());
        info!("grabbed {} input devices", devices.device_names().len());

        let debouncer = settings.debounce_interval().map(KeyDebouncer::new);
        let end = Session::new(
            &mut devices,
            &mut virtual_device,
            &mut client,
            stage,
            debouncer,
        )
        .run();

        // release the grab and destroy the virtual device before the next
        // client session
        drop(devices);
        drop(virtual_device);

        match end {
            SessionEnd::ExitRequested => return Ok(()),
            SessionEnd::ConnectionLost => {
                client.disconnect();
                info!("session ended; recycling devices");
            }
        }
    }
}

/// Waits for the client's opening messages. The very first message must be
/// a `Configuration`; a client that starts with anything else is discarded.
/// Messages that arrived in the same batch are folded in: a newer
/// configuration wins and the latest context set is carried over.
fn read_initial_config(
    client: &mut UnixClientPort,
) -> Option<(CompiledConfig, Option<Vec<u32>>)> {
    let mut config: Option<CompiledConfig> = None;
    let mut active_contexts: Option<Vec<u32>> = None;
    loop {
        let messages = match client.read_messages(None) {
            Ok(messages) => messages,
            Err(e) => {
                error!("receiving configuration failed: {e}");
                return None;
            }
        };
        for message in messages {
            match (message, &mut config) {
                (Message::Configuration(received), slot) => *slot = Some(received),
                (Message::ActiveContexts(indices), Some(_)) => active_contexts = Some(indices),
                (message, None) => {
                    error!(
                        "client began with {:?} instead of a configuration",
                        message.message_type()
                    );
                    return None;
                }
                (Message::TriggeredAction(_), Some(_)) => {
                    error!("client sent a daemon-only message");
                    return None;
                }
            }
        }
        if let Some(config) = config.take() {
            return Some((config, active_contexts));
        }
    }
}
