//! `keyfluxd` entry point: parse the command line, initialize logging and
//! run the connection loop.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use keyflux_daemon::settings::Settings;

fn main() -> ExitCode {
    let settings = Settings::parse();

    // level from -v/-vv, overridable by RUST_LOG
    let default_level = match settings.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    run(&settings)
}

#[cfg(target_os = "linux")]
fn run(settings: &Settings) -> ExitCode {
    use keyflux_daemon::application::daemon;
    use keyflux_daemon::infrastructure::devices::{evdev::EvdevDeviceSet, DeviceSet};

    if settings.grab_and_exit {
        // one-shot permission bootstrap: try the grab, report, leave
        let mut devices = EvdevDeviceSet::new();
        return match devices.grab(&settings.device_name, true) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("grabbing input devices failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    match daemon::run(settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_settings: &Settings) -> ExitCode {
    error!("keyfluxd drives Linux evdev devices; this platform is not supported");
    ExitCode::FAILURE
}
