//! Command-line settings for `keyfluxd`.
//!
//! The mapping configuration itself never comes from the command line; it
//! always arrives compiled over the control socket.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Default name of the synthetic device remapped events originate from. The
/// grab pass excludes it by this name so the daemon never captures its own
/// output.
pub const DEFAULT_VIRTUAL_DEVICE_NAME: &str = "Keyflux";

/// User-space keyboard and pointer remapping daemon.
#[derive(Debug, Parser)]
#[command(name = "keyfluxd", version, about)]
pub struct Settings {
    /// Path of the control socket the configuration client connects to.
    #[arg(long, default_value_os_t = default_socket_path())]
    pub socket: PathBuf,

    /// Name of the virtual output device.
    #[arg(long, default_value = DEFAULT_VIRTUAL_DEVICE_NAME)]
    pub device_name: String,

    /// Enforce a minimum interval between presses of the same key, in
    /// milliseconds.
    #[arg(long, value_name = "MS", num_args = 0..=1, default_missing_value = "20")]
    pub debounce: Option<u64>,

    /// Attempt the device grab once and exit with 0 or 1, without entering
    /// the main loop. Lets permission prompts fire ahead of the first real
    /// run.
    #[arg(long)]
    pub grab_and_exit: bool,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Settings {
    pub fn debounce_interval(&self) -> Option<Duration> {
        self.debounce.map(Duration::from_millis)
    }
}

fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/run"))
        .join("keyflux")
        .join("control.sock")
}
