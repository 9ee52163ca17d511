//! Filtering of switch bounce on key and button presses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use keyflux_core::Key;

/// Enforces a minimum interval between presses of the same key.
///
/// `on_key_down` returns how much longer the event loop has to defer the
/// press; zero means the press may go out now, and only then is it recorded
/// as the key's latest press. The decision depends only on the timeline of
/// accepted presses, so a deferred press asked about again later gets a
/// strictly shrinking delay until it passes.
pub struct KeyDebouncer {
    minimum_interval: Duration,
    last_press: HashMap<Key, Instant>,
}

impl KeyDebouncer {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(20);

    pub fn new(minimum_interval: Duration) -> Self {
        Self {
            minimum_interval,
            last_press: HashMap::new(),
        }
    }

    /// Returns the remaining hold-off delay for this press.
    ///
    /// `more_pending` tells whether further events are queued behind this
    /// one; it does not change the interval policy, but a deferred press
    /// with followers is worth seeing in traces since the whole buffer
    /// stalls behind it.
    pub fn on_key_down(&mut self, key: Key, more_pending: bool) -> Duration {
        let now = Instant::now();
        if let Some(&last) = self.last_press.get(&key) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.minimum_interval {
                let delay = self.minimum_interval - elapsed;
                trace!("debouncing {key} for {delay:?} (more pending: {more_pending})");
                return delay;
            }
        }
        self.last_press.insert(key, now);
        Duration::ZERO
    }
}
