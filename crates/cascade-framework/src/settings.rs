//! Dispatcher settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Behaviour switches applied by [`AppBuilder::from_settings`](crate::AppBuilder::from_settings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Install the `ignore_self` filter at the front of the global chain.
    pub ignore_self: bool,

    /// Delay before an unacknowledged event is reported, in milliseconds.
    pub ack_timeout_ms: u64,

    /// Bind the client to the function token when the event carries one.
    pub attach_function_token: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            ignore_self: true,
            ack_timeout_ms: 3000,
            attach_function_token: true,
        }
    }
}

impl AppSettings {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}
