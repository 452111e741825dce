//! Server parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for one Incppect server instance.
///
/// Every field has a default, so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// TCP port for both the WebSocket endpoint and the static files.
    pub port_listen: u16,
    /// How long a poll keeps a request alive. Negative means forever.
    pub last_request_timeout_ms: i64,
    /// Minimum spacing between two updates of the same request.
    pub min_update_interval_ms: u64,
    /// Connections that send nothing for this long are closed. 0 disables.
    pub idle_timeout_s: u64,
    /// Interval of the scheduler tick that runs without client traffic.
    pub tick_interval_ms: u64,
    /// URL prefix under which static files are served.
    pub http_root: String,
    /// Directory the static files are read from.
    pub path_on_disk: String,
    /// Outbound frames buffered per client before backpressure kicks in.
    pub send_queue_frames: usize,
    /// Largest accepted WebSocket message.
    pub max_message_bytes: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            port_listen: 3000,
            last_request_timeout_ms: 3000,
            min_update_interval_ms: 16,
            idle_timeout_s: 120,
            tick_interval_ms: 16,
            http_root: "/".into(),
            path_on_disk: ".".into(),
            send_queue_frames: 32,
            max_message_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Parameters {
    /// Poll lifetime, or `None` when polls never expire.
    pub fn request_timeout(&self) -> Option<Duration> {
        u64::try_from(self.last_request_timeout_ms)
            .ok()
            .map(Duration::from_millis)
    }

    pub fn min_update_interval(&self) -> Duration {
        Duration::from_millis(self.min_update_interval_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_s > 0).then(|| Duration::from_secs(self.idle_timeout_s))
    }

    /// Scheduler tick; never zero so `tokio::time::interval` accepts it.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_timeout_means_forever() {
        let p = Parameters {
            last_request_timeout_ms: -1,
            ..Parameters::default()
        };
        assert_eq!(p.request_timeout(), None);
        assert_eq!(
            Parameters::default().request_timeout(),
            Some(Duration::from_secs(3))
        );
    }

    #[test]
    fn zero_idle_timeout_disables() {
        let p = Parameters {
            idle_timeout_s: 0,
            ..Parameters::default()
        };
        assert!(p.idle_timeout().is_none());
    }

    #[test]
    fn tick_interval_is_never_zero() {
        let p = Parameters {
            tick_interval_ms: 0,
            ..Parameters::default()
        };
        assert_eq!(p.tick_interval(), Duration::from_millis(1));
    }
}
