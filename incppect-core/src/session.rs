//! Per-client session state.
//!
//! A [`ClientSession`] is created when a WebSocket connects and dropped,
//! together with all of its [`Request`]s and queued server events, when it
//! disconnects. Sessions are owned by the network thread only.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::Parameters;
use crate::registry::GetterId;

/// Process-unique client identifier, assigned monotonically from 1.
pub type ClientId = i32;

/// Client-chosen identifier of one subscription inside a session.
pub type RequestId = i32;

// ── ServerStats ──────────────────────────────────────────────────

/// Traffic counters exposed through the `incppect.*` built-in variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Number of currently connected clients.
    pub n_clients: usize,
    /// Total bytes handed to the transport.
    pub tx_total: u64,
    /// Total bytes received from clients.
    pub rx_total: u64,
}

// ── Request ──────────────────────────────────────────────────────

/// One live subscription: a resolved path plus its throttling timers and
/// diff history.
#[derive(Debug, Clone)]
pub struct Request {
    /// Getter resolved at subscribe time.
    pub getter: GetterId,
    /// Wildcard indices, in path order.
    pub idxs: Vec<i32>,
    /// When the getter last ran for this request.
    pub last_updated: Option<Instant>,
    /// When the client last listed this request in a poll.
    pub last_requested: Option<Instant>,
    /// Minimum spacing between two getter invocations.
    pub min_update_interval: Duration,
    /// How long a poll keeps the request alive; `None` means forever.
    pub request_timeout: Option<Duration>,
    /// Unpadded payload last sent, used as the diff base.
    pub prev_payload: Bytes,
}

impl Request {
    pub fn new(getter: GetterId, idxs: Vec<i32>, params: &Parameters) -> Self {
        Self {
            getter,
            idxs,
            last_updated: None,
            last_requested: None,
            min_update_interval: params.min_update_interval(),
            request_timeout: params.request_timeout(),
            prev_payload: Bytes::new(),
        }
    }

    /// Record that the client asked for this request at `now`.
    pub fn touch(&mut self, now: Instant, params: &Parameters) {
        self.last_requested = Some(now);
        self.request_timeout = params.request_timeout();
    }

    /// Gate 1: the client has polled this request and the poll is still fresh.
    pub fn is_wanted(&self, now: Instant) -> bool {
        match (self.last_requested, self.request_timeout) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(timeout)) => now.saturating_duration_since(at) < timeout,
        }
    }

    /// Gate 2: enough time has passed since the last getter invocation.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_updated {
            None => true,
            Some(at) => now.saturating_duration_since(at) > self.min_update_interval,
        }
    }
}

// ── ClientSession ────────────────────────────────────────────────

/// A custom record queued for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    pub event_id: i32,
    pub payload: Bytes,
}

/// Everything the server knows about one connected client.
#[derive(Debug)]
pub struct ClientSession {
    pub id: ClientId,
    /// IPv4 address bytes; IPv6 peers map to their embedded IPv4 or zeros.
    pub ip: [u8; 4],
    pub connected_at: Instant,
    /// Ordered so records are emitted by ascending request id.
    pub requests: BTreeMap<RequestId, Request>,
    /// Request ids named by the most recent poll message.
    pub last_polled: Vec<RequestId>,
    pub server_events: Vec<ServerEvent>,
    /// Last whole frame handed to the transport, used for top-level diffs.
    pub prev_frame: Bytes,
}

impl ClientSession {
    pub fn new(id: ClientId, ip: [u8; 4], now: Instant) -> Self {
        Self {
            id,
            ip,
            connected_at: now,
            requests: BTreeMap::new(),
            last_polled: Vec::new(),
            server_events: Vec::new(),
            prev_frame: Bytes::new(),
        }
    }

    /// Insert or replace the request under `request_id`.
    pub fn subscribe(&mut self, request_id: RequestId, request: Request) {
        self.requests.insert(request_id, request);
    }

    /// Replace the polled subset and refresh the timers of the known ids.
    pub fn poll(&mut self, request_ids: &[RequestId], now: Instant, params: &Parameters) {
        self.last_polled.clear();
        for id in request_ids {
            if let Some(request) = self.requests.get_mut(id) {
                request.touch(now, params);
                self.last_polled.push(*id);
            }
        }
    }

    /// Refresh the timers of the previously polled subset.
    pub fn repeat_poll(&mut self, now: Instant, params: &Parameters) {
        for id in &self.last_polled {
            if let Some(request) = self.requests.get_mut(id) {
                request.touch(now, params);
            }
        }
    }

    /// Forget every diff base so the next frame goes out as full updates.
    pub fn reset_diff_history(&mut self) {
        self.prev_frame = Bytes::new();
        for request in self.requests.values_mut() {
            request.prev_payload = Bytes::new();
        }
    }
}

/// IPv4 bytes for `addr`, as exposed by `incppect.ip_address[%d]`.
pub fn ipv4_bytes(addr: IpAddr) -> [u8; 4] {
    match addr {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(|v4| v4.octets()).unwrap_or_default(),
    }
}
