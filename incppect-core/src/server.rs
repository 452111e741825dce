//! Transport-independent protocol core.
//!
//! [`Incppect`] owns the variable registry and every client session. It is
//! driven by the transport with three kinds of input (connect, message,
//! disconnect) plus periodic ticks, and answers with outbound frames. Nothing
//! here touches a socket.

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::config::Parameters;
use crate::error::IncppectError;
use crate::registry::{GetterCtx, GetterId, Registry, view};
use crate::scheduler::UpdatePass;
use crate::session::{ClientId, ClientSession, Request, ServerEvent, ServerStats};
use crate::wire::{ClientMessage, Subscription};

/// Path whose `-1` index is replaced with the subscribing client's id.
pub const MY_ID_PATH: &str = "my_id[%d]";

// ── Service hooks ────────────────────────────────────────────────

/// Connection-level event delivered to the embedding [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent<'a> {
    Connected { ip: [u8; 4] },
    Disconnected,
    /// Body of a type-4 message, never empty.
    Custom(&'a [u8]),
}

/// The embedding layer. It is also the state every getter reads.
///
/// All hooks run on the network thread, between updates.
pub trait Service: Sized + Send + 'static {
    /// A client connected, disconnected, or sent a custom message.
    fn on_client_event(&mut self, _server: &mut Incppect<Self>, _client_id: ClientId, _event: ClientEvent<'_>) {}

    /// Called before every update; refresh state and queue server events here.
    fn on_tick(&mut self, _server: &mut Incppect<Self>) {}
}

/// What the transport should do after a message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Subscriptions or polls changed; run an update now.
    Update,
    /// A non-empty custom payload for the embedding layer.
    Custom(Bytes),
    /// Nothing to do.
    Ignored,
}

// ── Incppect ─────────────────────────────────────────────────────

/// Sessions, registry and scheduler of one server.
pub struct Incppect<S> {
    params: Parameters,
    registry: Registry<S>,
    sessions: BTreeMap<ClientId, ClientSession>,
    last_id: ClientId,
    stats: ServerStats,
    my_id: GetterId,
}

impl<S: 'static> Incppect<S> {
    /// Create a server with the `incppect.*` and `my_id[%d]` built-ins.
    pub fn new(params: Parameters) -> Self {
        let mut registry: Registry<S> = Registry::new();
        registry.replace("incppect.nclients", |c: &GetterCtx<'_, S>| {
            view::i32(c.stats.n_clients as i32)
        });
        registry.replace("incppect.tx_total", |c: &GetterCtx<'_, S>| view::u64(c.stats.tx_total));
        registry.replace("incppect.rx_total", |c: &GetterCtx<'_, S>| view::u64(c.stats.rx_total));
        registry.replace("incppect.ip_address[%d]", |c: &GetterCtx<'_, S>| {
            c.idx(0)
                .and_then(|id| c.clients.get(&id))
                .map(|ip| Bytes::copy_from_slice(ip))
                .unwrap_or_default()
        });
        let my_id = registry.replace(MY_ID_PATH, |c: &GetterCtx<'_, S>| {
            view::i32(c.idx(0).unwrap_or(-1))
        });

        Self {
            params,
            registry,
            sessions: BTreeMap::new(),
            last_id: 0,
            stats: ServerStats::default(),
            my_id,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Register a variable. Fails if `path` is already registered.
    pub fn var<F>(&mut self, path: impl Into<String>, getter: F) -> Result<GetterId, IncppectError>
    where
        F: Fn(&GetterCtx<'_, S>) -> Bytes + Send + 'static,
    {
        self.registry.register(path, getter)
    }

    /// Register or swap the getter of `path`.
    pub fn replace_var<F>(&mut self, path: impl Into<String>, getter: F) -> GetterId
    where
        F: Fn(&GetterCtx<'_, S>) -> Bytes + Send + 'static,
    {
        self.registry.replace(path, getter)
    }

    pub fn num_connected(&self) -> usize {
        self.sessions.len()
    }

    pub fn client_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn session(&self, id: ClientId) -> Option<&ClientSession> {
        self.sessions.get(&id)
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Create a session for a new connection.
    pub fn connect(&mut self, ip: [u8; 4], now: Instant) -> ClientId {
        self.last_id += 1;
        let id = self.last_id;
        self.sessions.insert(id, ClientSession::new(id, ip, now));
        self.stats.n_clients = self.sessions.len();
        info!(
            "client with id = {id} connected from {}.{}.{}.{}",
            ip[0], ip[1], ip[2], ip[3]
        );
        id
    }

    /// Drop a session with all of its requests and queued events.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        self.stats.n_clients = self.sessions.len();
        if removed {
            info!("client with id = {id} disconnected");
        }
        removed
    }

    /// Handle one binary message from `id`.
    pub fn receive(&mut self, id: ClientId, data: &[u8], now: Instant) -> Result<Received, IncppectError> {
        self.stats.rx_total += data.len() as u64;

        let message = ClientMessage::parse(data)?;
        let Some(session) = self.sessions.get_mut(&id) else {
            return Ok(Received::Ignored);
        };
        let triggers_update = message.triggers_update();

        match message {
            ClientMessage::Subscribe(subs) => {
                for sub in subs {
                    match resolve_subscription(&self.registry, self.my_id, id, &sub) {
                        Ok((getter, idxs)) => {
                            debug!(
                                "client {id}: requestId = {}, path = '{}', nidxs = {}",
                                sub.request_id,
                                sub.path,
                                idxs.len()
                            );
                            session.subscribe(sub.request_id, Request::new(getter, idxs, &self.params));
                        }
                        Err(e) => warn!("client {id}: {e}"),
                    }
                }
            }
            ClientMessage::Poll(ids) => session.poll(&ids, now, &self.params),
            ClientMessage::RepeatPoll => session.repeat_poll(now, &self.params),
            ClientMessage::Custom(payload) if !payload.is_empty() => return Ok(Received::Custom(payload)),
            ClientMessage::Custom(_) => {}
        }

        Ok(if triggers_update { Received::Update } else { Received::Ignored })
    }

    /// Queue a custom record for one client. Unknown clients are ignored.
    pub fn add_server_event(&mut self, id: ClientId, event_id: i32, payload: impl Into<Bytes>) -> bool {
        match self.sessions.get_mut(&id) {
            Some(session) => {
                session.server_events.push(ServerEvent {
                    event_id,
                    payload: payload.into(),
                });
                true
            }
            None => false,
        }
    }

    /// Run the scheduler over every session.
    ///
    /// Frames count towards `tx_total` only once the transport reports them
    /// through [`mark_sent`](Self::mark_sent).
    pub fn update(&mut self, state: &S, now: Instant) -> Vec<(ClientId, Bytes)> {
        let clients: BTreeMap<ClientId, [u8; 4]> =
            self.sessions.iter().map(|(id, s)| (*id, s.ip)).collect();
        let stats = self.stats;
        let pass = UpdatePass {
            registry: &self.registry,
            state,
            stats: &stats,
            clients: &clients,
        };

        let mut frames = Vec::new();
        for (id, session) in self.sessions.iter_mut() {
            if let Some(frame) = pass.run(session, now) {
                frames.push((*id, frame));
            }
        }
        frames
    }

    /// The transport accepted a frame of `bytes` for sending.
    pub fn mark_sent(&mut self, bytes: usize) {
        self.stats.tx_total += bytes as u64;
    }

    /// The transport could not take a frame for `id`: the frame is dropped
    /// and the client's diff history reset, so the next frame is complete.
    pub fn mark_backpressure(&mut self, id: ClientId) {
        if let Some(session) = self.sessions.get_mut(&id) {
            warn!("backpressure for client {id} increased; frame dropped");
            session.reset_diff_history();
        }
    }
}

impl<S: Service> Incppect<S> {
    /// Connect a client and notify the service.
    pub fn open(&mut self, service: &mut S, ip: [u8; 4], now: Instant) -> ClientId {
        let id = self.connect(ip, now);
        service.on_client_event(self, id, ClientEvent::Connected { ip });
        id
    }

    /// Disconnect a client and notify the service.
    pub fn close(&mut self, service: &mut S, id: ClientId) {
        if self.disconnect(id) {
            service.on_client_event(self, id, ClientEvent::Disconnected);
        }
    }

    /// Handle a message, forwarding custom payloads to the service.
    ///
    /// Returns whether an update should run now. Errors are logged and the
    /// message dropped.
    pub fn dispatch(&mut self, service: &mut S, id: ClientId, data: &[u8], now: Instant) -> bool {
        match self.receive(id, data, now) {
            Ok(Received::Update) => true,
            Ok(Received::Custom(payload)) => {
                service.on_client_event(self, id, ClientEvent::Custom(&payload));
                false
            }
            Ok(Received::Ignored) => false,
            Err(e @ IncppectError::MalformedMessage(_)) => {
                error!("client {id}: invalid message data: {e}");
                false
            }
            Err(e) => {
                warn!("client {id}: {e}");
                false
            }
        }
    }

    /// Let the service refresh, then run the scheduler.
    pub fn tick(&mut self, service: &mut S, now: Instant) -> Vec<(ClientId, Bytes)> {
        service.on_tick(self);
        self.update(service, now)
    }
}

fn resolve_subscription<S>(
    registry: &Registry<S>,
    my_id: GetterId,
    client_id: ClientId,
    sub: &Subscription,
) -> Result<(GetterId, Vec<i32>), IncppectError> {
    if sub.request_id < 0 {
        return Err(IncppectError::InvalidSubscription(format!(
            "negative request id {} for '{}'",
            sub.request_id, sub.path
        )));
    }
    let getter = registry
        .resolve(&sub.path)
        .ok_or_else(|| IncppectError::UnknownPath(sub.path.clone()))?;
    let expected = registry.arity(getter).unwrap_or(0);
    if expected != sub.idxs.len() {
        return Err(IncppectError::WildcardMismatch {
            path: sub.path.clone(),
            expected,
            actual: sub.idxs.len(),
        });
    }

    let mut idxs = sub.idxs.clone();
    if getter == my_id {
        for idx in idxs.iter_mut().filter(|i| **i == -1) {
            *idx = client_id;
        }
    }
    Ok((getter, idxs))
}
