//! Producer-facing handle and the network thread.
//!
//! [`ImGuiWsBuilder::start`] binds the listen port, spawns a dedicated thread
//! running a current-thread tokio runtime with the Incppect server, and
//! returns the [`ImGuiWs`] handle the GUI thread uses to publish frames and
//! drain input.
//! [`ImGuiWsBuilder::split`] returns the same two halves without spawning
//! anything, for embedding the network side in an existing runtime or
//! driving it by hand.

use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use arc_swap::ArcSwap;
use bytes::Bytes;
use incppect_core::{ClientId, Incppect, IncppectError, Parameters};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::{ClipboardText, ImGuiState, QueuedServerEvent, SharedSlot, register_vars};
use crate::compressor::{DrawDataCompressor, VtxOffsetCompressor};
use crate::control::{ControlArbiter, ControlState};
use crate::draw::{DrawInfo, DrawList, DrawSnapshot};
use crate::error::ImGuiWsError;
use crate::event::Event;
use crate::record::{Recorder, Replay, Session};
use crate::texture::{TextureId, TextureType};

// ── Builder ──────────────────────────────────────────────────────

pub struct ImGuiWsBuilder {
    params: Parameters,
    compressor: Box<dyn DrawDataCompressor>,
}

/// The network half: protocol core plus the GUI state it serves.
pub struct Network {
    pub incppect: Incppect<ImGuiState>,
    pub state: ImGuiState,
}

impl ImGuiWsBuilder {
    pub fn new(params: Parameters) -> Self {
        Self {
            params,
            compressor: Box::new(VtxOffsetCompressor),
        }
    }

    /// Replace the draw-list compressor.
    pub fn compressor(mut self, compressor: impl DrawDataCompressor + 'static) -> Self {
        self.compressor = Box::new(compressor);
        self
    }

    /// Build both halves without starting a thread.
    pub fn split(self) -> Result<(ImGuiWs, Network), ImGuiWsError> {
        let snapshots = Arc::new(ArcSwap::from_pointee(DrawSnapshot::default()));
        let clipboard = Arc::new(ArcSwap::from_pointee(ClipboardText::default()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (server_events_tx, server_events_rx) = mpsc::unbounded_channel();
        let n_connected = Arc::new(AtomicUsize::new(0));

        let mut incppect = Incppect::new(self.params);
        register_vars(&mut incppect)?;
        let state = ImGuiState::new(
            Arc::clone(&snapshots),
            Arc::clone(&clipboard),
            events_tx,
            server_events_rx,
            self.compressor,
            Arc::clone(&n_connected),
        );

        let handle = ImGuiWs {
            snapshot: DrawSnapshot::default(),
            snapshots,
            clipboard_seq: 0,
            clipboard,
            recorder: None,
            replay: None,
            events: events_rx,
            server_events: server_events_tx,
            arbiter: ControlArbiter::new(),
            n_connected,
            net: None,
        };
        Ok((handle, Network { incppect, state }))
    }

    /// Bind `0.0.0.0:port_listen` and serve on a background thread.
    ///
    /// Fails with [`ImGuiWsError::Bind`] if the port is unavailable.
    pub fn start(self) -> Result<ImGuiWs, ImGuiWsError> {
        let port = self.params.port_listen;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .and_then(|l| l.set_nonblocking(true).map(|()| l))
            .map_err(|source| ImGuiWsError::Bind { port, source })?;
        let local = listener.local_addr()?;
        info!("listening on {local}");
        info!("http://localhost:{}/", local.port());

        let (mut handle, net) = self.split()?;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let thread = std::thread::Builder::new()
            .name("imgui-ws".into())
            .spawn(move || -> Result<(), IncppectError> {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                rt.block_on(async move {
                    let listener = tokio::net::TcpListener::from_std(listener)?;
                    incppect_core::serve(listener, net.incppect, net.state, token).await
                })
            })
            .map_err(ImGuiWsError::ThreadSpawn)?;

        handle.net = Some(NetThread { cancel, thread });
        Ok(handle)
    }
}

// ── ImGuiWs ──────────────────────────────────────────────────────

struct NetThread {
    cancel: CancellationToken,
    thread: JoinHandle<Result<(), IncppectError>>,
}

impl NetThread {
    fn shutdown(self) -> Result<(), ImGuiWsError> {
        self.cancel.cancel();
        match self.thread.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(IncppectError::Other("network thread panicked".into()).into()),
        }
    }
}

/// GUI-thread handle. Every setter publishes a new snapshot.
pub struct ImGuiWs {
    /// Snapshot under construction; cloned on publish.
    snapshot: DrawSnapshot,
    snapshots: SharedSlot<DrawSnapshot>,
    clipboard_seq: u64,
    clipboard: SharedSlot<ClipboardText>,
    recorder: Option<Recorder>,
    replay: Option<Replay>,
    events: mpsc::UnboundedReceiver<Event>,
    server_events: mpsc::UnboundedSender<QueuedServerEvent>,
    arbiter: ControlArbiter,
    n_connected: Arc<AtomicUsize>,
    net: Option<NetThread>,
}

impl ImGuiWs {
    /// Replace the draw lists. A running replay is drawn underneath them.
    pub fn set_draw_data(&mut self, draw_lists: Vec<DrawList>) {
        let draw_lists = match &mut self.replay {
            Some(replay) => replay.merge(draw_lists),
            None => draw_lists,
        };
        self.snapshot.draw_lists = Arc::new(draw_lists);
        self.publish();
    }

    /// Insert or replace a texture; returns its revision.
    pub fn set_texture(
        &mut self,
        id: TextureId,
        kind: TextureType,
        width: i32,
        height: i32,
        pixels: &[u8],
    ) -> Result<i32, ImGuiWsError> {
        let revision = Arc::make_mut(&mut self.snapshot.textures).set(id, kind, width, height, pixels)?;
        self.publish();
        Ok(revision)
    }

    pub fn set_draw_info(&mut self, info: DrawInfo) {
        self.snapshot.info = info;
        self.publish();
    }

    /// Publish clipboard text; the controller receives it as a server event.
    pub fn set_clipboard_text(&mut self, text: impl Into<String>) {
        self.clipboard_seq += 1;
        self.clipboard.store(Arc::new(ClipboardText {
            seq: self.clipboard_seq,
            text: text.into(),
        }));
    }

    /// Queue a custom record for one client.
    pub fn add_server_event(
        &self,
        client_id: ClientId,
        event_id: i32,
        payload: impl Into<Bytes>,
    ) -> Result<(), ImGuiWsError> {
        self.server_events
            .send((client_id, event_id, payload.into()))
            .map_err(|_| ImGuiWsError::AlreadyStopped)
    }

    /// Drain received events, keeping only the controller's input.
    pub fn take_events(&mut self) -> Vec<Event> {
        let mut raw = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            raw.push(event);
        }
        self.arbiter.process(raw)
    }

    pub fn num_connected(&self) -> usize {
        self.n_connected.load(Ordering::Acquire)
    }

    pub fn control(&self) -> ControlState {
        self.arbiter.state()
    }

    pub fn arbiter(&self) -> &ControlArbiter {
        &self.arbiter
    }

    /// Start capturing every new set of published draw lists.
    pub fn start_recording(&mut self) {
        if self.recorder.is_none() {
            info!("recording started");
            self.recorder = Some(Recorder::default());
        }
    }

    /// Stop capturing and return what was recorded.
    pub fn stop_recording(&mut self) -> Option<Session> {
        self.recorder.take().map(Recorder::finish)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// Play `replay` underneath the live draw lists, or stop with `None`.
    pub fn set_replay(&mut self, replay: Option<Replay>) -> Option<Replay> {
        std::mem::replace(&mut self.replay, replay)
    }

    pub fn replay_mut(&mut self) -> Option<&mut Replay> {
        self.replay.as_mut()
    }

    /// Stop the network thread and wait for it.
    pub fn stop(&mut self) -> Result<(), ImGuiWsError> {
        let net = self.net.take().ok_or(ImGuiWsError::AlreadyStopped)?;
        let result = net.shutdown();
        info!("imgui-ws stopped");
        result
    }

    pub(crate) fn publish(&mut self) {
        self.snapshot.seq += 1;
        if let Some(recorder) = &mut self.recorder {
            recorder.capture(&self.snapshot.draw_lists);
        }
        self.snapshots.store(Arc::new(self.snapshot.clone()));
    }

    pub(crate) fn snapshot_mut(&mut self) -> &mut DrawSnapshot {
        &mut self.snapshot
    }
}

impl Drop for ImGuiWs {
    fn drop(&mut self) {
        if let Some(net) = self.net.take() {
            if let Err(e) = net.shutdown() {
                warn!("network thread: {e}");
            }
        }
    }
}
