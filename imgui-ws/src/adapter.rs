//! Network-side GUI state and the `imgui.*` variables.
//!
//! [`ImGuiState`] is the [`Service`] running on the network thread. It picks
//! up snapshots and clipboard text the producer stores into shared
//! [`ArcSwap`] slots, keeps the compressed draw lists of the latest snapshot,
//! forwards parsed input events to the producer and delivers server events
//! queued by it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arc_swap::ArcSwap;
use bytes::Bytes;
use incppect_core::{ClientEvent, ClientId, GetterCtx, Incppect, IncppectError, Service, view};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::compressor::DrawDataCompressor;
use crate::draw::{DrawList, DrawSnapshot};
use crate::event::{Event, EventKind};
use crate::texture::TextureId;

/// Server event carrying new clipboard text for the controller.
pub const EVENT_SET_CLIPBOARD: i32 = 0;

/// A server event queued by the producer: `(client, event id, payload)`.
pub type QueuedServerEvent = (ClientId, i32, Bytes);

/// Latest-value slot shared by the producer and the network thread.
pub type SharedSlot<T> = Arc<ArcSwap<T>>;

/// Clipboard text with a change counter, so equal text copied twice is
/// still delivered twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardText {
    pub seq: u64,
    pub text: String,
}

pub struct ImGuiState {
    snapshots: SharedSlot<DrawSnapshot>,
    /// Snapshot currently being served.
    snapshot: Arc<DrawSnapshot>,
    clipboard: SharedSlot<ClipboardText>,
    clipboard_text: Arc<ClipboardText>,
    events: mpsc::UnboundedSender<Event>,
    server_events: mpsc::UnboundedReceiver<QueuedServerEvent>,
    compressor: Box<dyn DrawDataCompressor>,
    /// Draw lists `draw_lists` was computed from.
    compressed_from: Arc<Vec<DrawList>>,
    draw_lists: Vec<Bytes>,
    texture_ids: Vec<TextureId>,
    n_connected: Arc<AtomicUsize>,
}

impl ImGuiState {
    pub(crate) fn new(
        snapshots: SharedSlot<DrawSnapshot>,
        clipboard: SharedSlot<ClipboardText>,
        events: mpsc::UnboundedSender<Event>,
        server_events: mpsc::UnboundedReceiver<QueuedServerEvent>,
        mut compressor: Box<dyn DrawDataCompressor>,
        n_connected: Arc<AtomicUsize>,
    ) -> Self {
        let snapshot = snapshots.load_full();
        let clipboard_text = clipboard.load_full();
        let compressed_from = Arc::clone(&snapshot.draw_lists);
        let draw_lists = compressor.compress(&compressed_from);
        let texture_ids = snapshot.textures.ids();
        Self {
            snapshots,
            snapshot,
            clipboard,
            clipboard_text,
            events,
            server_events,
            compressor,
            compressed_from,
            draw_lists,
            texture_ids,
            n_connected,
        }
    }

    /// The snapshot currently being served.
    pub fn snapshot(&self) -> &DrawSnapshot {
        &self.snapshot
    }

    /// Switch to the newest published snapshot. Returns false if nothing
    /// was published since the last call.
    pub fn poll_snapshot(&mut self) -> bool {
        let latest = self.snapshots.load_full();
        if latest.seq == self.snapshot.seq {
            return false;
        }
        self.snapshot = latest;
        self.refresh_snapshot();
        true
    }

    /// Take the newest clipboard text, if it changed since the last call.
    fn poll_clipboard(&mut self) -> Option<Arc<ClipboardText>> {
        let latest = self.clipboard.load_full();
        if latest.seq == self.clipboard_text.seq {
            return None;
        }
        self.clipboard_text = Arc::clone(&latest);
        Some(latest)
    }

    fn texture_at(&self, idx: Option<i32>) -> Option<TextureId> {
        let idx = usize::try_from(idx?).ok()?;
        self.texture_ids.get(idx).copied()
    }

    fn refresh_snapshot(&mut self) {
        let snap = &self.snapshot;
        if !Arc::ptr_eq(&snap.draw_lists, &self.compressed_from) {
            self.draw_lists = self.compressor.compress(&snap.draw_lists);
            self.compressed_from = Arc::clone(&snap.draw_lists);
            trace!("snapshot {}: {} draw list(s) compressed", snap.seq, self.draw_lists.len());
        }
        self.texture_ids = snap.textures.ids();
    }

    fn forward(&self, event: Event) {
        if self.events.send(event).is_err() {
            trace!("event dropped, producer handle is gone");
        }
    }
}

/// Register the `imgui.*` variables.
pub fn register_vars(server: &mut Incppect<ImGuiState>) -> Result<(), IncppectError> {
    type Ctx<'a> = GetterCtx<'a, ImGuiState>;

    server.var("imgui.n_textures", |c: &Ctx<'_>| {
        view::i32(c.state.texture_ids.len() as i32)
    })?;
    server.var("imgui.texture_id[%d]", |c: &Ctx<'_>| {
        c.state.texture_at(c.idx(0)).map(view::u32).unwrap_or_default()
    })?;
    server.var("imgui.texture_revision[%d]", |c: &Ctx<'_>| {
        texture_by_id(c)
            .map(|t| view::i32(t.revision))
            .unwrap_or_default()
    })?;
    server.var("imgui.texture_data[%d]", |c: &Ctx<'_>| {
        texture_by_id(c).map(|t| t.record().clone()).unwrap_or_default()
    })?;

    server.var("imgui.n_draw_lists", |c: &Ctx<'_>| {
        view::i32(c.state.draw_lists.len() as i32)
    })?;
    server.var("imgui.draw_list[%d]", |c: &Ctx<'_>| {
        c.idx(0)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| c.state.draw_lists.get(i).cloned())
            .unwrap_or_default()
    })?;

    server.var("imgui.mouse_cursor", |c: &Ctx<'_>| {
        view::i32(c.state.snapshot().info.mouse_cursor as i32)
    })?;
    server.var("imgui.control_id", |c: &Ctx<'_>| {
        view::i32(c.state.snapshot().info.control_id)
    })?;
    server.var("imgui.control_ip", |c: &Ctx<'_>| {
        Bytes::copy_from_slice(&c.state.snapshot().info.control_ip)
    })?;
    server.var("imgui.want_input_text", |c: &Ctx<'_>| {
        let info = &c.state.snapshot().info;
        let want = info.want_text_input && info.control_id == c.client_id;
        Bytes::copy_from_slice(&[want as u8])
    })?;
    server.var("imgui.mouse_pos", |c: &Ctx<'_>| {
        view::f32s(&c.state.snapshot().info.mouse_pos)
    })?;
    server.var("imgui.viewport_size", |c: &Ctx<'_>| {
        view::f32s(&c.state.snapshot().info.viewport_size)
    })?;
    server.var("imgui.clipboard", |c: &Ctx<'_>| view::str(&c.state.clipboard_text.text))?;

    Ok(())
}

fn texture_by_id<'a>(c: &GetterCtx<'a, ImGuiState>) -> Option<&'a crate::texture::Texture> {
    let id = TextureId::try_from(c.idx(0)?).ok()?;
    c.state.snapshot().textures.get(id)
}

impl Service for ImGuiState {
    fn on_client_event(&mut self, server: &mut Incppect<Self>, client_id: ClientId, event: ClientEvent<'_>) {
        match event {
            ClientEvent::Connected { ip } => {
                self.n_connected.store(server.num_connected(), Ordering::Release);
                self.forward(Event::new(client_id, EventKind::Connected { ip }));
            }
            ClientEvent::Disconnected => {
                self.n_connected.store(server.num_connected(), Ordering::Release);
                self.forward(Event::new(client_id, EventKind::Disconnected));
            }
            ClientEvent::Custom(payload) => match EventKind::parse(payload) {
                Ok(kind) => self.forward(Event::new(client_id, kind)),
                Err(e) => warn!("client {client_id}: {e}"),
            },
        }
    }

    fn on_tick(&mut self, server: &mut Incppect<Self>) {
        self.poll_snapshot();

        if let Some(clipboard) = self.poll_clipboard() {
            let control_id = self.snapshot.info.control_id;
            let text = Bytes::copy_from_slice(clipboard.text.as_bytes());
            if control_id >= 0 && server.add_server_event(control_id, EVENT_SET_CLIPBOARD, text) {
                debug!("clipboard sent to client {control_id}");
            }
        }

        while let Ok((client_id, event_id, payload)) = self.server_events.try_recv() {
            if !server.add_server_event(client_id, event_id, payload) {
                debug!("server event {event_id} dropped, client {client_id} is not connected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use incppect_core::Parameters;

    use crate::draw::DrawList;
    use crate::service::ImGuiWsBuilder;

    #[test]
    fn poll_reports_new_snapshots_only() {
        let (mut gui, mut net) = ImGuiWsBuilder::new(Parameters::default()).split().unwrap();
        assert!(!net.state.poll_snapshot());

        gui.set_draw_data(vec![DrawList::default(); 2]);
        assert!(net.state.poll_snapshot());
        assert_eq!(net.state.snapshot().draw_lists.len(), 2);
        assert_eq!(net.state.draw_lists.len(), 2);
        assert!(!net.state.poll_snapshot());
    }

    #[test]
    fn concurrent_reader_never_sees_torn_snapshot() {
        const FRAMES: u64 = 20_000;

        let (mut gui, mut net) = ImGuiWsBuilder::new(Parameters::default()).split().unwrap();
        let writer = std::thread::spawn(move || {
            for k in 1..=FRAMES {
                gui.set_draw_data(vec![DrawList {
                    idx: vec![k as u16; 16],
                    ..Default::default()
                }]);
            }
            gui
        });

        let mut last_seq = 0;
        while last_seq < FRAMES {
            if !net.state.poll_snapshot() {
                std::thread::yield_now();
                continue;
            }
            let snap = net.state.snapshot();
            assert!(snap.seq > last_seq, "seq went back: {} after {last_seq}", snap.seq);
            let idx = &snap.draw_lists[0].idx;
            assert!(idx.iter().all(|&v| u64::from(v) == snap.seq % 65_536));
            last_seq = snap.seq;
        }
        let _gui = writer.join().unwrap();
    }

    #[test]
    fn repeated_clipboard_text_is_delivered_again() {
        let (mut gui, mut net) = ImGuiWsBuilder::new(Parameters::default()).split().unwrap();
        gui.set_clipboard_text("same");
        assert_eq!(net.state.poll_clipboard().unwrap().text, "same");
        assert!(net.state.poll_clipboard().is_none());
        gui.set_clipboard_text("same");
        assert!(net.state.poll_clipboard().is_some());
    }
}
