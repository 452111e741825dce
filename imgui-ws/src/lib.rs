//! # imgui-ws
//!
//! Streams an immediate-mode GUI to web browsers over Incppect.
//!
//! The GUI thread publishes draw lists, textures and per-frame info through
//! an [`ImGuiWs`] handle; a network thread serves them as `imgui.*` variables
//! and sends input back. Only one client (the controller) drives the GUI at a
//! time.
//!
//! - **Draw / Texture**: the snapshot data model and texture wire records
//! - **Compressor**: pluggable draw-list serialization
//! - **Event / Control**: typed input events and single-controller arbitration
//! - **Adapter**: the network-side [`Service`](incppect_core::Service), fed
//!   through [`arc_swap::ArcSwap`] latest-value slots
//! - **Record**: draw-list recording to `.imgrcd` files and looping replay
//! - **Service / Frontend**: the producer handle and the GUI hook trait

pub mod adapter;
pub mod compressor;
pub mod control;
pub mod draw;
pub mod error;
pub mod event;
pub mod frontend;
pub mod record;
pub mod service;
pub mod texture;

// ── Re-exports ───────────────────────────────────────────────────

pub use adapter::{ClipboardText, EVENT_SET_CLIPBOARD, ImGuiState};
pub use compressor::{DrawDataCompressor, VtxOffsetCompressor};
pub use control::{ControlArbiter, ControlState};
pub use draw::{DrawCmd, DrawInfo, DrawList, DrawSnapshot, DrawVert, MouseCursor};
pub use error::ImGuiWsError;
pub use event::{Event, EventKind};
pub use frontend::{FrameOutput, Frontend};
pub use record::{RECORD_EXTENSION, Replay, Session};
pub use service::{ImGuiWs, ImGuiWsBuilder, Network};
pub use texture::{Texture, TextureId, TextureSet, TextureType};
