//! Draw data model handed from the GUI thread to the network thread.

use std::sync::Arc;

use incppect_core::ClientId;
use serde::{Deserialize, Serialize};

use crate::texture::TextureSet;

/// One vertex, laid out like an immediate-mode GUI vertex.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawVert {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    /// Packed RGBA.
    pub col: u32,
}

/// One draw call of a draw list.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawCmd {
    /// `[min_x, min_y, max_x, max_y]`.
    pub clip_rect: [f32; 4],
    pub texture_id: u32,
    pub vtx_offset: u32,
    pub idx_offset: u32,
    pub elem_count: u32,
}

/// Geometry of one window or layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawList {
    pub vtx: Vec<DrawVert>,
    pub idx: Vec<u16>,
    pub cmds: Vec<DrawCmd>,
}

/// Cursor shape the browser should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum MouseCursor {
    None = -1,
    #[default]
    Arrow = 0,
    TextInput = 1,
    ResizeAll = 2,
    ResizeNs = 3,
    ResizeEw = 4,
    ResizeNesw = 5,
    ResizeNwse = 6,
    Hand = 7,
    NotAllowed = 8,
}

/// Per-frame metadata published next to the draw lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawInfo {
    pub mouse_cursor: MouseCursor,
    /// Current controller, or -1.
    pub control_id: ClientId,
    pub control_ip: [u8; 4],
    /// Controller's mouse, mirrored to observers.
    pub mouse_pos: [f32; 2],
    pub viewport_size: [f32; 2],
    pub want_text_input: bool,
}

impl Default for DrawInfo {
    fn default() -> Self {
        Self {
            mouse_cursor: MouseCursor::Arrow,
            control_id: -1,
            control_ip: [0; 4],
            mouse_pos: [0.0; 2],
            viewport_size: [0.0; 2],
            want_text_input: false,
        }
    }
}

/// A complete, immutable frame as seen by the network thread.
///
/// Large parts are behind `Arc`, so republishing after a metadata-only
/// change does not copy geometry or pixels.
#[derive(Debug, Clone, Default)]
pub struct DrawSnapshot {
    /// Incremented by the producer on every publish.
    pub seq: u64,
    pub draw_lists: Arc<Vec<DrawList>>,
    pub textures: Arc<TextureSet>,
    pub info: DrawInfo,
}
