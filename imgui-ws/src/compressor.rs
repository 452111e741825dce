//! Draw-list serialization for `imgui.draw_list[%d]`.
//!
//! Compressors run on the network thread once per new snapshot. The default,
//! [`VtxOffsetCompressor`], writes positions and clip rectangles relative to
//! the first vertex of the list, so a window that only moves serializes to
//! the same bytes (apart from the offset in the header) and the per-request
//! diff collapses it to a few words.
//!
//! ```text
//! header:   n_vtx u32 | n_idx u32 | n_cmd u32 | offset_x f32 | offset_y f32
//! vertices: x f32 | y f32 | u f32 | v f32 | col u32          (n_vtx times)
//! indices:  u16 each, zero-padded to a multiple of 4
//! commands: elem_count u32 | clip 4 x f32 | texture_id u32
//!           | vtx_offset u32 | idx_offset u32                (n_cmd times)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::draw::DrawList;

pub const LIST_HEADER_SIZE: usize = 20;
pub const VERTEX_SIZE: usize = 20;
pub const COMMAND_SIZE: usize = 32;

/// Turns draw lists into the bytes served to browsers, one buffer per list.
pub trait DrawDataCompressor: Send {
    fn compress(&mut self, lists: &[DrawList]) -> Vec<Bytes>;
}

/// Vertex-offset serialization.
#[derive(Debug, Default, Clone, Copy)]
pub struct VtxOffsetCompressor;

impl DrawDataCompressor for VtxOffsetCompressor {
    fn compress(&mut self, lists: &[DrawList]) -> Vec<Bytes> {
        lists.iter().map(compress_list).collect()
    }
}

fn compress_list(list: &DrawList) -> Bytes {
    let [ox, oy] = list.vtx.first().map_or([0.0; 2], |v| v.pos);

    let idx_bytes = list.idx.len() * 2;
    let idx_padded = idx_bytes.next_multiple_of(4);
    let mut buf = BytesMut::with_capacity(
        LIST_HEADER_SIZE
            + list.vtx.len() * VERTEX_SIZE
            + idx_padded
            + list.cmds.len() * COMMAND_SIZE,
    );

    buf.put_u32_le(list.vtx.len() as u32);
    buf.put_u32_le(list.idx.len() as u32);
    buf.put_u32_le(list.cmds.len() as u32);
    buf.put_f32_le(ox);
    buf.put_f32_le(oy);

    for v in &list.vtx {
        buf.put_f32_le(v.pos[0] - ox);
        buf.put_f32_le(v.pos[1] - oy);
        buf.put_f32_le(v.uv[0]);
        buf.put_f32_le(v.uv[1]);
        buf.put_u32_le(v.col);
    }

    for i in &list.idx {
        buf.put_u16_le(*i);
    }
    buf.put_bytes(0, idx_padded - idx_bytes);

    for cmd in &list.cmds {
        let [x0, y0, x1, y1] = cmd.clip_rect;
        buf.put_u32_le(cmd.elem_count);
        buf.put_f32_le(x0 - ox);
        buf.put_f32_le(y0 - oy);
        buf.put_f32_le(x1 - ox);
        buf.put_f32_le(y1 - oy);
        buf.put_u32_le(cmd.texture_id);
        buf.put_u32_le(cmd.vtx_offset);
        buf.put_u32_le(cmd.idx_offset);
    }

    buf.freeze()
}
