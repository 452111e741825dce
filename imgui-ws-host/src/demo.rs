//! A small draggable window, enough to exercise every stream the browser
//! client consumes: geometry, a texture, cursor shape and clipboard.

use std::time::Duration;

use imgui_ws::{DrawCmd, DrawList, DrawVert, Event, EventKind, FrameOutput, Frontend, MouseCursor};

/// Texture id of the 1x1 white pixel every quad samples.
pub const WHITE_TEXTURE: u32 = 1;

const TITLE_HEIGHT: f32 = 24.0;
const KEY_C: i32 = 'c' as i32;

pub struct Demo {
    pos: [f32; 2],
    size: [f32; 2],
    /// Pointer offset inside the title bar while dragging.
    grab: Option<[f32; 2]>,
    mouse: [f32; 2],
    viewport: [f32; 2],
    key_presses: u32,
    pasted: String,
    clipboard: Option<String>,
    elapsed: f32,
}

impl Default for Demo {
    fn default() -> Self {
        Self {
            pos: [40.0, 40.0],
            size: [320.0, 180.0],
            grab: None,
            mouse: [0.0; 2],
            viewport: [1280.0, 720.0],
            key_presses: 0,
            pasted: String::new(),
            clipboard: None,
            elapsed: 0.0,
        }
    }
}

impl Demo {
    fn title_contains(&self, [x, y]: [f32; 2]) -> bool {
        let [px, py] = self.pos;
        x >= px && x <= px + self.size[0] && y >= py && y <= py + TITLE_HEIGHT
    }
}

impl Frontend for Demo {
    fn on_input(&mut self, event: &Event) {
        match &event.kind {
            EventKind::MouseMove { x, y } => {
                self.mouse = [*x, *y];
                if let Some([gx, gy]) = self.grab {
                    self.pos = [x - gx, y - gy];
                }
            }
            EventKind::MouseDown { button: 0, x, y } if self.title_contains([*x, *y]) => {
                self.grab = Some([x - self.pos[0], y - self.pos[1]]);
            }
            EventKind::MouseUp { button: 0, .. } => self.grab = None,
            EventKind::Resize { width, height } => self.viewport = [*width as f32, *height as f32],
            EventKind::KeyPress { key } => {
                self.key_presses += 1;
                if *key == KEY_C {
                    self.clipboard = Some(format!("{} key presses", self.key_presses));
                }
            }
            EventKind::PasteClipboard { text } | EventKind::InputText { text } => {
                self.pasted.push_str(text);
                if self.pasted.len() > 256 {
                    self.pasted.clear();
                }
            }
            _ => {}
        }
    }

    fn on_draw(&mut self, dt: Duration) -> FrameOutput {
        self.elapsed += dt.as_secs_f32();

        let mut list = DrawList::default();
        let [x, y] = self.pos;
        let [w, h] = self.size;
        let pulse = ((self.elapsed * 2.0).sin() * 0.5 + 0.5) * 255.0;
        let title_col = 0xff00_0000 | (pulse as u32) << 8 | 0x40;
        let bar = (self.key_presses % 32) as f32 / 32.0 * (w - 16.0);

        quad(&mut list, [x, y, x + w, y + h], 0xf020_2020);
        quad(&mut list, [x, y, x + w, y + TITLE_HEIGHT], title_col);
        quad(&mut list, [x + 8.0, y + h - 24.0, x + 8.0 + bar, y + h - 8.0], 0xff40_c040);
        list.cmds.push(DrawCmd {
            clip_rect: [x, y, x + w, y + h],
            texture_id: WHITE_TEXTURE,
            vtx_offset: 0,
            idx_offset: 0,
            elem_count: list.idx.len() as u32,
        });

        let hovering = self.title_contains(self.mouse) || self.grab.is_some();
        FrameOutput {
            draw_lists: vec![list],
            mouse_cursor: if hovering { MouseCursor::Hand } else { MouseCursor::Arrow },
            mouse_pos: self.mouse,
            viewport_size: self.viewport,
            want_text_input: false,
            clipboard: self.clipboard.take(),
        }
    }
}

fn quad(list: &mut DrawList, [x0, y0, x1, y1]: [f32; 4], col: u32) {
    let base = list.vtx.len() as u16;
    for pos in [[x0, y0], [x1, y0], [x1, y1], [x0, y1]] {
        list.vtx.push(DrawVert {
            pos,
            uv: [0.5, 0.5],
            col,
        });
    }
    list.idx
        .extend([0, 1, 2, 0, 2, 3].into_iter().map(|i| base + i));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind) -> Event {
        Event::new(1, kind)
    }

    #[test]
    fn draws_three_quads() {
        let mut demo = Demo::default();
        let out = demo.on_draw(Duration::from_millis(16));
        assert_eq!(out.draw_lists.len(), 1);
        assert_eq!(out.draw_lists[0].vtx.len(), 12);
        assert_eq!(out.draw_lists[0].cmds[0].elem_count, 18);
    }

    #[test]
    fn title_bar_drag_moves_window() {
        let mut demo = Demo::default();
        demo.on_input(&ev(EventKind::MouseDown { button: 0, x: 50.0, y: 50.0 }));
        demo.on_input(&ev(EventKind::MouseMove { x: 150.0, y: 70.0 }));
        demo.on_input(&ev(EventKind::MouseUp { button: 0, x: 150.0, y: 70.0 }));
        demo.on_input(&ev(EventKind::MouseMove { x: 400.0, y: 400.0 }));
        assert_eq!(demo.pos, [140.0, 60.0]);
    }

    #[test]
    fn copy_key_sets_clipboard_once() {
        let mut demo = Demo::default();
        demo.on_input(&ev(EventKind::KeyPress { key: KEY_C }));
        let out = demo.on_draw(Duration::ZERO);
        assert_eq!(out.clipboard.as_deref(), Some("1 key presses"));
        assert!(demo.on_draw(Duration::ZERO).clipboard.is_none());
    }
}
