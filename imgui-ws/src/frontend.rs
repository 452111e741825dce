//! Narrow hook interface for the GUI being streamed.

use std::time::Duration;

use crate::draw::{DrawInfo, DrawList, MouseCursor};
use crate::event::Event;
use crate::service::ImGuiWs;

/// What one call to [`Frontend::on_draw`] produced.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    pub draw_lists: Vec<DrawList>,
    pub mouse_cursor: MouseCursor,
    pub mouse_pos: [f32; 2],
    pub viewport_size: [f32; 2],
    pub want_text_input: bool,
    /// New clipboard contents, if the GUI copied something.
    pub clipboard: Option<String>,
}

/// The GUI driven by [`ImGuiWs::run_frame`].
pub trait Frontend {
    /// Apply one input event from the controlling client.
    fn on_input(&mut self, event: &Event);

    /// Build the next frame.
    fn on_draw(&mut self, dt: Duration) -> FrameOutput;
}

impl ImGuiWs {
    /// Feed pending input to `frontend`, draw, and publish the frame.
    ///
    /// Drawing is skipped while nobody is connected, unless a recording is
    /// running. Returns whether a frame was published. The controller fields
    /// of the published [`DrawInfo`] come from the control arbiter, not from
    /// the frontend.
    pub fn run_frame<F: Frontend + ?Sized>(&mut self, frontend: &mut F, dt: Duration) -> bool {
        for event in self.take_events() {
            frontend.on_input(&event);
        }
        if self.num_connected() == 0 && !self.is_recording() {
            return false;
        }

        let out = frontend.on_draw(dt);
        let info = DrawInfo {
            mouse_cursor: out.mouse_cursor,
            control_id: self.arbiter().controller().unwrap_or(-1),
            control_ip: self.arbiter().controller_ip().unwrap_or([0; 4]),
            mouse_pos: out.mouse_pos,
            viewport_size: out.viewport_size,
            want_text_input: out.want_text_input,
        };

        self.snapshot_mut().info = info;
        self.set_draw_data(out.draw_lists);

        if let Some(text) = out.clipboard {
            self.set_clipboard_text(text);
        }
        true
    }
}
