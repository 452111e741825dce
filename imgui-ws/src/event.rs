//! Typed input events.
//!
//! Browsers send input as the body of a custom (type 4) message: ASCII text
//! starting with the event type code, followed by its fields separated by
//! whitespace. Text-carrying events take the rest of the message verbatim.
//!
//! | Code | Event           | Fields            |
//! |------|-----------------|-------------------|
//! | 3    | mouse move      | `x y`             |
//! | 4    | mouse down      | `button x y`      |
//! | 5    | mouse up        | `button x y`      |
//! | 6    | mouse wheel     | `dx dy`           |
//! | 7    | key press       | `char_code`       |
//! | 8    | key down        | `key_code`        |
//! | 9    | key up          | `key_code`        |
//! | 10   | resize          | `width height`    |
//! | 11   | take control    |                   |
//! | 12   | paste clipboard | `text...`         |
//! | 13   | input text      | `text...`         |
//!
//! Codes 1 and 2 (connected / disconnected) are produced by the server only.

use std::str::FromStr;

use incppect_core::ClientId;

use crate::error::ImGuiWsError;

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Connected { ip: [u8; 4] },
    Disconnected,
    MouseMove { x: f32, y: f32 },
    MouseDown { button: i32, x: f32, y: f32 },
    MouseUp { button: i32, x: f32, y: f32 },
    MouseWheel { dx: f32, dy: f32 },
    KeyPress { key: i32 },
    KeyDown { key: i32 },
    KeyUp { key: i32 },
    Resize { width: i32, height: i32 },
    TakeControl,
    PasteClipboard { text: String },
    InputText { text: String },
}

/// An event attributed to the client that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub client_id: ClientId,
    pub kind: EventKind,
}

impl Event {
    pub fn new(client_id: ClientId, kind: EventKind) -> Self {
        Self { client_id, kind }
    }
}

impl EventKind {
    /// Wire type code.
    pub fn code(&self) -> i32 {
        match self {
            EventKind::Connected { .. } => 1,
            EventKind::Disconnected => 2,
            EventKind::MouseMove { .. } => 3,
            EventKind::MouseDown { .. } => 4,
            EventKind::MouseUp { .. } => 5,
            EventKind::MouseWheel { .. } => 6,
            EventKind::KeyPress { .. } => 7,
            EventKind::KeyDown { .. } => 8,
            EventKind::KeyUp { .. } => 9,
            EventKind::Resize { .. } => 10,
            EventKind::TakeControl => 11,
            EventKind::PasteClipboard { .. } => 12,
            EventKind::InputText { .. } => 13,
        }
    }

    /// Parse the body of a custom message sent by a browser.
    pub fn parse(payload: &[u8]) -> Result<Self, ImGuiWsError> {
        let end = payload.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        let text = std::str::from_utf8(&payload[..end])
            .map_err(|e| ImGuiWsError::InvalidEvent(format!("not utf-8: {e}")))?;
        let text = text.trim_start();

        let (code, rest) = match text.split_once(char::is_whitespace) {
            Some((code, rest)) => (code, rest),
            None => (text, ""),
        };
        let code: i32 = code
            .parse()
            .map_err(|_| ImGuiWsError::InvalidEvent(format!("bad event type '{code}'")))?;

        let mut fields = Fields {
            tokens: rest.split_ascii_whitespace(),
            code,
        };

        let kind = match code {
            3 => EventKind::MouseMove {
                x: fields.next()?,
                y: fields.next()?,
            },
            4 => EventKind::MouseDown {
                button: fields.next()?,
                x: fields.next()?,
                y: fields.next()?,
            },
            5 => EventKind::MouseUp {
                button: fields.next()?,
                x: fields.next()?,
                y: fields.next()?,
            },
            6 => EventKind::MouseWheel {
                dx: fields.next()?,
                dy: fields.next()?,
            },
            7 => EventKind::KeyPress { key: fields.next()? },
            8 => EventKind::KeyDown { key: fields.next()? },
            9 => EventKind::KeyUp { key: fields.next()? },
            10 => EventKind::Resize {
                width: fields.next()?,
                height: fields.next()?,
            },
            11 => EventKind::TakeControl,
            12 => EventKind::PasteClipboard {
                text: rest.to_string(),
            },
            13 => EventKind::InputText {
                text: rest.to_string(),
            },
            other => {
                return Err(ImGuiWsError::InvalidEvent(format!("unknown event type {other}")));
            }
        };
        Ok(kind)
    }

    /// Serialize the way a browser sends it.
    pub fn encode(&self) -> String {
        let code = self.code();
        match self {
            EventKind::MouseMove { x, y } => format!("{code} {x} {y}"),
            EventKind::MouseDown { button, x, y } | EventKind::MouseUp { button, x, y } => {
                format!("{code} {button} {x} {y}")
            }
            EventKind::MouseWheel { dx, dy } => format!("{code} {dx} {dy}"),
            EventKind::KeyPress { key } | EventKind::KeyDown { key } | EventKind::KeyUp { key } => {
                format!("{code} {key}")
            }
            EventKind::Resize { width, height } => format!("{code} {width} {height}"),
            EventKind::PasteClipboard { text } | EventKind::InputText { text } => {
                format!("{code} {text}")
            }
            EventKind::Connected { .. } | EventKind::Disconnected | EventKind::TakeControl => {
                code.to_string()
            }
        }
    }
}

struct Fields<'a> {
    tokens: std::str::SplitAsciiWhitespace<'a>,
    code: i32,
}

impl Fields<'_> {
    fn next<T: FromStr>(&mut self) -> Result<T, ImGuiWsError> {
        let token = self
            .tokens
            .next()
            .ok_or_else(|| ImGuiWsError::InvalidEvent(format!("event {}: missing field", self.code)))?;
        token
            .parse()
            .map_err(|_| ImGuiWsError::InvalidEvent(format!("event {}: bad field '{token}'", self.code)))
    }
}
