//! Wire messages exchanged over the WebSocket.
//!
//! ## Client → server
//!
//! Every message starts with a little-endian `i32` type tag:
//!
//! | Tag | Message       | Body                                                   |
//! |-----|---------------|--------------------------------------------------------|
//! | 1   | subscribe     | text: `<path> <requestId> <nIdxs> <idx>...` repeated   |
//! | 2   | poll          | `i32` request ids                                      |
//! | 3   | repeat poll   | empty                                                  |
//! | 4   | custom        | opaque bytes, forwarded to the embedding layer         |
//!
//! ## Server → client
//!
//! ```text
//! frame_tag: i32 (4)        0 = raw records, 1 = RLE-XOR diff of bytes 4.. against previous frame
//! records:
//!   request_id: i32 (4)     SERVER_EVENT_TAG (-1) marks a server event
//!   tag:        i32 (4)     encoding tag, or the event id for server events
//!   size:       i32 (4)     payload size including its zero padding, a multiple of 4
//!   payload:    size bytes
//! ```

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::codec::{self, Encoding};
use crate::error::IncppectError;
use crate::session::RequestId;

// ── Constants ────────────────────────────────────────────────────

pub const MSG_SUBSCRIBE: i32 = 1;
pub const MSG_POLL: i32 = 2;
pub const MSG_REPEAT_POLL: i32 = 3;
pub const MSG_CUSTOM: i32 = 4;

/// Top-level frame tag: records follow verbatim.
pub const FRAME_RAW: i32 = 0;
/// Top-level frame tag: an RLE-XOR diff of the records follows.
pub const FRAME_DIFF: i32 = 1;

/// Reserved request id marking a server-event record.
pub const SERVER_EVENT_TAG: i32 = -1;

/// Size of the `[request_id][tag][size]` record header.
pub const RECORD_HEADER_SIZE: usize = 12;

/// Size of the top-level frame tag.
pub const FRAME_TAG_SIZE: usize = 4;

// ── Client messages ──────────────────────────────────────────────

/// One `<path> <requestId> <nIdxs> <idx>...` tuple of a subscribe message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub path: String,
    pub request_id: RequestId,
    pub idxs: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe(Vec<Subscription>),
    Poll(Vec<RequestId>),
    RepeatPoll,
    Custom(Bytes),
}

impl ClientMessage {
    /// Parse one binary WebSocket message.
    pub fn parse(data: &[u8]) -> Result<Self, IncppectError> {
        if data.len() < 4 {
            return Err(IncppectError::MessageTooShort(data.len()));
        }
        let mut buf = data;
        let tag = buf.get_i32_le();

        match tag {
            MSG_SUBSCRIBE => Ok(ClientMessage::Subscribe(parse_subscriptions(buf)?)),
            MSG_POLL => {
                if buf.len() % 4 != 0 {
                    return Err(IncppectError::MalformedMessage(
                        "poll body is not a whole number of request ids",
                    ));
                }
                let mut ids = Vec::with_capacity(buf.len() / 4);
                while buf.has_remaining() {
                    ids.push(buf.get_i32_le());
                }
                Ok(ClientMessage::Poll(ids))
            }
            MSG_REPEAT_POLL => Ok(ClientMessage::RepeatPoll),
            MSG_CUSTOM => Ok(ClientMessage::Custom(Bytes::copy_from_slice(buf))),
            other => Err(IncppectError::UnknownMessageType(other)),
        }
    }

    /// Serialize the message the way a browser client sends it.
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        match self {
            ClientMessage::Subscribe(subs) => {
                out.put_i32_le(MSG_SUBSCRIBE);
                let mut text = String::new();
                for sub in subs {
                    text.push_str(&format!("{} {} {}", sub.path, sub.request_id, sub.idxs.len()));
                    for idx in &sub.idxs {
                        text.push_str(&format!(" {idx}"));
                    }
                    text.push(' ');
                }
                out.put_slice(text.as_bytes());
            }
            ClientMessage::Poll(ids) => {
                out.put_i32_le(MSG_POLL);
                for id in ids {
                    out.put_i32_le(*id);
                }
            }
            ClientMessage::RepeatPoll => out.put_i32_le(MSG_REPEAT_POLL),
            ClientMessage::Custom(payload) => {
                out.put_i32_le(MSG_CUSTOM);
                out.put_slice(payload);
            }
        }
        out.freeze()
    }

    /// Whether handling this message should trigger an immediate update.
    pub fn triggers_update(&self) -> bool {
        !matches!(self, ClientMessage::Custom(_))
    }
}

/// Parse the textual body of a subscribe message.
///
/// A malformed tuple ends parsing; the tuples before it are kept.
fn parse_subscriptions(body: &[u8]) -> Result<Vec<Subscription>, IncppectError> {
    let end = body.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let text = std::str::from_utf8(&body[..end])?;
    let mut tokens = text.split_ascii_whitespace();
    let mut subs = Vec::new();

    while let Some(path) = tokens.next() {
        match parse_tuple(path, &mut tokens) {
            Ok(sub) => subs.push(sub),
            Err(e) => {
                warn!("dropping rest of subscribe message: {e}");
                break;
            }
        }
    }

    Ok(subs)
}

fn parse_tuple<'a>(
    path: &str,
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<Subscription, IncppectError> {
    let mut number = |what: &str| -> Result<i32, IncppectError> {
        let token = tokens
            .next()
            .ok_or_else(|| IncppectError::InvalidSubscription(format!("{path}: missing {what}")))?;
        token
            .parse::<i32>()
            .map_err(|_| IncppectError::InvalidSubscription(format!("{path}: bad {what} '{token}'")))
    };

    let request_id = number("request id")?;
    let n_idxs = number("index count")?;
    let n_idxs = usize::try_from(n_idxs)
        .map_err(|_| IncppectError::InvalidSubscription(format!("{path}: negative index count")))?;

    let mut idxs = Vec::with_capacity(n_idxs.min(16));
    for _ in 0..n_idxs {
        idxs.push(number("index")?);
    }

    Ok(Subscription {
        path: path.to_string(),
        request_id,
        idxs,
    })
}

// ── Server frames ────────────────────────────────────────────────

/// One decoded record of a server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRecord {
    /// Current value of a subscribed variable.
    Var { request_id: RequestId, payload: Bytes },
    /// A custom event queued for this client.
    Event { event_id: i32, payload: Bytes },
}

/// Client-side frame decoder.
///
/// Keeps the same diff history a browser keeps: the previous raw frame and
/// the previous payload of every request.
#[derive(Debug, Default)]
pub struct ClientDecoder {
    prev_frame: Vec<u8>,
    prev_payloads: HashMap<RequestId, Vec<u8>>,
}

impl ClientDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one binary frame into its records.
    pub fn decode(&mut self, frame: &[u8]) -> Result<Vec<ServerRecord>, IncppectError> {
        if frame.len() < FRAME_TAG_SIZE {
            return Err(IncppectError::MessageTooShort(frame.len()));
        }
        let tag = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);

        let raw = match tag {
            FRAME_RAW => frame.to_vec(),
            FRAME_DIFF => {
                if self.prev_frame.len() < FRAME_TAG_SIZE {
                    return Err(IncppectError::InvalidDiff("frame diff without a previous frame"));
                }
                let body = codec::decode_diff(&frame[FRAME_TAG_SIZE..], &self.prev_frame[FRAME_TAG_SIZE..])?;
                let mut raw = Vec::with_capacity(FRAME_TAG_SIZE + body.len());
                raw.extend_from_slice(&FRAME_RAW.to_le_bytes());
                raw.extend_from_slice(&body);
                raw
            }
            other => return Err(IncppectError::UnknownMessageType(other)),
        };

        let records = self.decode_records(&raw[FRAME_TAG_SIZE..])?;
        self.prev_frame = raw;
        Ok(records)
    }

    fn decode_records(&mut self, mut buf: &[u8]) -> Result<Vec<ServerRecord>, IncppectError> {
        let mut records = Vec::new();

        while buf.has_remaining() {
            if buf.remaining() < RECORD_HEADER_SIZE {
                return Err(IncppectError::InvalidDiff("truncated record header"));
            }
            let request_id = buf.get_i32_le();
            let tag = buf.get_i32_le();
            let size = usize::try_from(buf.get_i32_le())
                .map_err(|_| IncppectError::InvalidDiff("negative record size"))?;
            if codec::padding(size) != 0 {
                return Err(IncppectError::InvalidDiff("unaligned record size"));
            }
            if buf.remaining() < size {
                return Err(IncppectError::InvalidDiff("truncated record payload"));
            }
            let data = &buf[..size];
            buf = &buf[size..];

            if request_id == SERVER_EVENT_TAG {
                records.push(ServerRecord::Event {
                    event_id: tag,
                    payload: Bytes::copy_from_slice(data),
                });
                continue;
            }

            let payload = match Encoding::from_tag(tag) {
                Some(Encoding::Full) => data.to_vec(),
                Some(Encoding::RleXor) => {
                    let prev = self
                        .prev_payloads
                        .get(&request_id)
                        .ok_or(IncppectError::InvalidDiff("record diff without a previous payload"))?;
                    codec::decode_diff(data, prev)?
                }
                None => return Err(IncppectError::InvalidDiff("unknown record encoding")),
            };
            self.prev_payloads.insert(request_id, payload.clone());
            records.push(ServerRecord::Var {
                request_id,
                payload: Bytes::from(payload),
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(tag: i32, body: &[u8]) -> Vec<u8> {
        let mut out = tag.to_le_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn parse_subscribe_tuples() {
        let msg = message(1, b"imgui.n_textures 7 0 imgui.texture_id[%d] 8 1 2\0");
        let parsed = ClientMessage::parse(&msg).unwrap();
        assert_eq!(
            parsed,
            ClientMessage::Subscribe(vec![
                Subscription {
                    path: "imgui.n_textures".into(),
                    request_id: 7,
                    idxs: vec![],
                },
                Subscription {
                    path: "imgui.texture_id[%d]".into(),
                    request_id: 8,
                    idxs: vec![2],
                },
            ])
        );
    }

    #[test]
    fn malformed_tuple_keeps_earlier_ones() {
        let msg = message(1, b"a 1 0 b 2 x");
        match ClientMessage::parse(&msg).unwrap() {
            ClientMessage::Subscribe(subs) => {
                assert_eq!(subs.len(), 1);
                assert_eq!(subs[0].path, "a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parse_poll_ids() {
        let mut body = Vec::new();
        body.extend_from_slice(&7i32.to_le_bytes());
        body.extend_from_slice(&9i32.to_le_bytes());
        let parsed = ClientMessage::parse(&message(2, &body)).unwrap();
        assert_eq!(parsed, ClientMessage::Poll(vec![7, 9]));
    }

    #[test]
    fn poll_with_partial_id_is_malformed() {
        let err = ClientMessage::parse(&message(2, &[1, 2, 3])).unwrap_err();
        assert!(matches!(err, IncppectError::MalformedMessage(_)));
    }

    #[test]
    fn short_and_unknown_messages_are_errors() {
        assert!(matches!(
            ClientMessage::parse(&[1, 0]),
            Err(IncppectError::MessageTooShort(2))
        ));
        assert!(matches!(
            ClientMessage::parse(&message(9, &[])),
            Err(IncppectError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn custom_does_not_trigger_update() {
        let parsed = ClientMessage::parse(&message(4, b"3 10 20")).unwrap();
        assert_eq!(parsed, ClientMessage::Custom(Bytes::from_static(b"3 10 20")));
        assert!(!parsed.triggers_update());
        assert!(ClientMessage::RepeatPoll.triggers_update());
    }

    #[test]
    fn encode_matches_parse() {
        let msg = ClientMessage::Subscribe(vec![Subscription {
            path: "my_id[%d]".into(),
            request_id: 1,
            idxs: vec![-1],
        }]);
        assert_eq!(ClientMessage::parse(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn decoder_reads_vars_and_events() {
        let mut frame = BytesMut::new();
        frame.put_i32_le(FRAME_RAW);
        frame.put_i32_le(7);
        frame.put_i32_le(0);
        frame.put_i32_le(4);
        frame.put_slice(&[5, 0, 0, 0]);
        frame.put_i32_le(SERVER_EVENT_TAG);
        frame.put_i32_le(0);
        frame.put_i32_le(4);
        frame.put_slice(b"hi\0\0");

        let records = ClientDecoder::new().decode(&frame).unwrap();
        assert_eq!(
            records,
            vec![
                ServerRecord::Var {
                    request_id: 7,
                    payload: Bytes::from_static(&[5, 0, 0, 0]),
                },
                ServerRecord::Event {
                    event_id: 0,
                    payload: Bytes::from_static(b"hi\0\0"),
                },
            ]
        );
    }

    #[test]
    fn decoder_rejects_unaligned_record_size() {
        let mut frame = BytesMut::new();
        frame.put_i32_le(FRAME_RAW);
        frame.put_i32_le(7);
        frame.put_i32_le(0);
        frame.put_i32_le(1);
        frame.put_slice(&[5, 0, 0, 0]);
        assert!(matches!(
            ClientDecoder::new().decode(&frame),
            Err(IncppectError::InvalidDiff("unaligned record size"))
        ));
    }

    #[test]
    fn decoder_rejects_diff_without_history() {
        let frame = message(FRAME_DIFF, &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(ClientDecoder::new().decode(&frame).is_err());
    }
}
