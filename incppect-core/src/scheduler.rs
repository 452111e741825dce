//! Update scheduler: turns a session's due requests into one outbound frame.
//!
//! For every request of a session two gates are checked:
//!
//! 1. the client still wants it (polled recently, or polls never expire);
//! 2. the request's minimum update interval has passed.
//!
//! Requests passing both gates have their getter invoked and a record
//! appended, diffed against the previous payload when [`Encoding::choose`]
//! allows it. Queued server events follow. Finally the whole frame is
//! diffed against the previous frame and the smaller of the two is sent.

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codec::{self, Encoding};
use crate::registry::{GetterCtx, Registry};
use crate::session::{ClientId, ClientSession, ServerStats};
use crate::wire::{FRAME_DIFF, FRAME_RAW, FRAME_TAG_SIZE, SERVER_EVENT_TAG};

/// Read-only inputs shared by every session of one update cycle.
pub struct UpdatePass<'a, S> {
    pub registry: &'a Registry<S>,
    pub state: &'a S,
    pub stats: &'a ServerStats,
    pub clients: &'a BTreeMap<ClientId, [u8; 4]>,
}

impl<S> UpdatePass<'_, S> {
    /// Build the next frame for `session`, or `None` if there is nothing to
    /// send.
    pub fn run(&self, session: &mut ClientSession, now: Instant) -> Option<Bytes> {
        let client_id = session.id;
        let mut cur = BytesMut::with_capacity(256);
        cur.put_i32_le(FRAME_RAW);

        for (&request_id, request) in session.requests.iter_mut() {
            if !(request.is_wanted(now) && request.is_due(now)) {
                continue;
            }

            let ctx = GetterCtx {
                state: self.state,
                idxs: &request.idxs,
                client_id,
                stats: self.stats,
                clients: self.clients,
            };
            let payload = self.registry.call(request.getter, &ctx);
            request.last_updated = Some(now);

            let encoding = Encoding::choose(request.prev_payload.len(), payload.len());
            cur.put_i32_le(request_id);
            cur.put_i32_le(encoding.tag());
            match encoding {
                Encoding::Full => put_padded(&mut cur, &payload),
                Encoding::RleXor => {
                    let diff = codec::encode_diff(&payload, &request.prev_payload);
                    cur.put_i32_le(diff.len() as i32);
                    cur.put_slice(&diff);
                }
            }
            trace!(client_id, request_id, ?encoding, size = payload.len(), "request updated");
            request.prev_payload = payload;
        }

        for event in session.server_events.drain(..) {
            cur.put_i32_le(SERVER_EVENT_TAG);
            cur.put_i32_le(event.event_id);
            put_padded(&mut cur, &event.payload);
        }

        if cur.len() <= FRAME_TAG_SIZE {
            return None;
        }

        let cur = cur.freeze();
        let frame = match Encoding::choose(session.prev_frame.len(), cur.len()) {
            Encoding::RleXor => {
                let mut diff = BytesMut::with_capacity(64);
                diff.put_i32_le(FRAME_DIFF);
                codec::encode_diff_into(
                    &cur[FRAME_TAG_SIZE..],
                    &session.prev_frame[FRAME_TAG_SIZE..],
                    &mut diff,
                );
                if diff.len() < cur.len() {
                    diff.freeze()
                } else {
                    cur.clone()
                }
            }
            Encoding::Full => cur.clone(),
        };

        session.prev_frame = cur;
        Some(frame)
    }
}

/// Append `[size][payload][padding]`; `size` counts the padding.
fn put_padded(out: &mut BytesMut, payload: &[u8]) {
    let padding = codec::padding(payload.len());
    out.put_i32_le((payload.len() + padding) as i32);
    out.put_slice(payload);
    out.put_bytes(0, padding);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Parameters;
    use crate::registry::view;
    use crate::session::{Request, ServerEvent};
    use crate::wire::{ClientDecoder, ServerRecord};

    struct Fixture {
        registry: Registry<Vec<u8>>,
        params: Parameters,
        stats: ServerStats,
        clients: BTreeMap<ClientId, [u8; 4]>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry: Registry<Vec<u8>> = Registry::new();
            registry
                .register("blob", |c| Bytes::copy_from_slice(c.state))
                .unwrap();
            registry
                .register("len", |c| view::i32(c.state.len() as i32))
                .unwrap();
            registry
                .register("byte[%d]", |c| {
                    let idx = c.idx(0).and_then(|i| usize::try_from(i).ok());
                    view::i32(idx.and_then(|i| c.state.get(i)).map_or(-1, |&b| i32::from(b)))
                })
                .unwrap();
            Self {
                registry,
                params: Parameters::default(),
                stats: ServerStats::default(),
                clients: BTreeMap::new(),
            }
        }

        fn run(&self, state: &Vec<u8>, session: &mut ClientSession, now: Instant) -> Option<Bytes> {
            UpdatePass {
                registry: &self.registry,
                state,
                stats: &self.stats,
                clients: &self.clients,
            }
            .run(session, now)
        }

        fn session(&self, now: Instant, getter: usize) -> ClientSession {
            let mut session = ClientSession::new(1, [127, 0, 0, 1], now);
            session.subscribe(3, Request::new(getter, Vec::new(), &self.params));
            session.poll(&[3], now, &self.params);
            session
        }

        /// One polled `byte[i]` request per index, request id `i`.
        fn indexed_session(&self, now: Instant, n: i32) -> ClientSession {
            let mut session = ClientSession::new(1, [127, 0, 0, 1], now);
            for i in 0..n {
                session.subscribe(i, Request::new(2, vec![i], &self.params));
            }
            let ids: Vec<i32> = (0..n).collect();
            session.poll(&ids, now, &self.params);
            session
        }
    }

    fn word(frame: &[u8], at: usize) -> i32 {
        i32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
    }

    fn frame_tag(frame: &[u8]) -> i32 {
        i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]])
    }

    fn record_tag(frame: &[u8]) -> i32 {
        i32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]])
    }

    #[test]
    fn unpolled_request_sends_nothing() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = ClientSession::new(1, [0; 4], now);
        session.subscribe(3, Request::new(0, Vec::new(), &fx.params));
        assert!(fx.run(&vec![1, 2, 3], &mut session, now).is_none());
    }

    #[test]
    fn rate_gate_suppresses_second_update() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 1);
        let state = vec![0u8; 8];

        assert!(fx.run(&state, &mut session, now).is_some());
        assert!(fx.run(&state, &mut session, now + Duration::from_millis(1)).is_none());
        assert!(fx.run(&state, &mut session, now + Duration::from_millis(16)).is_none());
        assert!(fx.run(&state, &mut session, now + Duration::from_millis(17)).is_some());
    }

    #[test]
    fn record_size_counts_padding() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 0);

        let frame = fx.run(&vec![1], &mut session, now).unwrap();
        assert_eq!(frame.len(), 20);
        assert_eq!(word(&frame, 12), 4);
        assert_eq!(&frame[16..], &[1, 0, 0, 0]);

        let records = ClientDecoder::new().decode(&frame).unwrap();
        assert_eq!(
            records,
            vec![ServerRecord::Var {
                request_id: 3,
                payload: Bytes::from_static(&[1, 0, 0, 0]),
            }]
        );
    }

    #[test]
    fn mostly_unchanged_frame_is_sent_as_diff() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.indexed_session(now, 24);
        let mut decoder = ClientDecoder::new();

        let mut state: Vec<u8> = (0..24).collect();
        let first = fx.run(&state, &mut session, now).unwrap();
        assert_eq!(first.len(), 4 + 24 * 16);
        assert_eq!(frame_tag(&first), FRAME_RAW);
        decoder.decode(&first).unwrap();

        state[5] = 200;
        let second = fx
            .run(&state, &mut session, now + Duration::from_millis(20))
            .unwrap();
        assert_eq!(frame_tag(&second), FRAME_DIFF);
        assert!(second.len() < first.len());

        let records = decoder.decode(&second).unwrap();
        assert_eq!(records.len(), 24);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(
                *record,
                ServerRecord::Var {
                    request_id: i as i32,
                    payload: view::i32(i32::from(state[i])),
                }
            );
        }
    }

    #[test]
    fn fully_changed_frame_stays_raw() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.indexed_session(now, 24);
        let mut decoder = ClientDecoder::new();

        let first = fx.run(&(0..24).collect(), &mut session, now).unwrap();
        decoder.decode(&first).unwrap();

        // Every value word differs, so the frame diff is no smaller than the frame.
        let state: Vec<u8> = (100..124).collect();
        let second = fx
            .run(&state, &mut session, now + Duration::from_millis(20))
            .unwrap();
        assert_eq!(second.len(), first.len());
        assert_eq!(frame_tag(&second), FRAME_RAW);

        let records = decoder.decode(&second).unwrap();
        assert_eq!(
            records[23],
            ServerRecord::Var {
                request_id: 23,
                payload: view::i32(123),
            }
        );
    }

    #[test]
    fn expired_poll_stops_updates() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 1);
        let later = now + Duration::from_secs(4);
        assert!(fx.run(&vec![1], &mut session, later).is_none());
    }

    #[test]
    fn small_payloads_are_always_full() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 0);
        let state = vec![9u8; 200];

        for step in 0..3u64 {
            let frame = fx
                .run(&state, &mut session, now + Duration::from_millis(20 * step))
                .unwrap();
            assert_eq!(record_tag(&frame), Encoding::Full.tag());
        }
    }

    #[test]
    fn large_equal_payload_is_diffed() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 0);
        let mut decoder = ClientDecoder::new();

        let mut state = vec![7u8; 1000];
        let first = fx.run(&state, &mut session, now).unwrap();
        assert_eq!(frame_tag(&first), FRAME_RAW);
        assert_eq!(record_tag(&first), Encoding::Full.tag());
        decoder.decode(&first).unwrap();

        state[500] = 1;
        let second = fx
            .run(&state, &mut session, now + Duration::from_millis(20))
            .unwrap();
        assert!(second.len() < 100);
        let records = decoder.decode(&second).unwrap();
        assert_eq!(
            records,
            vec![ServerRecord::Var {
                request_id: 3,
                payload: Bytes::from(state.clone()),
            }]
        );
    }

    #[test]
    fn length_change_forces_full_update() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 0);

        fx.run(&vec![1u8; 1000], &mut session, now).unwrap();
        let frame = fx
            .run(&vec![1u8; 1004], &mut session, now + Duration::from_millis(20))
            .unwrap();
        assert_eq!(frame_tag(&frame), FRAME_RAW);
        assert_eq!(record_tag(&frame), Encoding::Full.tag());
    }

    #[test]
    fn server_events_follow_records_and_drain() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 1);
        session.server_events.push(ServerEvent {
            event_id: 0,
            payload: Bytes::from_static(b"copy"),
        });

        let frame = fx.run(&vec![0; 3], &mut session, now).unwrap();
        let records = ClientDecoder::new().decode(&frame).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1],
            ServerRecord::Event {
                event_id: 0,
                payload: Bytes::from_static(b"copy"),
            }
        );
        assert!(session.server_events.is_empty());
    }

    #[test]
    fn reset_history_sends_full_frame_again() {
        let fx = Fixture::new();
        let now = Instant::now();
        let mut session = fx.session(now, 0);
        let state = vec![4u8; 600];

        fx.run(&state, &mut session, now).unwrap();
        session.reset_diff_history();
        let frame = fx
            .run(&state, &mut session, now + Duration::from_millis(20))
            .unwrap();
        assert_eq!(frame_tag(&frame), FRAME_RAW);
        assert_eq!(record_tag(&frame), Encoding::Full.tag());
    }
}
