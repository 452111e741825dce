//! Tokio transport: one listener serving both the WebSocket endpoint and the
//! static browser client.
//!
//! Every accepted socket gets its own task (see [`connection`]). Connection
//! tasks talk to the single server loop through an mpsc channel, so the
//! [`Incppect`] core and the [`Service`] are only ever touched by the loop.
//! Each client's outbound queue is bounded by
//! [`Parameters::send_queue_frames`](crate::Parameters); a full queue is
//! backpressure.

pub mod connection;
pub mod http;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::IncppectError;
use crate::server::{Incppect, Service};
use crate::session::ClientId;

/// Connection task → server loop.
#[derive(Debug)]
pub enum ConnEvent {
    /// A WebSocket handshake completed; the loop replies with the client id.
    Opened {
        ip: [u8; 4],
        outbound: mpsc::Sender<Bytes>,
        reply: oneshot::Sender<ClientId>,
    },
    Message {
        id: ClientId,
        data: Vec<u8>,
    },
    Closed {
        id: ClientId,
    },
}

/// Serve on an already bound listener until `cancel` fires.
pub async fn serve<S: Service>(
    listener: TcpListener,
    mut incppect: Incppect<S>,
    mut service: S,
    cancel: CancellationToken,
) -> Result<(), IncppectError> {
    let params = Arc::new(incppect.params().clone());
    let (events_tx, mut events_rx) = mpsc::channel::<ConnEvent>(256);
    let mut outbound: HashMap<ClientId, mpsc::Sender<Bytes>> = HashMap::new();

    let mut tick = tokio::time::interval(params.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("accepted connection from {addr}");
                    tokio::spawn(connection::handle(
                        stream,
                        addr,
                        Arc::clone(&params),
                        events_tx.clone(),
                        cancel.child_token(),
                    ));
                }
                Err(e) => warn!("accept failed: {e}"),
            },

            Some(event) = events_rx.recv() => match event {
                ConnEvent::Opened { ip, outbound: tx, reply } => {
                    let id = incppect.open(&mut service, ip, Instant::now());
                    outbound.insert(id, tx);
                    if reply.send(id).is_err() {
                        outbound.remove(&id);
                        incppect.close(&mut service, id);
                    }
                }
                ConnEvent::Message { id, data } => {
                    let now = Instant::now();
                    if incppect.dispatch(&mut service, id, &data, now) {
                        let frames = incppect.tick(&mut service, now);
                        flush(&mut incppect, &outbound, frames);
                    }
                }
                ConnEvent::Closed { id } => {
                    outbound.remove(&id);
                    incppect.close(&mut service, id);
                }
            },

            _ = tick.tick() => {
                let frames = incppect.tick(&mut service, Instant::now());
                flush(&mut incppect, &outbound, frames);
            }
        }
    }

    info!("server loop stopped with {} client(s) connected", incppect.num_connected());
    Ok(())
}

/// Hand frames to the connection writers; a full queue drops the frame.
fn flush<S: Service>(
    incppect: &mut Incppect<S>,
    outbound: &HashMap<ClientId, mpsc::Sender<Bytes>>,
    frames: Vec<(ClientId, Bytes)>,
) {
    for (id, frame) in frames {
        let Some(tx) = outbound.get(&id) else {
            continue;
        };
        let len = frame.len();
        match tx.try_send(frame) {
            Ok(()) => incppect.mark_sent(len),
            Err(mpsc::error::TrySendError::Full(_)) => incppect.mark_backpressure(id),
            Err(mpsc::error::TrySendError::Closed(_)) => debug!("client {id} writer already closed"),
        }
    }
}
