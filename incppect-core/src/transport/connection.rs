//! Per-socket task.
//!
//! The first bytes of the request decide what the socket is: a WebSocket
//! upgrade becomes a client session, anything else is answered from the
//! static file mount and closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ConnEvent;
use super::http;
use crate::config::Parameters;
use crate::error::IncppectError;
use crate::session::ipv4_bytes;

/// Time allowed for a peer to send its request head.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Entry point spawned for every accepted socket.
pub async fn handle(
    stream: TcpStream,
    addr: SocketAddr,
    params: Arc<Parameters>,
    events: mpsc::Sender<ConnEvent>,
    cancel: CancellationToken,
) {
    let head = match tokio::time::timeout(HANDSHAKE_TIMEOUT, http::peek_head(&stream)).await {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => {
            debug!("{addr}: closed before sending a request");
            return;
        }
        Ok(Err(e)) => {
            debug!("{addr}: {e}");
            return;
        }
        Err(_) => {
            debug!("{addr}: no request within {HANDSHAKE_TIMEOUT:?}");
            return;
        }
    };

    let result = if head.is_websocket_upgrade() {
        websocket(stream, addr, &params, events, cancel).await
    } else {
        http::serve_static(stream, &head, &params).await
    };

    if let Err(e) = result {
        debug!("{addr}: connection ended with error: {e}");
    }
}

fn ws_config(params: &Parameters) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(params.max_message_bytes);
    config.max_frame_size = Some(params.max_message_bytes);
    config
}

async fn websocket(
    stream: TcpStream,
    addr: SocketAddr,
    params: &Parameters,
    events: mpsc::Sender<ConnEvent>,
    cancel: CancellationToken,
) -> Result<(), IncppectError> {
    let ws = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config(params))).await?;
    let (mut sink, mut source) = ws.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(params.send_queue_frames.max(1));
    let (reply_tx, reply_rx) = oneshot::channel();
    events
        .send(ConnEvent::Opened {
            ip: ipv4_bytes(addr.ip()),
            outbound: out_tx,
            reply: reply_tx,
        })
        .await?;
    let id = reply_rx.await.map_err(|_| IncppectError::ChannelClosed)?;

    // Writer task: server loop -> socket. Ends when the loop drops the sender.
    tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = sink.send(Message::Binary(frame.to_vec())).await {
                debug!("client {id}: write error: {e}");
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: socket -> server loop.
    let idle = params.idle_timeout();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = next_message(&mut source, idle) => next,
        };

        let message = match next {
            Err(_) => {
                info!("client {id} idle for {idle:?}, closing");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!("client {id}: read error: {e}");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let data = match message {
            Message::Binary(data) => data,
            Message::Text(text) => text.into_bytes(),
            Message::Close(_) => break,
            _ => continue,
        };
        if events.send(ConnEvent::Message { id, data }).await.is_err() {
            break;
        }
    }

    let _ = events.send(ConnEvent::Closed { id }).await;
    Ok(())
}

/// Next message, or `Err(Elapsed)` once the idle timeout passes.
async fn next_message<St>(
    source: &mut St,
    idle: Option<Duration>,
) -> Result<Option<St::Item>, tokio::time::error::Elapsed>
where
    St: futures::Stream + Unpin,
{
    match idle {
        Some(limit) => tokio::time::timeout(limit, source.next()).await,
        None => Ok(source.next().await),
    }
}
