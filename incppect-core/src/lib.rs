//! # incppect-core
//!
//! Remote state streaming over WebSocket.
//!
//! Browser clients subscribe to named, optionally indexed variables and
//! receive compact incremental updates of their bytes. This crate contains:
//! - **Codec**: RLE-XOR diff of a payload against its predecessor
//! - **Registry**: path templates (`"list[%d]"`) mapped to getter functions
//! - **Wire**: client message parsing and a client-side frame decoder
//! - **Session / Scheduler**: per-client requests, time gates, frame assembly
//! - **Server**: `Incppect`, the sans-io protocol core, and the `Service` hooks
//! - **Transport**: tokio listener serving WebSocket clients and static files
//! - **Error**: `IncppectError`, a `thiserror`-based error enum

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod transport;
pub mod wire;

// ── Re-exports ───────────────────────────────────────────────────

pub use codec::{DIFF_THRESHOLD, Encoding, decode_diff, encode_diff};
pub use config::Parameters;
pub use error::IncppectError;
pub use registry::{GetterCtx, GetterId, Registry, view};
pub use server::{ClientEvent, Incppect, MY_ID_PATH, Received, Service};
pub use session::{ClientId, ClientSession, Request, RequestId, ServerStats};
pub use transport::serve;
pub use wire::{ClientDecoder, ClientMessage, SERVER_EVENT_TAG, ServerRecord, Subscription};
