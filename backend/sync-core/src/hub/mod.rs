//! WebSocket hub that mirrors a [`SharedState`](crate::state::SharedState) to dashboard clients.
//!
//! # Protocol
//!
//! One WebSocket message is one complete JSON document.
//!
//! - Server → Client: the full state, once on connect and again after every commit
//! - Client → Server: a full replacement state, accepted once per connection
//!
//! # Session lifecycle
//!
//! Each connection runs a send task (pushes snapshots on change) and a receive
//! loop (waits for the one replacement). The session moves
//! `Listening → Applied → Closed` on a committed update, or straight
//! `Listening → Closed` on disconnect or error. The send task is stopped before
//! the socket is closed and before anything is committed, so a session never
//! outlives its connection and never echoes its own update.

mod config;
mod handle;
mod server;
mod session;

pub use config::HubConfig;
pub use handle::SyncHubHandle;
pub use server::start_sync_hub;
pub use session::{SessionEnd, SessionPhase};

#[cfg(test)]
pub(crate) use session::Session;
