//! Stratum v1 mining protocol client.
//!
//! The protocol is JSON-RPC over TCP (optionally TLS) with one message per
//! line. A probe needs only part of it:
//!
//! - **Client requests**: `mining.subscribe`, `mining.authorize`
//! - **Server notifications**: `mining.notify`, `mining.set_difficulty`,
//!   `mining.set_extranonce`
//!
//! # Architecture
//!
//! [`StratumClient`] owns one connection. Requests are correlated with
//! replies by id through a table of pending calls, so several calls may be in
//! flight at once. A reader task dispatches notifications to a
//! [`ClientHandler`] given to the client at construction.
//!
//! ```rust,ignore
//! let client = StratumClient::new(ClientConfig::new(endpoint), handler);
//! client.connect().await?;
//! client.subscribe("cgminer/4.10.0").await?;
//! client.authorize("bc1q....rig-7", "x").await?;
//! // handler.on_notify() fires from the reader task
//! client.close().await;
//! ```

mod client;
mod connection;
mod error;
mod messages;

#[cfg(test)]
pub(crate) mod mock_pool;

pub use client::{ClientConfig, ClientHandler, SessionState, StratumClient};
pub use connection::Endpoint;
pub use error::{StratumError, StratumResult};
pub use messages::{JobNotification, MAX_EXTRANONCE2_SIZE};
