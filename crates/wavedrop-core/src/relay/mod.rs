//! The relay: HTTP signaling surface and the client that talks to it.
//!
//! The relay never sees file content. It brokers session records (offer,
//! answer, candidates, status) keyed by share token, pushes updates over
//! SSE, and expires records on a short clock.

pub mod protocol;

#[cfg(feature = "relay")]
mod server;
#[cfg(feature = "relay")]
pub use server::{router, serve, RelayState};

#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
pub use client::RelayClient;
