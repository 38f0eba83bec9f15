//! # Wavedrop Core Library
//!
//! `wavedrop-core` provides the core functionality for Wavedrop, a
//! relay-signaled peer-to-peer file transfer tool: a lightweight relay
//! brokers the connection setup, and the file itself travels directly
//! between the two peers over a data channel.
//!
//! ## Features
//!
//! - **Token-based discovery**: Memorable two-word share tokens
//! - **Direct transfers**: File bytes never touch the relay
//! - **Flow control**: Chunked sends gated on the channel's send queue
//! - **Cancellation**: Either side can abort; the other notices promptly
//!
//! ## Modules
//!
//! - [`codec`] - Frame encoding for control messages and chunks
//! - [`config`] - Configuration management
//! - [`error`] - The crate-wide error type
//! - [`progress`] - Progress tracking and human-readable formatting
//! - [`relay`] - Relay HTTP surface and client
//! - [`session`] - Relay-side session records and coordination
//! - [`signaling`] - Connection-establishment state machine
//! - [`token`] - Share token generation and validation
//! - [`transfer`] - The chunked transfer engine
//! - [`transport`] - Peer transport abstraction and backends
//!
//! ## Example
//!
//! ```rust,ignore
//! use wavedrop_core::relay::RelayClient;
//! use wavedrop_core::session::Role;
//!
//! let relay = RelayClient::new("http://127.0.0.1:7440");
//! let response = relay.validate("mapleforest").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unused_async)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::unused_self)]
#![allow(clippy::missing_errors_doc)]

pub mod codec;
pub mod config;
pub mod error;
pub mod progress;
pub mod session;
pub mod signaling;
pub mod token;
pub mod transfer;
pub mod transport;

#[cfg(any(feature = "relay", feature = "client"))]
pub mod relay;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bytes per binary chunk on the data channel (32 KiB)
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Queued-bytes threshold above which the sender pauses (1 MiB)
pub const BUFFER_THRESHOLD: u64 = 1024 * 1024;

/// How often the backpressure gate re-checks the send queue, in
/// milliseconds
pub const BACKPRESSURE_POLL_MS: u64 = 10;

/// How long a share token stays valid, in seconds (10 minutes)
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 600;

/// How long the receiver waits for the completion signal, in seconds
pub const COMPLETION_TIMEOUT_SECS: u64 = 600;

/// Delay between a cancel notification and local teardown, in
/// milliseconds
pub const CANCEL_GRACE_MS: u64 = 200;

/// How many token collisions to tolerate before giving up
pub const TOKEN_GENERATION_ATTEMPTS: u32 = 5;

/// Largest file the sender will offer by default (10 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Default relay port
pub const DEFAULT_RELAY_PORT: u16 = 7440;
