//! # TCP Rendezvous Relay
//!
//! Listens on two ports, pairs the next waiting connection on one port with
//! the next waiting connection on the other, and copies bytes unmodified in
//! both directions between the paired sockets.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │   Dual Listener Loop (select! over both listeners)      │
//! ├─────────────────────────────────────────────────────────┤
//! │   Rendezvous Coordinator (FIFO queue per side)          │
//! ├─────────────────────────────────────────────────────────┤
//! │   Pair Supervisor (two detached forwarding tasks)       │
//! ├─────────────────────────────────────────────────────────┤
//! │   Forwarder (chunked read → write_all, one direction)   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`client`] module runs the same forwarder between two dialed
//! endpoints instead of two accepted ones.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod forward;
pub mod logging;
pub mod metrics;
pub mod pair;
pub mod rendezvous;
pub mod server;
pub mod shutdown;

pub use error::{Error, Result};

/// Default read size of the forwarding loop.
pub use forward::CHUNK_SIZE;
