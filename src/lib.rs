//! # PulseKV - An In-Memory Key-Value Server
//!
//! PulseKV speaks a subset of the Redis serialization protocol (RESP) over
//! TCP. A single reactor thread multiplexes every client connection over
//! non-blocking sockets, while values live in a sharded, thread-safe store
//! with per-key expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              PulseKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Reactor    │───>│ Connection  │───>│  Evaluator  │                  │
//! │  │ (mio Poll)  │    │  buffers    │    │             │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │                    Store                     │   │
//! │  │   Decoder   │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pulsekv::config::ServerConfig;
//! use pulsekv::connection::Server;
//! use pulsekv::storage::{start_expiry_sweeper, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let store = Arc::new(Store::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&store));
//!
//!     let server = Server::bind(ServerConfig::default(), store)?;
//!     tokio::task::spawn_blocking(move || server.run()).await?
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [EX seconds]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `EXISTS key [key ...]`
//! - `TTL key`
//!
//! Command names are case-insensitive.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP frames, the incremental decoder and the encoder
//! - [`storage`]: Sharded store with lazy and active expiry
//! - [`commands`]: The evaluator that runs commands and writes replies
//! - [`connection`]: The readiness reactor and per-connection buffers
//! - [`config`]: Server configuration
//!
//! ## Lazy + Active Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: a read of an expired key removes it and reports it missing
//! 2. **Active**: a background task sweeps a few shards per tick
//!
//! Memory is reclaimed even for keys that are never read again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::Evaluator;
pub use config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{ConnectionStats, Server, ShutdownHandle};
pub use protocol::{Command, Decoder, Frame, ParseError};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, Object, Store};

/// Version of PulseKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
