//! Connection Module
//!
//! Serves every client from one thread. Sockets are non-blocking, and a
//! readiness poller reports which of them can make progress.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Server (reactor)                        │
//! │                                                             │
//! │   Poller::wait ──> [listener | waker | client tokens]       │
//! └──────┬───────────────────┬───────────────────┬──────────────┘
//!        │ accept            │ shutdown          │ readable / writable
//!        ▼                   ▼                   ▼
//!  register socket      leave the loop   ┌─────────────────────────┐
//!  (or close it when                     │ Connection              │
//!   over the limit)                      │  inbound ─> Decoder     │
//!                                        │          ─> Evaluator   │
//!                                        │          ─> outbound    │
//!                                        └─────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Readiness-driven I/O**: mio over epoll/kqueue, no thread per client
//! - **Pipelining**: every complete command in a read is answered, in order
//! - **Backpressure**: reads pause while a client leaves replies unread
//! - **Fairness**: a read budget per event keeps one large request from
//!   starving other clients
//! - **Statistics**: connection, command and byte counters

pub mod handler;
pub mod poller;
pub mod server;

pub use handler::{Connection, ConnectionError, ConnectionStats, Progress};
pub use poller::{Poller, Readiness};
pub use server::{Server, ShutdownHandle};
