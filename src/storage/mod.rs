//! Key-Value Store Module
//!
//! A thread-safe, sharded in-memory map with per-object expiry, plus the
//! background sweeper that reclaims expired objects nobody reads again.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │  one shard at a time
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use pulsekv::storage::Store;
//! use bytes::Bytes;
//!
//! let store = Store::new();
//! store.put(Bytes::from("session"), store.new_object(Bytes::from("token123"), 3_600_000));
//! assert!(store.exists(&Bytes::from("session")));
//! assert!(store.delete(&Bytes::from("session")));
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Object, ShardCleanup, Store};
pub use expiry::{start_expiry_sweeper, sweep_slice, ExpiryConfig, ExpirySweeper, SweepReport};
