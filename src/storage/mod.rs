//! Storage Engine Module
//!
//! This module provides the key space shared by all sessions and the
//! scheduler that expires keys set with a TTL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ delete_if_generation / delete
//!              ┌─────────────┴─────────────┐
//!              │     ExpiryScheduler       │
//!              │  (deadline-ordered heap)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **Per-key Atomicity**: store, load, delete and load-and-delete are each atomic
//! - **Scheduled Expiry**: deletions fire from a single background task
//! - **Value Encoding**: quoted literals are recognised when written

pub mod engine;
pub mod expiry;
pub mod value;

// Re-export commonly used types
pub use engine::{Entry, SetCondition, StorageEngine, StorageStats};
pub use expiry::{ExpiryHandle, ExpiryPolicy, ExpiryScheduler};
pub use value::{StoredValue, ValueEncoding};
