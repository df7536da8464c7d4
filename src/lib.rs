//! # respcache - A Minimal In-Memory RESP Cache
//!
//! respcache is a small key-value cache that speaks the Redis serialization
//! protocol (RESP). Clients can use `redis-cli` or send plain inline text.
//!
//! ## Features
//!
//! - **Two request forms**: RESP multi-bulk arrays and whitespace-separated inline lines
//! - **Conditional writes**: `SET` with `NX`/`XX`, applied atomically
//! - **Timed expiry**: `SET` with `EX`/`PX`, handled by one background scheduler
//! - **Fault isolation**: a panicking session closes only its own connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              respcache                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │              StorageEngine                   │   │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpiryScheduler                       │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respcache::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(&Config::default()).await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value [NX|XX] [EX seconds|PX milliseconds]`
//! - `DEL key [key ...]`
//! - `QUIT`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request parser and reply types
//! - [`storage`]: Sharded store, value encoding and the expiry scheduler
//! - [`commands`]: Command executor
//! - [`connection`]: Client sessions and their fault boundary
//! - [`server`]: Listener and shared state
//! - [`config`]: Command-line configuration
//!
//! ## Design Highlights
//!
//! ### Generational Expiry
//!
//! Every write is stamped with a generation number. An expiry record only
//! deletes the entry whose generation it carries, so a later SET or DEL makes
//! an earlier timer harmless without cancelling it.
//!
//! ### Streaming Parser
//!
//! Requests are parsed straight off a buffered reader. A command split
//! across several TCP segments is read the same as one that arrives whole.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, Invocation};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Command, ParseError, RespParser, RespValue};
pub use server::Server;
pub use storage::{ExpiryPolicy, ExpiryScheduler, StorageEngine};

/// The default port respcache listens on
pub const DEFAULT_PORT: u16 = 5000;

/// The default host respcache binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of respcache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
