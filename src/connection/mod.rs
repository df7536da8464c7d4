//! Connection Handler Module
//!
//! This module manages individual client sessions. Each accepted connection
//! gets its own task, and a panic in one session never reaches the listener
//! or any other session.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task (fault boundary)
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use respcache::commands::CommandHandler;
//! use respcache::connection::{handle_connection, ConnectionStats};
//! use respcache::storage::{ExpiryPolicy, ExpiryScheduler, StorageEngine};
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let scheduler = ExpiryScheduler::start(Arc::clone(&storage), ExpiryPolicy::default());
//! let stats = Arc::new(ConnectionStats::new());
//! let handler = CommandHandler::new(storage, scheduler.handle());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler, stats));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{
    handle_connection, isolate_session, ConnectionError, ConnectionHandler, ConnectionStats,
    SessionOutcome,
};
