//! Command Handler Module
//!
//! This module implements the command processing layer. It receives parsed
//! commands, executes them against the storage engine and returns the reply
//! for the session to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │ StorageEngine   │      │ ExpiryScheduler │
//! └─────────────────┘      └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value [NX|XX] [EX seconds|PX milliseconds]`
//! - `DEL key [key ...]`
//! - `QUIT`
//!
//! Command names are case-insensitive.

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandError, CommandHandler, Execution};
