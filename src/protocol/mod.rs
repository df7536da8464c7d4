//! RESP Protocol Implementation
//!
//! This module covers both directions of the wire protocol.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` reply enum and serialization
//! - `command`: The parsed `Command`
//! - `parser`: Streaming parser for inline and multi-bulk requests
//!
//! ## Example
//!
//! ```
//! # tokio_test::block_on(async {
//! use respcache::protocol::{RespParser, RespValue};
//! use bytes::Bytes;
//!
//! // Parsing incoming data
//! let mut parser = RespParser::new(&b"GET name\r\n"[..]);
//! let command = parser.next_command().await.unwrap().unwrap();
//! assert_eq!(command.len(), 2);
//!
//! // Creating responses
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! # });
//! ```

pub mod command;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use command::Command;
pub use parser::{ParseCursor, ParseError, ParseResult, RespParser};
pub use types::RespValue;
