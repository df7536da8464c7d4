//! Command Handler Module
//!
//! This module executes parsed [`Command`]s against the storage engine and
//! produces the reply for each one, plus whether the session should go on.
//!
//! ## Supported Commands
//!
//! - `GET key` - Get a key's value
//! - `SET key value [NX|XX] [EX seconds|PX milliseconds]` - Set a key
//! - `DEL key [key ...]` - Delete keys
//! - `QUIT` - Close the connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  dispatch   │───>│  validate   │───>│   execute   │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                          │         │        │
//! │                                          ▼         ▼        │
//! │                              StorageEngine   ExpiryHandle   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{Command, RespValue};
use crate::storage::{ExpiryHandle, SetCondition, StorageEngine, StoredValue};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Command-level failures. Each one is reported to the client as `-ERR <message>`
/// and the session continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("expiration option is not valid")]
    InvalidExpireOption,

    #[error("syntax error")]
    Syntax,

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("invalid expire time in '{0}' command")]
    InvalidExpireTime(String),
}

impl From<CommandError> for RespValue {
    fn from(e: CommandError) -> Self {
        RespValue::error(format!("ERR {}", e))
    }
}

type CommandResult = Result<RespValue, CommandError>;

/// The outcome of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Reply to send to the client
    pub response: RespValue,
    /// False when the session must end after the reply
    pub keep_alive: bool,
}

impl Execution {
    fn reply(response: RespValue) -> Self {
        Self {
            response,
            keep_alive: true,
        }
    }

    fn close(response: RespValue) -> Self {
        Self {
            response,
            keep_alive: false,
        }
    }
}

/// Executes commands against the shared store.
///
/// Cheap to clone; every session gets its own copy.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    expiry: ExpiryHandle,
}

impl CommandHandler {
    /// Creates a new command handler.
    ///
    /// # Arguments
    ///
    /// * `storage` - The shared storage engine
    /// * `expiry` - Where `SET ... EX/PX` schedules its deletions
    pub fn new(storage: Arc<StorageEngine>, expiry: ExpiryHandle) -> Self {
        Self { storage, expiry }
    }

    /// Executes a command and returns the reply and the continue signal.
    pub fn execute(&self, command: &Command) -> Execution {
        let name = command.name_lossy();
        let args = command.args();
        let dispatch_key = command.dispatch_key();

        trace!(command = %dispatch_key, args = command.len(), "Executing command");

        let result = match dispatch_key.as_str() {
            "GET" => self.cmd_get(&name, args),
            "SET" => self.cmd_set(&name, args),
            "DEL" => self.cmd_del(&name, args),
            "QUIT" => {
                if args.len() != 1 {
                    return Execution::reply(CommandError::WrongArity(name).into());
                }
                return Execution::close(RespValue::ok());
            }
            _ => Err(CommandError::UnknownCommand(name)),
        };

        Execution::reply(result.unwrap_or_else(RespValue::from))
    }

    /// GET key
    fn cmd_get(&self, name: &str, args: &[Bytes]) -> CommandResult {
        if args.len() != 2 {
            return Err(CommandError::WrongArity(name.to_string()));
        }

        Ok(match self.storage.load(&args[1]) {
            Some(value) => RespValue::bulk_string(value.decoded()),
            None => RespValue::null(),
        })
    }

    /// SET key value [NX|XX] [EX seconds|PX milliseconds]
    fn cmd_set(&self, name: &str, args: &[Bytes]) -> CommandResult {
        if !(3..=6).contains(&args.len()) {
            return Err(CommandError::WrongArity(name.to_string()));
        }

        let mut pos = 3;
        let condition = match args.get(pos) {
            Some(opt) if opt.eq_ignore_ascii_case(b"NX") => SetCondition::IfAbsent,
            Some(opt) if opt.eq_ignore_ascii_case(b"XX") => SetCondition::IfPresent,
            _ => SetCondition::Always,
        };
        if condition != SetCondition::Always {
            pos += 1;
        }

        let key = args[1].clone();

        // NX/XX is decided before the expiry option is looked at.
        let precondition_holds = match condition {
            SetCondition::Always => true,
            SetCondition::IfAbsent => !self.storage.contains(&key),
            SetCondition::IfPresent => self.storage.contains(&key),
        };
        if !precondition_holds {
            return Ok(RespValue::null());
        }

        // Anything after a complete EX/PX pair is ignored.
        let ttl = match args.get(pos) {
            Some(option) => Some(parse_expiry(name, option, args.get(pos + 1))?),
            None => None,
        };

        let value = StoredValue::new(args[2].clone());

        let Some(generation) = self.storage.store_if(key.clone(), value, condition) else {
            return Ok(RespValue::null());
        };

        if let Some(ttl) = ttl {
            self.expiry.schedule(key, generation, ttl);
        }

        Ok(RespValue::ok())
    }

    /// DEL key [key ...]
    fn cmd_del(&self, name: &str, args: &[Bytes]) -> CommandResult {
        if args.len() < 2 {
            return Err(CommandError::WrongArity(name.to_string()));
        }

        let deleted = args[1..]
            .iter()
            .filter(|key| self.storage.load_and_delete(key).is_some())
            .count();

        Ok(RespValue::integer(deleted as i64))
    }
}

/// Parses `EX <seconds>` or `PX <milliseconds>` into a duration.
fn parse_expiry(name: &str, option: &[u8], amount: Option<&Bytes>) -> Result<Duration, CommandError> {
    let millis_per_unit: u64 = if option.eq_ignore_ascii_case(b"EX") {
        1000
    } else if option.eq_ignore_ascii_case(b"PX") {
        1
    } else {
        return Err(CommandError::InvalidExpireOption);
    };

    let amount = amount.ok_or(CommandError::Syntax)?;
    let amount: i64 = std::str::from_utf8(amount)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)?;

    if amount <= 0 {
        return Err(CommandError::InvalidExpireTime(name.to_string()));
    }

    (amount as u64)
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| CommandError::InvalidExpireTime(name.to_string()))
}
