//! Streaming Request Parser
//!
//! This module turns the byte stream of one session into [`Command`]s.
//! Unlike a buffer-and-retry parser, it pulls bytes from an async reader and
//! suspends until a whole request has arrived.
//!
//! ## Wire Encodings
//!
//! The first byte of a request selects its encoding:
//!
//! - `*` starts a multi-bulk array: `*<N>\r\n` followed by N elements, each
//!   tagged `:` (literal line), `$` (length-prefixed payload) or `*` (nested
//!   array, flattened into the parent). Elements with any other tag produce
//!   no argument; only the tag byte is consumed.
//! - anything else starts an inline command: the rest of the line is split on
//!   spaces, and `"..."` groups a token in which `\"` stands for a quote.
//!
//! ## Line Framing
//!
//! A line is everything up to a carriage return. The byte after the CR is
//! consumed as the line feed without looking at it.

use crate::protocol::command::Command;
use crate::protocol::types::{prefix, CRLF};
use bytes::Bytes;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

/// Errors that can occur while reading a request.
///
/// Every variant ends the session that produced it.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The underlying stream failed or ended in the middle of a request
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A length or count line is not an integer
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Bulk string length is negative
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// An inline quoted token is not terminated before the end of the line
    #[error("missing closing quotes")]
    MissingClosingQuote,

    /// Protocol violation (missing CRLF, nesting too deep)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A line or payload exceeds the allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a single line (inline command or header)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Reads [`Command`]s from an async byte stream.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use respcache::protocol::RespParser;
///
/// let mut parser = RespParser::new(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
/// let command = parser.next_command().await.unwrap().unwrap();
/// assert_eq!(command.dispatch_key(), "GET");
/// assert!(parser.next_command().await.unwrap().is_none());
/// # });
/// ```
#[derive(Debug)]
pub struct RespParser<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> RespParser<R> {
    /// Creates a parser reading from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Reads the next command from the stream.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(command))` - A complete request was read
    /// - `Ok(None)` - The stream ended cleanly between requests
    /// - `Err(e)` - The stream failed or the request was malformed
    ///
    /// Requests without any argument (blank inline lines, `*0`) are skipped.
    pub async fn next_command(&mut self) -> ParseResult<Option<Command>> {
        loop {
            if self.reader.fill_buf().await?.is_empty() {
                return Ok(None);
            }

            let first = self.reader.read_u8().await?;
            let args = if first == prefix::ARRAY {
                self.parse_array().await?
            } else {
                self.parse_inline(first).await?
            };

            match Command::from_args(args) {
                Some(command) => return Ok(Some(command)),
                None => trace!("Skipping empty request"),
            }
        }
    }

    /// Reads one line, without its CR, and consumes the byte after the CR.
    async fn read_line(&mut self) -> ParseResult<Vec<u8>> {
        let mut line = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE_LENGTH as u64 + 1);
        limited.read_until(b'\r', &mut line).await?;

        if line.last() != Some(&b'\r') {
            if line.len() > MAX_LINE_LENGTH {
                return Err(ParseError::MessageTooLarge {
                    size: line.len(),
                    max: MAX_LINE_LENGTH,
                });
            }
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        line.pop();

        // Assumed to be '\n'.
        self.reader.read_u8().await?;
        Ok(line)
    }

    /// Parses an inline command whose first byte has already been read.
    async fn parse_inline(&mut self, first: u8) -> ParseResult<Vec<Bytes>> {
        if first == b'\r' {
            self.reader.read_u8().await?;
            return Ok(Vec::new());
        }

        let rest = self.read_line().await?;
        let mut line = Vec::with_capacity(rest.len() + 1);
        line.push(first);
        line.extend_from_slice(&rest);

        ParseCursor::new(&line).tokens()
    }

    /// Parses a multi-bulk array whose `*` has already been read.
    ///
    /// Nested arrays are tracked with a stack of remaining element counts,
    /// so their elements land directly in the flat argument list.
    async fn parse_array(&mut self) -> ParseResult<Vec<Bytes>> {
        let mut args = Vec::new();
        let mut pending = vec![self.read_count().await?];

        while let Some(remaining) = pending.last_mut() {
            if *remaining == 0 {
                pending.pop();
                continue;
            }
            *remaining -= 1;

            match self.reader.read_u8().await? {
                prefix::INTEGER => args.push(Bytes::from(self.read_line().await?)),
                prefix::BULK_STRING => args.push(self.read_bulk().await?),
                prefix::ARRAY => {
                    if pending.len() >= MAX_NESTING_DEPTH {
                        return Err(ParseError::ProtocolError(format!(
                            "maximum nesting depth exceeded: {}",
                            MAX_NESTING_DEPTH
                        )));
                    }
                    let count = self.read_count().await?;
                    pending.push(count);
                }
                tag => trace!(tag = tag, "Skipping element with unknown type tag"),
            }
        }

        Ok(args)
    }

    /// Reads an array count line. `-1` (null array) counts as empty.
    async fn read_count(&mut self) -> ParseResult<usize> {
        let count = parse_integer(&self.read_line().await?)?;
        match count {
            -1 => Ok(0),
            n if n < 0 => Err(ParseError::InvalidArrayLength(n)),
            n => Ok(n as usize),
        }
    }

    /// Reads a bulk payload: a length line, exactly that many bytes, then CRLF.
    async fn read_bulk(&mut self) -> ParseResult<Bytes> {
        let length = parse_integer(&self.read_line().await?)?;
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let mut payload = Vec::with_capacity(length.min(MAX_LINE_LENGTH));
        (&mut self.reader)
            .take(length as u64)
            .read_to_end(&mut payload)
            .await?;
        if payload.len() < length {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let mut trailer = [0u8; 2];
        self.reader.read_exact(&mut trailer).await?;
        if trailer[..] != *CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        Ok(Bytes::from(payload))
    }
}

fn parse_integer(line: &[u8]) -> ParseResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::InvalidInteger(String::from_utf8_lossy(line).into_owned()))
}

/// Scan state over a single inline command line.
#[derive(Debug)]
pub struct ParseCursor<'a> {
    line: &'a [u8],
    pos: usize,
}

impl<'a> ParseCursor<'a> {
    pub fn new(line: &'a [u8]) -> Self {
        Self { line, pos: 0 }
    }

    #[inline]
    fn current(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    /// Splits the line into tokens.
    ///
    /// Runs of spaces separate tokens and never produce empty ones. A quoted
    /// token may be empty (`""`).
    pub fn tokens(mut self) -> ParseResult<Vec<Bytes>> {
        let mut tokens = Vec::new();

        loop {
            while self.current() == Some(b' ') {
                self.pos += 1;
            }

            match self.current() {
                None => break,
                Some(b'"') => {
                    self.pos += 1;
                    tokens.push(self.quoted()?);
                }
                Some(_) => tokens.push(self.bare()),
            }
        }

        Ok(tokens)
    }

    /// Consumes a quoted token. The opening quote is already consumed.
    fn quoted(&mut self) -> ParseResult<Bytes> {
        let mut token = Vec::new();

        loop {
            match self.current() {
                None => return Err(ParseError::MissingClosingQuote),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(Bytes::from(token));
                }
                Some(b'\\') if self.line.get(self.pos + 1) == Some(&b'"') => {
                    token.push(b'"');
                    self.pos += 2;
                }
                Some(byte) => {
                    token.push(byte);
                    self.pos += 1;
                }
            }
        }
    }

    /// Consumes a bare token up to the next space or the end of the line.
    fn bare(&mut self) -> Bytes {
        let start = self.pos;
        while matches!(self.current(), Some(byte) if byte != b' ') {
            self.pos += 1;
        }
        Bytes::copy_from_slice(&self.line[start..self.pos])
    }
}
