//! Shared RESP Reply Grammar
//!
//! Both transports decode replies with the same grammar. They differ only in
//! how bytes arrive: the [`SyncReader`](crate::protocol::SyncReader) pulls them
//! from a blocking stream, while the [`StreamFramer`](crate::protocol::StreamFramer)
//! is handed whatever the socket produced. This module holds the pieces they share:
//! header classification, decimal parsing and length validation.
//!
//! ## Grammar
//!
//! ```text
//! reply     = status | error | integer | bulk | aggregate
//! status    = "+" line
//! error     = "-" line
//! integer   = ":" decimal CRLF
//! bulk      = "$" ( "-1" CRLF | len CRLF <len bytes> CRLF )
//! aggregate = "*" ( "-1" CRLF | count CRLF count*reply )
//! ```
//!
//! The trailing CRLF of a bulk body is skipped, not validated.

use crate::protocol::types::prefix;
use thiserror::Error;

/// Errors that can occur while decoding replies.
///
/// Every variant is fatal for the connection it came from: the byte stream can
/// no longer be trusted to be aligned on reply boundaries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown reply type: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer or length line
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a status or error line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk length is negative (but not -1 for absent)
    #[error("invalid bulk length: {0}")]
    InvalidBulkLength(i64),

    /// Aggregate count is negative (but not -1 for absent)
    #[error("invalid aggregate length: {0}")]
    InvalidAggregateLength(i64),

    /// Aggregates nested deeper than [`MAX_NESTING_DEPTH`]
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// Protocol violation
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The bulk body exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a header line, prefix and CRLF excluded
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Maximum aggregate nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// The first line of a reply, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Status(String),
    Error(String),
    Integer(i64),
    /// `None` is the absent bulk.
    Bulk(Option<usize>),
    /// `None` is the absent aggregate.
    Aggregate(Option<usize>),
}

/// Rejects any leading byte that does not start one of the five reply shapes.
#[inline]
pub fn check_prefix(byte: u8) -> ParseResult<u8> {
    match byte {
        prefix::STATUS | prefix::ERROR | prefix::INTEGER | prefix::BULK | prefix::AGGREGATE => {
            Ok(byte)
        }
        other => Err(ParseError::UnknownPrefix(other)),
    }
}

/// Attempts to read one header from the front of `buf`.
///
/// # Returns
///
/// - `Ok(Some((header, consumed)))` - a complete header line was present
/// - `Ok(None)` - the line is not complete yet
/// - `Err(e)` - the prefix or the line is malformed, or the line runs past
///   [`MAX_LINE_SIZE`] without a CRLF
pub fn parse_header(buf: &[u8]) -> ParseResult<Option<(Header, usize)>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let kind = check_prefix(first)?;

    let line = &buf[1..];
    let window = &line[..line.len().min(MAX_LINE_SIZE + 2)];
    match find_crlf(window) {
        Some(pos) => {
            let header = header_from_line(kind, &line[..pos])?;
            // +1 for prefix, +2 for CRLF
            Ok(Some((header, 1 + pos + 2)))
        }
        None => {
            check_line_len(line.len())?;
            Ok(None)
        }
    }
}

/// Fails once `len` bytes of a header line have been seen without a CRLF.
///
/// A trailing `\r` may be the first half of the terminator.
pub fn check_line_len(len: usize) -> ParseResult<()> {
    if len > MAX_LINE_SIZE + 1 {
        return Err(ParseError::MessageTooLarge {
            size: len,
            max: MAX_LINE_SIZE,
        });
    }
    Ok(())
}

/// Classifies a header line whose prefix byte has already been read.
pub fn header_from_line(kind: u8, line: &[u8]) -> ParseResult<Header> {
    match check_prefix(kind)? {
        prefix::STATUS => Ok(Header::Status(utf8_line(line)?)),
        prefix::ERROR => Ok(Header::Error(utf8_line(line)?)),
        prefix::INTEGER => Ok(Header::Integer(parse_decimal(line)?)),
        prefix::BULK => Ok(Header::Bulk(bulk_length(parse_decimal(line)?)?)),
        _ => Ok(Header::Aggregate(aggregate_length(parse_decimal(line)?)?)),
    }
}

/// Parses a signed ASCII decimal.
pub fn parse_decimal(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidInteger(e.to_string()))?;
    s.parse::<i64>()
        .map_err(|e| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))
}

fn bulk_length(length: i64) -> ParseResult<Option<usize>> {
    if length == -1 {
        return Ok(None);
    }
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
    Ok(Some(length))
}

fn aggregate_length(count: i64) -> ParseResult<Option<usize>> {
    if count == -1 {
        return Ok(None);
    }
    if count < 0 {
        return Err(ParseError::InvalidAggregateLength(count));
    }
    Ok(Some(count as usize))
}

fn utf8_line(line: &[u8]) -> ParseResult<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
/// A lone `\r` is ordinary line content.
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
