//! RESP Reply Types
//!
//! This module defines the reply side of the RESP protocol as seen by a client.
//! The wire is not uniformly typed, so a reply is a tagged union over five
//! shapes.
//!
//! ## Protocol Format
//!
//! Each reply starts with a type prefix byte:
//! - `+` Status
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk
//! - `*` Aggregate
//!
//! All header lines are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk: `$5\r\nhello\r\n`
//! Absent bulk: `$-1\r\n`
//! Aggregate: `*2\r\n:1\r\n:2\r\n`
//! Absent aggregate: `*-1\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const AGGREGATE: u8 = b'*';
}

/// A decoded server reply.
///
/// `Bulk(None)` and `Aggregate(None)` are the protocol's "absent" values
/// (`$-1` and `*-1`). They are distinct from an empty string and an empty
/// aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Single-line status, e.g. `+OK`.
    Status(String),

    /// Single-line server error. Callers must treat it as a failure.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Length-prefixed, binary-safe byte string, or absent.
    Bulk(Option<Bytes>),

    /// Ordered sequence of replies (possibly nested), or absent.
    Aggregate(Option<Vec<Reply>>),
}

impl Reply {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use shardis::protocol::types::Reply;
    /// let ok = Reply::status("OK");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Creates a present bulk reply.
    ///
    /// # Example
    /// ```
    /// use shardis::protocol::types::Reply;
    /// use bytes::Bytes;
    /// let bulk = Reply::bulk(Bytes::from("hello"));
    /// ```
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// The absent bulk reply (`$-1`).
    pub fn nil() -> Self {
        Reply::Bulk(None)
    }

    /// Creates a present aggregate reply.
    pub fn aggregate(items: Vec<Reply>) -> Self {
        Reply::Aggregate(Some(items))
    }

    /// The absent aggregate reply (`*-1`).
    pub fn nil_aggregate() -> Self {
        Reply::Aggregate(None)
    }

    /// Serializes the reply to its wire form.
    ///
    /// Clients never send replies; this exists for peers and test fixtures.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::STATUS);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(Some(data)) => {
                buf.push(prefix::BULK);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(None) => {
                buf.push(prefix::BULK);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Aggregate(Some(items)) => {
                buf.push(prefix::AGGREGATE);
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for item in items {
                    item.serialize_into(buf);
                }
            }
            Reply::Aggregate(None) => {
                buf.push(prefix::AGGREGATE);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
        }
    }

    /// Returns true for `$-1` and `*-1`.
    pub fn is_absent(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Aggregate(None))
    }

    /// Returns true if this reply is a server error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Turns an `Error` reply into `Err(message)` and passes everything else through.
    pub fn into_result(self) -> Result<Reply, String> {
        match self {
            Reply::Error(msg) => Err(msg),
            other => Ok(other),
        }
    }

    /// Attempts to extract text from a Status or a UTF-8 Bulk.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) => Some(s),
            Reply::Bulk(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the bytes of a present Bulk.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to borrow the elements of a present Aggregate.
    pub fn as_aggregate(&self) -> Option<&[Reply]> {
        match self {
            Reply::Aggregate(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// Consumes self and returns the elements of a present Aggregate.
    pub fn into_aggregate(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Aggregate(Some(items)) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(Some(data)) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Reply::Bulk(None) | Reply::Aggregate(None) => write!(f, "(nil)"),
            Reply::Aggregate(Some(items)) => {
                if items.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}) {}", i + 1, item)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
