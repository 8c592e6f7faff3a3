//! Blocking Reply Reader
//!
//! The synchronous transport reads one reply at a time, pulling exactly the
//! bytes the grammar asks for from a buffered, blocking stream. Because
//! replies come back in the order commands were sent, calling
//! [`SyncReader::read_reply`] once per outstanding command is all a pipelined
//! caller needs.

use crate::protocol::parser::{
    check_line_len, check_prefix, header_from_line, Header, ParseError, MAX_LINE_SIZE,
    MAX_NESTING_DEPTH,
};
use crate::protocol::types::Reply;
use bytes::Bytes;
use std::io::{self, BufRead, Read};
use thiserror::Error;

/// Errors produced while reading a reply from a blocking stream.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The underlying stream failed (including read timeouts)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bytes did not follow the reply grammar
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The peer closed the stream before a complete reply arrived
    #[error("connection closed by peer")]
    Eof,
}

/// A pull-based reply decoder over any [`BufRead`].
///
/// # Example
///
/// ```
/// use shardis::protocol::{Reply, SyncReader};
///
/// let mut reader = SyncReader::new(&b"*2\r\n$3\r\nfoo\r\n:1\r\n"[..]);
/// let reply = reader.read_reply().unwrap();
/// assert_eq!(reply, Reply::aggregate(vec![Reply::bulk("foo"), Reply::Integer(1)]));
/// ```
#[derive(Debug)]
pub struct SyncReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R: BufRead> SyncReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::with_capacity(64),
        }
    }

    /// Blocks until one complete reply has been read.
    pub fn read_reply(&mut self) -> Result<Reply, ReadError> {
        self.read_at_depth(0)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_at_depth(&mut self, depth: usize) -> Result<Reply, ReadError> {
        let header = self.read_header()?;
        match header {
            Header::Status(s) => Ok(Reply::Status(s)),
            Header::Error(s) => Ok(Reply::Error(s)),
            Header::Integer(n) => Ok(Reply::Integer(n)),
            Header::Bulk(None) => Ok(Reply::Bulk(None)),
            Header::Bulk(Some(len)) => {
                // Lengths come off the wire; grow the body as bytes arrive.
                let mut body = Vec::with_capacity(len.min(64 * 1024));
                (&mut self.inner).take(len as u64).read_to_end(&mut body)?;
                if body.len() < len {
                    return Err(ReadError::Eof);
                }
                // Terminator is skipped, not checked.
                let mut crlf = [0u8; 2];
                self.read_exact(&mut crlf)?;
                Ok(Reply::Bulk(Some(Bytes::from(body))))
            }
            Header::Aggregate(None) => Ok(Reply::Aggregate(None)),
            Header::Aggregate(Some(count)) => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH).into());
                }
                let mut items = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    items.push(self.read_at_depth(depth + 1)?);
                }
                Ok(Reply::Aggregate(Some(items)))
            }
        }
    }

    /// Reads a prefix byte and the rest of its CRLF-terminated line.
    fn read_header(&mut self) -> Result<Header, ReadError> {
        let mut kind = [0u8; 1];
        self.read_exact(&mut kind)?;
        let kind = check_prefix(kind[0])?;

        self.line.clear();
        loop {
            let budget = (MAX_LINE_SIZE + 2).saturating_sub(self.line.len()) as u64;
            let n = (&mut self.inner)
                .take(budget)
                .read_until(b'\n', &mut self.line)?;
            if self.line.ends_with(b"\r\n") {
                break;
            }
            check_line_len(self.line.len())?;
            if n == 0 {
                return Err(ReadError::Eof);
            }
            // A bare '\n' is line content; keep reading.
        }
        let content = &self.line[..self.line.len() - 2];
        Ok(header_from_line(kind, content)?)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        self.inner.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ReadError::Eof,
            _ => ReadError::Io(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn read_all(input: &[u8]) -> Vec<Reply> {
        let mut reader = SyncReader::new(input);
        let mut out = Vec::new();
        while !reader.get_ref().is_empty() {
            out.push(reader.read_reply().unwrap());
        }
        out
    }

    #[test]
    fn test_read_each_variant() {
        let replies = read_all(b"+OK\r\n-ERR bad\r\n:1000\r\n:-42\r\n$5\r\nhello\r\n");
        assert_eq!(
            replies,
            vec![
                Reply::status("OK"),
                Reply::error("ERR bad"),
                Reply::Integer(1000),
                Reply::Integer(-42),
                Reply::bulk("hello"),
            ]
        );
    }

    #[test]
    fn test_absent_vs_empty_bulk() {
        let replies = read_all(b"$-1\r\n$0\r\n\r\n*-1\r\n*0\r\n");
        assert_eq!(
            replies,
            vec![
                Reply::Bulk(None),
                Reply::Bulk(Some(Bytes::new())),
                Reply::Aggregate(None),
                Reply::Aggregate(Some(vec![])),
            ]
        );
    }

    #[test]
    fn test_binary_safe_bulk() {
        let replies = read_all(b"$7\r\nhe\r\n\x00lo\r\n");
        assert_eq!(replies, vec![Reply::bulk(&b"he\r\n\x00lo"[..])]);
    }

    #[test]
    fn test_nested_aggregate() {
        let replies = read_all(b"*2\r\n:1\r\n*2\r\n:2\r\n*1\r\n+x\r\n");
        assert_eq!(
            replies,
            vec![Reply::aggregate(vec![
                Reply::Integer(1),
                Reply::aggregate(vec![
                    Reply::Integer(2),
                    Reply::aggregate(vec![Reply::status("x")])
                ]),
            ])]
        );
    }

    #[test]
    fn test_reads_no_further_than_one_reply() {
        let input: &[u8] = b":1\r\n:2\r\n";
        let mut reader = SyncReader::new(input);
        assert_eq!(reader.read_reply().unwrap(), Reply::Integer(1));
        assert_eq!(*reader.get_ref(), &b":2\r\n"[..]);
    }

    #[test]
    fn test_small_buffer_fragments() {
        let input: &[u8] = b"*3\r\n$10\r\n0123456789\r\n+status line\r\n:77\r\n";
        let mut reader = SyncReader::new(BufReader::with_capacity(3, input));
        assert_eq!(
            reader.read_reply().unwrap(),
            Reply::aggregate(vec![
                Reply::bulk("0123456789"),
                Reply::status("status line"),
                Reply::Integer(77),
            ])
        );
    }

    #[test]
    fn test_unknown_prefix() {
        let mut reader = SyncReader::new(&b"!boom\r\n"[..]);
        assert!(matches!(
            reader.read_reply(),
            Err(ReadError::Parse(ParseError::UnknownPrefix(b'!')))
        ));
    }

    #[test]
    fn test_malformed_integer() {
        let mut reader = SyncReader::new(&b":12a\r\n"[..]);
        assert!(matches!(
            reader.read_reply(),
            Err(ReadError::Parse(ParseError::InvalidInteger(_)))
        ));
    }

    #[test]
    fn test_header_line_limit() {
        let mut input = vec![b'-'];
        input.extend(std::iter::repeat(b'x').take(MAX_LINE_SIZE + 8));
        input.extend_from_slice(b"\r\n");
        let mut reader = SyncReader::new(&input[..]);
        assert!(matches!(
            reader.read_reply(),
            Err(ReadError::Parse(ParseError::MessageTooLarge { .. }))
        ));

        let mut input = vec![b'+'];
        input.extend(std::iter::repeat(b'y').take(MAX_LINE_SIZE));
        input.extend_from_slice(b"\r\n");
        let mut reader = SyncReader::new(BufReader::with_capacity(7, &input[..]));
        assert_eq!(reader.read_reply().unwrap(), Reply::Status("y".repeat(MAX_LINE_SIZE)));
    }

    #[test]
    fn test_eof_mid_reply() {
        let mut reader = SyncReader::new(&b"$10\r\nabc"[..]);
        assert!(matches!(reader.read_reply(), Err(ReadError::Eof)));

        let mut reader = SyncReader::new(&b"+OK"[..]);
        assert!(matches!(reader.read_reply(), Err(ReadError::Eof)));

        let mut reader = SyncReader::new(&b""[..]);
        assert!(matches!(reader.read_reply(), Err(ReadError::Eof)));
    }
}
