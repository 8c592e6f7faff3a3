//! Resumable Reply Framer
//!
//! An asynchronous transport hands the decoder whatever byte range happened to
//! arrive: half a header line, three replies and the start of a fourth, one
//! byte of a bulk body. The [`StreamFramer`] accepts those fragments in order
//! and emits every reply that has become complete, in wire order.
//!
//! ## How It Works
//!
//! ```text
//!   push(bytes) ──> buffer ──> next token ──┬─> leaf ──> deliver ──> output
//!                                           │              ▲
//!                                           └─> "*N" ──> stack of partial aggregates
//! ```
//!
//! 1. Incoming bytes are appended to an internal `BytesMut`.
//! 2. One token at a time is taken from the front: a leaf reply (status, error,
//!    integer, whole bulk) or an aggregate header.
//! 3. If the front does not hold a complete token, nothing is consumed and the
//!    framer waits for the next `push`. A header is never consumed without its
//!    bulk body.
//! 4. A leaf is delivered to the innermost partial aggregate. When that
//!    aggregate fills up it is itself delivered one level out, until either a
//!    frame is still waiting for elements or a top-level reply is complete.
//!
//! The state lives in this struct, not on the call stack, so any nesting depth
//! survives any fragmentation.

use crate::protocol::parser::{parse_header, Header, ParseError, ParseResult, MAX_NESTING_DEPTH};
use crate::protocol::types::Reply;
use bytes::{Buf, BytesMut};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// An aggregate whose header has been read but whose elements have not all arrived.
#[derive(Debug)]
struct PartialAggregate {
    remaining: usize,
    items: Vec<Reply>,
}

impl PartialAggregate {
    fn new(count: usize) -> Self {
        Self {
            remaining: count,
            // Counts come off the wire; don't trust them for preallocation.
            items: Vec::with_capacity(count.min(64)),
        }
    }
}

enum Token {
    Leaf(Reply),
    Open(usize),
}

/// A push-based, resumable RESP reply decoder.
///
/// # Example
///
/// ```
/// use shardis::protocol::{Reply, StreamFramer};
///
/// let mut framer = StreamFramer::new();
/// assert!(framer.push(b"*2\r\n$3\r\nfoo").unwrap().is_empty());
/// let replies = framer.push(b"\r\n:7\r\n+OK\r\n").unwrap();
/// assert_eq!(replies, vec![
///     Reply::aggregate(vec![Reply::bulk("foo"), Reply::Integer(7)]),
///     Reply::status("OK"),
/// ]);
/// ```
///
/// After any `Err` the byte stream is desynchronized; the framer must be
/// discarded (or [`reset`](Self::reset)) along with its connection.
#[derive(Debug)]
pub struct StreamFramer {
    buffer: BytesMut,
    stack: Vec<PartialAggregate>,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            stack: Vec::new(),
        }
    }

    /// Appends `data` and returns every reply that is now complete, in order.
    ///
    /// On `Err`, replies decoded earlier in the same call are not returned.
    /// Callers that must keep them loop on [`next_reply`](Self::next_reply).
    pub fn push(&mut self, data: &[u8]) -> ParseResult<Vec<Reply>> {
        self.buffer.extend_from_slice(data);

        let mut replies = Vec::new();
        while let Some(reply) = self.next_reply()? {
            replies.push(reply);
        }

        trace!(
            received = data.len(),
            emitted = replies.len(),
            buffered = self.buffer.len(),
            depth = self.stack.len(),
            "Framed replies"
        );
        Ok(replies)
    }

    /// Returns the writable tail of the internal buffer.
    ///
    /// Transports that read straight into the framer append here, then call
    /// [`drain`](Self::drain).
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Decodes every complete reply already sitting in the buffer.
    pub fn drain(&mut self) -> ParseResult<Vec<Reply>> {
        self.push(&[])
    }

    /// Decodes the next complete top-level reply, if the buffer holds one.
    pub fn next_reply(&mut self) -> ParseResult<Option<Reply>> {
        loop {
            let token = match self.next_token()? {
                Some(token) => token,
                None => return Ok(None),
            };

            match token {
                Token::Open(count) => {
                    if self.stack.len() >= MAX_NESTING_DEPTH {
                        return Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH));
                    }
                    self.stack.push(PartialAggregate::new(count));
                }
                Token::Leaf(reply) => {
                    if let Some(complete) = self.deliver(reply) {
                        return Ok(Some(complete));
                    }
                }
            }
        }
    }

    /// True when no bytes are buffered and no aggregate is in progress.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.stack.is_empty()
    }

    /// Number of undecoded bytes held.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// How many aggregates are currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drops all buffered bytes and partial state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.stack.clear();
    }

    /// Takes one token off the front of the buffer, or nothing at all.
    fn next_token(&mut self) -> ParseResult<Option<Token>> {
        let (header, consumed) = match parse_header(&self.buffer)? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let token = match header {
            Header::Status(s) => Token::Leaf(Reply::Status(s)),
            Header::Error(s) => Token::Leaf(Reply::Error(s)),
            Header::Integer(n) => Token::Leaf(Reply::Integer(n)),
            Header::Bulk(None) => Token::Leaf(Reply::Bulk(None)),
            Header::Bulk(Some(len)) => {
                // Header, body and terminator must all be present.
                let total = consumed + len + 2;
                if self.buffer.len() < total {
                    return Ok(None);
                }
                let mut frame = self.buffer.split_to(total);
                frame.advance(consumed);
                frame.truncate(len);
                return Ok(Some(Token::Leaf(Reply::Bulk(Some(frame.freeze())))));
            }
            Header::Aggregate(None) => Token::Leaf(Reply::Aggregate(None)),
            Header::Aggregate(Some(0)) => Token::Leaf(Reply::Aggregate(Some(Vec::new()))),
            Header::Aggregate(Some(count)) => Token::Open(count),
        };

        self.buffer.advance(consumed);
        Ok(Some(token))
    }

    /// Hands a finished reply to the innermost open aggregate, closing frames
    /// as they fill. Returns the reply once it reaches the top level.
    fn deliver(&mut self, mut reply: Reply) -> Option<Reply> {
        while let Some(top) = self.stack.last_mut() {
            top.items.push(reply);
            top.remaining -= 1;
            if top.remaining > 0 {
                return None;
            }
            let finished = self.stack.pop().map(|f| f.items).unwrap_or_default();
            reply = Reply::Aggregate(Some(finished));
        }
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn fixture() -> Vec<Reply> {
        vec![
            Reply::status("OK"),
            Reply::error("ERR wrong type"),
            Reply::Integer(-12),
            Reply::bulk("hello"),
            Reply::nil(),
            Reply::bulk(Bytes::new()),
            Reply::aggregate(vec![Reply::bulk("list"), Reply::bulk("value")]),
            Reply::nil_aggregate(),
            Reply::aggregate(vec![]),
            Reply::aggregate(vec![
                Reply::Integer(1),
                Reply::aggregate(vec![
                    Reply::bulk("a\r\nb"),
                    Reply::aggregate(vec![Reply::nil(), Reply::status("deep")]),
                ]),
                Reply::aggregate(vec![]),
            ]),
        ]
    }

    fn wire(replies: &[Reply]) -> Vec<u8> {
        let mut buf = Vec::new();
        for reply in replies {
            reply.serialize_into(&mut buf);
        }
        buf
    }

    #[test]
    fn test_single_push_yields_all() {
        let expected = fixture();
        let mut framer = StreamFramer::new();
        assert_eq!(framer.push(&wire(&expected)).unwrap(), expected);
        assert!(framer.is_idle());
    }

    #[test]
    fn test_byte_at_a_time_yields_same_order() {
        let expected = fixture();
        let mut framer = StreamFramer::new();
        let mut got = Vec::new();
        for byte in wire(&expected) {
            got.extend(framer.push(&[byte]).unwrap());
        }
        assert_eq!(got, expected);
        assert!(framer.is_idle());
    }

    #[test]
    fn test_every_split_point() {
        let expected = fixture();
        let bytes = wire(&expected);
        for split in 0..=bytes.len() {
            let mut framer = StreamFramer::new();
            let mut got = framer.push(&bytes[..split]).unwrap();
            got.extend(framer.push(&bytes[split..]).unwrap());
            assert_eq!(got, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_incomplete_makes_no_progress() {
        let mut framer = StreamFramer::new();
        assert!(framer.push(b"$5\r\nhel").unwrap().is_empty());
        // Header is not consumed without its body.
        assert_eq!(framer.buffered_len(), 7);
        assert!(framer.push(b"").unwrap().is_empty());
        assert_eq!(framer.push(b"lo\r\n").unwrap(), vec![Reply::bulk("hello")]);
    }

    #[test]
    fn test_partial_aggregate_state_survives_calls() {
        let mut framer = StreamFramer::new();
        assert!(framer.push(b"*3\r\n:1\r\n").unwrap().is_empty());
        assert_eq!(framer.depth(), 1);
        assert!(framer.push(b"*1\r\n").unwrap().is_empty());
        assert_eq!(framer.depth(), 2);
        assert!(framer.push(b"+x\r\n").unwrap().is_empty());
        assert_eq!(framer.depth(), 1);
        let out = framer.push(b"$-1\r\n").unwrap();
        assert_eq!(
            out,
            vec![Reply::aggregate(vec![
                Reply::Integer(1),
                Reply::aggregate(vec![Reply::status("x")]),
                Reply::nil(),
            ])]
        );
        assert!(framer.is_idle());
    }

    #[test]
    fn test_runaway_header_line_is_rejected() {
        let mut framer = StreamFramer::new();
        assert!(framer.push(b"+").unwrap().is_empty());
        let chunk = [b'z'; 4096];
        let mut result = Ok(Vec::new());
        for _ in 0..=(crate::protocol::parser::MAX_LINE_SIZE / chunk.len()) {
            result = framer.push(&chunk);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(ParseError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_next_reply_keeps_replies_ahead_of_bad_frame() {
        let mut framer = StreamFramer::new();
        framer.buffer_mut().extend_from_slice(b"+OK\r\n:5\r\n%oops\r\n");
        assert_eq!(framer.next_reply().unwrap(), Some(Reply::status("OK")));
        assert_eq!(framer.next_reply().unwrap(), Some(Reply::Integer(5)));
        assert_eq!(framer.next_reply(), Err(ParseError::UnknownPrefix(b'%')));
    }

    #[test]
    fn test_absent_vs_empty() {
        let mut framer = StreamFramer::new();
        let out = framer.push(b"$-1\r\n$0\r\n\r\n*-1\r\n*0\r\n").unwrap();
        assert_eq!(
            out,
            vec![
                Reply::Bulk(None),
                Reply::Bulk(Some(Bytes::new())),
                Reply::Aggregate(None),
                Reply::Aggregate(Some(vec![])),
            ]
        );
    }

    #[test]
    fn test_bulk_terminator_not_validated() {
        let mut framer = StreamFramer::new();
        let out = framer.push(b"$3\r\nabcXY:1\r\n").unwrap();
        assert_eq!(out, vec![Reply::bulk("abc"), Reply::Integer(1)]);
    }

    #[test]
    fn test_unknown_prefix_is_fatal() {
        let mut framer = StreamFramer::new();
        assert_eq!(
            framer.push(b"+OK\r\n?oops\r\n"),
            Err(ParseError::UnknownPrefix(b'?'))
        );
    }

    #[test]
    fn test_malformed_length_is_fatal() {
        let mut framer = StreamFramer::new();
        assert!(matches!(
            framer.push(b"*x\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let mut framer = StreamFramer::new();
        let deep = b"*1\r\n".repeat(MAX_NESTING_DEPTH + 1);
        assert_eq!(
            framer.push(&deep),
            Err(ParseError::NestingTooDeep(MAX_NESTING_DEPTH))
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let mut framer = StreamFramer::new();
        framer.push(b"*2\r\n:1\r\n$4\r\nab").unwrap();
        assert!(!framer.is_idle());
        framer.reset();
        assert!(framer.is_idle());
        assert_eq!(framer.push(b":5\r\n").unwrap(), vec![Reply::Integer(5)]);
    }

    #[test]
    fn test_buffer_mut_then_drain() {
        let mut framer = StreamFramer::new();
        framer.buffer_mut().extend_from_slice(b":1\r\n:2\r\n");
        assert_eq!(
            framer.drain().unwrap(),
            vec![Reply::Integer(1), Reply::Integer(2)]
        );
    }
}
