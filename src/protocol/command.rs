//! Commands and Their Wire Encoding
//!
//! A command is a verb from a closed set plus an ordered list of binary-safe
//! arguments. There is exactly one wire shape, an array of bulk strings:
//!
//! ```text
//! *<n+1>\r\n
//! $<len(verb)>\r\n<verb>\r\n
//! $<len(arg1)>\r\n<arg1>\r\n
//! ...
//! ```
//!
//! Arguments are written verbatim. The length prefix makes embedded CRLF safe.

use crate::protocol::parser::{ParseError, ParseResult};
use crate::protocol::types::{prefix, Reply, CRLF};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Revision of the verb table below. Bump it when verbs are added or removed.
pub const VERB_TABLE_VERSION: u32 = 1;

macro_rules! verbs {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// A server verb.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Verb {
            $($variant),*
        }

        impl Verb {
            /// Every known verb, in table order.
            pub const ALL: &'static [Verb] = &[$(Verb::$variant),*];

            /// The upper-case token sent on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Verb::$variant => $name),*
                }
            }

            /// Looks a verb up by its token, ignoring ASCII case.
            pub fn from_name(name: &[u8]) -> Option<Verb> {
                $(
                    if name.eq_ignore_ascii_case($name.as_bytes()) {
                        return Some(Verb::$variant);
                    }
                )*
                None
            }
        }
    };
}

verbs! {
    Append => "APPEND",
    Auth => "AUTH",
    Bgrewriteaof => "BGREWRITEAOF",
    Bgsave => "BGSAVE",
    Blpop => "BLPOP",
    Brpop => "BRPOP",
    Brpoplpush => "BRPOPLPUSH",
    Config => "CONFIG",
    Dbsize => "DBSIZE",
    Decr => "DECR",
    Decrby => "DECRBY",
    Del => "DEL",
    Discard => "DISCARD",
    Echo => "ECHO",
    Exec => "EXEC",
    Exists => "EXISTS",
    Expire => "EXPIRE",
    Expireat => "EXPIREAT",
    Flushall => "FLUSHALL",
    Flushdb => "FLUSHDB",
    Get => "GET",
    Getset => "GETSET",
    Hdel => "HDEL",
    Hexists => "HEXISTS",
    Hget => "HGET",
    Hgetall => "HGETALL",
    Hincrby => "HINCRBY",
    Hkeys => "HKEYS",
    Hlen => "HLEN",
    Hmget => "HMGET",
    Hmset => "HMSET",
    Hset => "HSET",
    Hsetnx => "HSETNX",
    Hvals => "HVALS",
    Incr => "INCR",
    Incrby => "INCRBY",
    Info => "INFO",
    Keys => "KEYS",
    Lastsave => "LASTSAVE",
    Lindex => "LINDEX",
    Linsert => "LINSERT",
    Llen => "LLEN",
    Lpop => "LPOP",
    Lpush => "LPUSH",
    Lpushx => "LPUSHX",
    Lrange => "LRANGE",
    Lrem => "LREM",
    Lset => "LSET",
    Ltrim => "LTRIM",
    Mget => "MGET",
    Move => "MOVE",
    Mset => "MSET",
    Msetnx => "MSETNX",
    Multi => "MULTI",
    Persist => "PERSIST",
    Ping => "PING",
    Publish => "PUBLISH",
    Quit => "QUIT",
    Randomkey => "RANDOMKEY",
    Rename => "RENAME",
    Renamenx => "RENAMENX",
    Rpop => "RPOP",
    Rpoplpush => "RPOPLPUSH",
    Rpush => "RPUSH",
    Rpushx => "RPUSHX",
    Sadd => "SADD",
    Save => "SAVE",
    Scard => "SCARD",
    Sdiff => "SDIFF",
    Sdiffstore => "SDIFFSTORE",
    Select => "SELECT",
    Set => "SET",
    Setex => "SETEX",
    Setnx => "SETNX",
    Sinter => "SINTER",
    Sinterstore => "SINTERSTORE",
    Sismember => "SISMEMBER",
    Smembers => "SMEMBERS",
    Smove => "SMOVE",
    Sort => "SORT",
    Spop => "SPOP",
    Srandmember => "SRANDMEMBER",
    Srem => "SREM",
    Strlen => "STRLEN",
    Sunion => "SUNION",
    Sunionstore => "SUNIONSTORE",
    Ttl => "TTL",
    Type => "TYPE",
    Unwatch => "UNWATCH",
    Watch => "WATCH",
    Zadd => "ZADD",
    Zcard => "ZCARD",
    Zcount => "ZCOUNT",
    Zincrby => "ZINCRBY",
    Zinterstore => "ZINTERSTORE",
    Zrange => "ZRANGE",
    Zrangebyscore => "ZRANGEBYSCORE",
    Zrank => "ZRANK",
    Zrem => "ZREM",
    Zremrangebyrank => "ZREMRANGEBYRANK",
    Zremrangebyscore => "ZREMRANGEBYSCORE",
    Zrevrange => "ZREVRANGE",
    Zrevrank => "ZREVRANK",
    Zscore => "ZSCORE",
    Zunionstore => "ZUNIONSTORE",
}

impl Verb {
    /// The token as bytes.
    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Verbs that may legitimately wait on the server for data to arrive.
    ///
    /// These run without a client-side read deadline.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Verb::Blpop | Verb::Brpop | Verb::Brpoplpush)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable request: a verb and its arguments.
///
/// # Example
///
/// ```
/// use shardis::protocol::{Command, Verb};
///
/// let cmd = Command::new(Verb::Set).arg("name").arg("Ariz");
/// assert_eq!(&cmd.encode()[..], b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: Verb,
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command with no arguments.
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            args: Vec::new(),
        }
    }

    /// Creates a command from a verb and a list of arguments.
    pub fn with_args<I, A>(verb: Verb, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        Self {
            verb,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Appends one binary argument.
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends an integer argument in decimal form.
    pub fn arg_int(self, n: i64) -> Self {
        self.arg(n.to_string())
    }

    /// Appends a floating-point argument, using the server's spelling of infinities.
    pub fn arg_float(self, x: f64) -> Self {
        let text = if x == f64::INFINITY {
            "+inf".to_string()
        } else if x == f64::NEG_INFINITY {
            "-inf".to_string()
        } else {
            x.to_string()
        };
        self.arg(text)
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Encodes the command to a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encodes the command onto the end of `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u8(prefix::AGGREGATE);
        buf.put_slice((self.args.len() + 1).to_string().as_bytes());
        buf.put_slice(CRLF);
        put_bulk(buf, self.verb.as_bytes());
        for arg in &self.args {
            put_bulk(buf, arg);
        }
    }

    /// Exact number of bytes [`encode`](Self::encode) produces.
    pub fn encoded_len(&self) -> usize {
        let header = 1 + decimal_len(self.args.len() + 1) + 2;
        let verb = bulk_len(self.verb.as_bytes().len());
        header + verb + self.args.iter().map(|a| bulk_len(a.len())).sum::<usize>()
    }

    /// Parses a decoded request frame (an aggregate of bulks) back into a command.
    ///
    /// This is the peer's view of [`encode`](Self::encode).
    pub fn from_frame(frame: Reply) -> ParseResult<Command> {
        let items = frame.into_aggregate().ok_or_else(|| {
            ParseError::ProtocolError("command frame must be a non-empty aggregate".to_string())
        })?;

        let mut parts = items.into_iter().map(|item| match item {
            Reply::Bulk(Some(data)) => Ok(data),
            other => Err(ParseError::ProtocolError(format!(
                "command frame element must be a bulk string, got {:?}",
                other
            ))),
        });

        let name = parts.next().ok_or_else(|| {
            ParseError::ProtocolError("command frame has no verb".to_string())
        })??;
        let verb = Verb::from_name(&name).ok_or_else(|| {
            ParseError::ProtocolError(format!(
                "unknown verb: {}",
                String::from_utf8_lossy(&name)
            ))
        })?;

        let args = parts.collect::<ParseResult<Vec<Bytes>>>()?;
        Ok(Command { verb, args })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb)?;
        for arg in &self.args {
            write!(f, " {}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

#[inline]
fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(prefix::BULK);
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

#[inline]
fn bulk_len(len: usize) -> usize {
    1 + decimal_len(len) + 2 + len + 2
}

fn decimal_len(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}
