//! RESP Protocol Implementation
//!
//! This module provides the client side of the Redis Serialization Protocol (RESP).
//!
//! ## Overview
//!
//! A client writes commands as arrays of bulk strings and reads back replies
//! of five shapes. Replies can arrive two ways: pulled from a blocking socket,
//! or pushed in arbitrary fragments by an async reader. Both go through the
//! same grammar.
//!
//! ## Modules
//!
//! - `types`: The `Reply` enum and its serialization
//! - `command`: The `Verb` table, `Command` and its encoding
//! - `parser`: Reply grammar shared by both decoders, and `ParseError`
//! - `reader`: `SyncReader`, a pull-based decoder over `BufRead`
//! - `framer`: `StreamFramer`, a push-based resumable decoder
//!
//! ## Example
//!
//! ```
//! use shardis::protocol::{Command, Reply, StreamFramer, Verb};
//!
//! let request = Command::new(Verb::Get).arg("name").encode();
//! assert_eq!(&request[..], b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! let mut framer = StreamFramer::new();
//! let replies = framer.push(b"$4\r\nAriz\r\n").unwrap();
//! assert_eq!(replies, vec![Reply::bulk("Ariz")]);
//! ```

pub mod command;
pub mod framer;
pub mod parser;
pub mod reader;
pub mod types;

// Re-export commonly used types for convenience
pub use command::{Command, Verb};
pub use framer::StreamFramer;
pub use parser::{ParseError, ParseResult};
pub use reader::{ReadError, SyncReader};
pub use types::Reply;
