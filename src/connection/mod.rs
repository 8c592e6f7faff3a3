//! Connection Module
//!
//! One connection per shard, in two flavors that share the same rules.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Connection                             │
//! │                                                             │
//! │  send_command ──> PipelineState::on_send ──> encode/write   │
//! │                                                  │          │
//! │                                               socket        │
//! │                                                  │          │
//! │  read_reply  <── PipelineState::on_reply <── decode         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`Connection`]: blocking, `std::net`, decodes with `SyncReader`
//! - [`AsyncConnection`]: tokio, decodes with `StreamFramer` in a reader task
//!
//! ## Pipelining
//!
//! With pipelining off every send is flushed and must be followed by exactly
//! one read. With it on, writes are buffered and [`Connection::drain`] reads
//! every outstanding reply in send order, then switches pipelining off.
//!
//! ## Example
//!
//! ```ignore
//! use shardis::{Command, Connection, ShardDescriptor, Verb};
//!
//! let mut conn = Connection::new(ShardDescriptor::new("127.0.0.1", 6379));
//! conn.set_pipelining(true);
//! conn.send_command(&Command::new(Verb::Incr).arg("hits"))?;
//! conn.send_command(&Command::new(Verb::Get).arg("hits"))?;
//! let replies = conn.drain()?;
//! ```

pub mod blocking;
pub mod error;
pub mod nonblocking;
pub mod pipeline;

// Re-export commonly used types
pub use blocking::Connection;
pub use error::ConnectionError;
pub use nonblocking::AsyncConnection;
pub use pipeline::PipelineState;
