//! # shardis - A Sharded RESP Client
//!
//! shardis is a client for Redis-compatible servers. It speaks the RESP
//! protocol over one connection per server and spreads keys across many
//! independent servers with a consistent-hashing ring.
//!
//! ## Features
//!
//! - **RESP Codec**: Binary-safe command encoding and reply decoding, including nested arrays
//! - **Resumable Framing**: A push-based decoder that copes with arbitrary TCP fragmentation
//! - **Pipelining**: Send many commands, then drain their replies in FIFO order
//! - **Blocking Commands**: `BLPOP`-style commands wait without a read deadline
//! - **Client-Side Sharding**: Weighted virtual-node hash ring with `{tag}` co-location
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              shardis                                    │
//! │                                                                         │
//! │   key ──>┌─────────────┐    ┌─────────────┐                             │
//! │          │   Router    │───>│  ShardRing  │  (hash + key tag)           │
//! │          └──────┬──────┘    └─────────────┘                             │
//! │                 │ one per shard                                         │
//! │                 ▼                                                       │
//! │  ┌──────────────────────────────┐    ┌──────────────────────────────┐  │
//! │  │   Connection (std::net)      │    │  AsyncConnection (tokio)     │  │
//! │  │   encode ─> socket           │    │  encode ─> socket            │  │
//! │  │   SyncReader <─ socket       │    │  StreamFramer <─ reader task │  │
//! │  └──────────────────────────────┘    └──────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use shardis::{Command, RouterConfig, ShardDescriptor, Router, Verb};
//!
//! let config = RouterConfig::new(vec![
//!     ShardDescriptor::new("10.0.0.1", 6379),
//!     ShardDescriptor::new("10.0.0.2", 6379).with_weight(2),
//! ]);
//! let mut router = Router::connect(&config)?;
//!
//! let set = Command::new(Verb::Set).arg("user:{42}:name").arg("Ariz");
//! router.execute(b"user:{42}:name", &set)?;
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Commands, replies, the blocking reader and the stream framer
//! - [`connection`]: Sync and async connections with pipeline accounting
//! - [`hashing`]: Pluggable 64-bit hash strategies
//! - [`sharding`]: The consistent-hashing ring and the per-shard router
//! - [`config`]: Immutable shard and router configuration

pub mod config;
pub mod connection;
pub mod hashing;
pub mod protocol;
pub mod sharding;

// Re-export commonly used types for convenience
pub use config::{KeyTag, RouterConfig, ShardDescriptor};
pub use connection::{AsyncConnection, Connection, ConnectionError, PipelineState};
pub use hashing::{HashAlgorithm, HashStrategy, Md5Hash, MurmurHash};
pub use protocol::{Command, ParseError, Reply, StreamFramer, SyncReader, Verb};
pub use sharding::{AsyncRouter, ConfigError, Router, RouterError, ShardRing, Sharded};

/// The default port of a RESP server
pub const DEFAULT_PORT: u16 = 6379;

/// The default host a shard is assumed to live on
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of shardis
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
