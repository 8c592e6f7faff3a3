//! Client-Side Sharding
//!
//! Keys are spread across independent servers with a consistent hash ring.
//! Adding or removing one shard only moves the keys that shard owned (or now
//! owns); everything else stays put.
//!
//! ```text
//!   key ──> key tag ──> HashStrategy ──> ring ceiling ──> shard index
//!                                             │
//!                                   (wraps to first point)
//! ```
//!
//! - `ring`: [`ShardRing`], key tags and [`ConfigError`]
//! - `router`: [`Sharded`], [`Router`], [`AsyncRouter`] and [`RouterError`]

pub mod ring;
pub mod router;

pub use ring::{ConfigError, KeyTagPattern, ShardRing, DEFAULT_KEY_TAG};
pub use router::{AsyncRouter, Router, RouterError, Sharded};
