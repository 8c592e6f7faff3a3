//! Consistent Hash Ring
//!
//! Every shard is placed on a 64-bit ring `160 × weight` times. A key belongs
//! to the first point at or after its hash, wrapping around to the lowest point
//! when the hash is past the last one.
//!
//! ## Point Identity
//!
//! Each virtual node is the hash of a string:
//!
//! - named shard: `"<name>*<weight><n>"`
//! - unnamed shard: `"SHARD-<index>-NODE-<n>"`
//!
//! An unnamed shard's points depend on its position in the list, so reordering
//! the list moves keys. Named shards keep their points wherever they appear.
//!
//! ## Key Tags
//!
//! With a key tag pattern, only the first capture group of the first match is
//! hashed, so `{user1000}.following` and `{user1000}.followers` always land
//! on the same shard.

use crate::config::{KeyTag, RouterConfig, ShardDescriptor, VNODES_PER_WEIGHT};
use crate::hashing::HashStrategy;
use regex::bytes::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// The `{tag}` pattern.
pub const DEFAULT_KEY_TAG: &str = r"\{(.+?)\}";

/// Errors detected while building a ring or parsing its configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shard list is empty")]
    EmptyShardList,

    #[error("invalid key tag pattern {pattern:?}: {reason}")]
    InvalidKeyTagPattern { pattern: String, reason: String },

    #[error("invalid shard weight {0}: must be positive")]
    InvalidWeight(u32),

    #[error("invalid shard {0:?}: expected host:port or host:port*weight")]
    InvalidDescriptor(String),
}

/// A compiled key tag regex with exactly one capture group.
#[derive(Clone)]
pub struct KeyTagPattern {
    regex: Regex,
}

impl KeyTagPattern {
    /// Compiles `pattern`. `.` matches any byte except `\n`, so binary keys work.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidKeyTagPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let regex = RegexBuilder::new(pattern)
            .unicode(false)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        // Group 0 is the whole match.
        if regex.captures_len() != 2 {
            return Err(invalid(format!(
                "expected exactly one capture group, found {}",
                regex.captures_len() - 1
            )));
        }

        Ok(Self { regex })
    }

    /// Compiles the pattern a [`KeyTag`] setting names, if any.
    pub fn from_setting(setting: &KeyTag) -> Result<Option<Self>, ConfigError> {
        match setting {
            KeyTag::Default => Self::new(DEFAULT_KEY_TAG).map(Some),
            KeyTag::Disabled => Ok(None),
            KeyTag::Custom(pattern) => Self::new(pattern).map(Some),
        }
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// The tag inside `key`, or the whole key when the pattern does not match.
    pub fn extract<'k>(&self, key: &'k [u8]) -> &'k [u8] {
        match self.regex.captures(key).and_then(|caps| caps.get(1)) {
            Some(tag) => &key[tag.range()],
            None => key,
        }
    }
}

impl fmt::Debug for KeyTagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyTagPattern").field(&self.as_str()).finish()
    }
}

/// An immutable weighted consistent hash ring.
///
/// # Example
///
/// ```
/// use shardis::{MurmurHash, ShardDescriptor, ShardRing};
/// use shardis::sharding::KeyTagPattern;
/// use std::sync::Arc;
///
/// let shards = vec![
///     ShardDescriptor::new("10.0.0.1", 6379),
///     ShardDescriptor::new("10.0.0.2", 6379).with_weight(2),
/// ];
/// let tag = KeyTagPattern::new(r"\{(.+?)\}").unwrap();
/// let ring = ShardRing::new(shards, Arc::new(MurmurHash), Some(tag)).unwrap();
///
/// assert_eq!(ring.shard_index(b"{user1}:a"), ring.shard_index(b"{user1}:b"));
/// ```
pub struct ShardRing {
    points: BTreeMap<u64, usize>,
    shards: Vec<ShardDescriptor>,
    hash: Arc<dyn HashStrategy>,
    key_tag: Option<KeyTagPattern>,
}

impl ShardRing {
    /// Builds the ring. Fails on an empty shard list or a zero weight.
    pub fn new(
        shards: Vec<ShardDescriptor>,
        hash: Arc<dyn HashStrategy>,
        key_tag: Option<KeyTagPattern>,
    ) -> Result<Self, ConfigError> {
        if shards.is_empty() {
            return Err(ConfigError::EmptyShardList);
        }

        let mut points = BTreeMap::new();
        for (index, shard) in shards.iter().enumerate() {
            if shard.weight == 0 {
                return Err(ConfigError::InvalidWeight(shard.weight));
            }
            let vnodes = VNODES_PER_WEIGHT * shard.weight;
            for n in 0..vnodes {
                let identity = point_identity(shard, index, n);
                // Later shards win collisions.
                points.insert(hash.hash(identity.as_bytes()), index);
            }
        }

        debug!(
            shards = shards.len(),
            points = points.len(),
            "Built shard ring"
        );

        Ok(Self {
            points,
            shards,
            hash,
            key_tag,
        })
    }

    /// Builds the ring a [`RouterConfig`] describes.
    pub fn from_config(config: &RouterConfig) -> Result<Self, ConfigError> {
        let key_tag = KeyTagPattern::from_setting(&config.key_tag)?;
        Self::new(config.shards.clone(), Arc::new(config.hash), key_tag)
    }

    /// The routing portion of `key`.
    pub fn key_tag<'k>(&self, key: &'k [u8]) -> &'k [u8] {
        match &self.key_tag {
            Some(pattern) => pattern.extract(key),
            None => key,
        }
    }

    /// Index (into [`shards`](Self::shards)) of the shard that owns `key`.
    pub fn shard_index(&self, key: &[u8]) -> usize {
        let position = self.hash.hash(self.key_tag(key));
        self.points
            .range(position..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, &index)| index)
            .unwrap_or(0)
    }

    /// The descriptor of the shard that owns `key`.
    pub fn lookup(&self, key: &[u8]) -> &ShardDescriptor {
        &self.shards[self.shard_index(key)]
    }

    pub fn shards(&self) -> &[ShardDescriptor] {
        &self.shards
    }

    /// Number of distinct points on the ring.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// All `(position, shard index)` pairs in ring order.
    pub fn points(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.points.iter().map(|(&position, &index)| (position, index))
    }
}

impl fmt::Debug for ShardRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardRing")
            .field("shards", &self.shards)
            .field("points", &self.points.len())
            .field("key_tag", &self.key_tag)
            .finish()
    }
}

fn point_identity(shard: &ShardDescriptor, index: usize, n: u32) -> String {
    match &shard.name {
        Some(name) => format!("{}*{}{}", name, shard.weight, n),
        None => format!("SHARD-{}-NODE-{}", index, n),
    }
}
