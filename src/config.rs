//! Configuration for shardis
//!
//! Plain immutable values with sensible defaults. Every `with_*` method consumes
//! the value and returns an updated copy, so a configuration can be shared
//! freely once built.

use crate::hashing::HashAlgorithm;
use crate::sharding::ConfigError;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default socket read timeout for a shard (2 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default shard weight
pub const DEFAULT_WEIGHT: u32 = 1;

/// Virtual nodes placed on the ring per unit of weight
pub const VNODES_PER_WEIGHT: u32 = 160;

/// Default capacity of the async reply queue
pub const DEFAULT_REPLY_QUEUE_CAPACITY: usize = 1024;

/// One server in the shard list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDescriptor {
    /// Host name or IP address
    pub host: String,

    /// TCP port
    pub port: u16,

    /// Relative share of the key space (must be positive)
    pub weight: u32,

    /// Stable ring identity. Named shards keep their ring points when the
    /// shard list is reordered.
    pub name: Option<String>,

    /// Finite read timeout used outside blocking commands
    pub read_timeout: Duration,

    /// Sent with `AUTH` right after connecting
    pub password: Option<String>,
}

impl Default for ShardDescriptor {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            weight: DEFAULT_WEIGHT,
            name: None,
            read_timeout: DEFAULT_TIMEOUT,
            password: None,
        }
    }
}

impl ShardDescriptor {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Returns `host:port`, suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The name used in logs and errors: the shard name if set, else `host:port`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.addr(),
        }
    }
}

impl fmt::Display for ShardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if self.weight != DEFAULT_WEIGHT {
            write!(f, "*{}", self.weight)?;
        }
        Ok(())
    }
}

/// Parses `host:port` or `host:port*weight`.
impl FromStr for ShardDescriptor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidDescriptor(s.to_string());

        let (endpoint, weight) = match s.split_once('*') {
            Some((endpoint, weight)) => {
                let weight: u32 = weight.trim().parse().map_err(|_| invalid())?;
                if weight == 0 {
                    return Err(ConfigError::InvalidWeight(weight));
                }
                (endpoint, weight)
            }
            None => (s, DEFAULT_WEIGHT),
        };

        let (host, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;

        Ok(ShardDescriptor::new(host, port).with_weight(weight))
    }
}

/// How keys are reduced to their routing portion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyTag {
    /// `{tag}` syntax: only the text between the first braces is hashed
    #[default]
    Default,

    /// The whole key is always hashed
    Disabled,

    /// A custom regex whose first capture group is the tag
    Custom(String),
}

/// Everything needed to build a router.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// The shard list (must not be empty)
    pub shards: Vec<ShardDescriptor>,

    /// Hash used for ring placement and lookup
    pub hash: HashAlgorithm,

    /// Key tag extraction
    pub key_tag: KeyTag,

    /// Whether connections start in pipelined mode
    pub pipelining: bool,

    /// Bound of each async connection's reply queue
    pub reply_queue_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            shards: Vec::new(),
            hash: HashAlgorithm::default(),
            key_tag: KeyTag::default(),
            pipelining: false,
            reply_queue_capacity: DEFAULT_REPLY_QUEUE_CAPACITY,
        }
    }
}

impl RouterConfig {
    pub fn new(shards: Vec<ShardDescriptor>) -> Self {
        Self {
            shards,
            ..Self::default()
        }
    }

    pub fn with_hash(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_key_tag(mut self, key_tag: KeyTag) -> Self {
        self.key_tag = key_tag;
        self
    }

    pub fn with_pipelining(mut self, enabled: bool) -> Self {
        self.pipelining = enabled;
        self
    }

    pub fn with_reply_queue_capacity(mut self, capacity: usize) -> Self {
        self.reply_queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let shard = ShardDescriptor::new("10.0.0.1", 6380);
        assert_eq!(shard.weight, 1);
        assert_eq!(shard.read_timeout, Duration::from_millis(2000));
        assert_eq!(shard.name, None);
        assert_eq!(shard.addr(), "10.0.0.1:6380");
        assert_eq!(shard.label(), "10.0.0.1:6380");
    }

    #[test]
    fn test_with_methods_return_new_values() {
        let base = ShardDescriptor::new("a", 1);
        let named = base.clone().with_name("cache-1").with_weight(3);

        assert_eq!(base.weight, 1);
        assert_eq!(named.weight, 3);
        assert_eq!(named.label(), "cache-1");
    }

    #[test]
    fn test_parse_descriptor() {
        let shard: ShardDescriptor = "localhost:7000".parse().unwrap();
        assert_eq!(shard.host, "localhost");
        assert_eq!(shard.port, 7000);
        assert_eq!(shard.weight, 1);

        let shard: ShardDescriptor = "10.1.2.3:6379*4".parse().unwrap();
        assert_eq!(shard.weight, 4);
        assert_eq!(shard.to_string(), "10.1.2.3:6379*4");
    }

    #[test]
    fn test_parse_descriptor_errors() {
        assert!(matches!(
            "nohost".parse::<ShardDescriptor>(),
            Err(ConfigError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            ":6379".parse::<ShardDescriptor>(),
            Err(ConfigError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            "host:notaport".parse::<ShardDescriptor>(),
            Err(ConfigError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            "host:1*0".parse::<ShardDescriptor>(),
            Err(ConfigError::InvalidWeight(0))
        ));
    }

    #[test]
    fn test_router_config_builder() {
        let config = RouterConfig::new(vec![ShardDescriptor::default()])
            .with_hash(HashAlgorithm::Md5)
            .with_key_tag(KeyTag::Disabled)
            .with_pipelining(true)
            .with_reply_queue_capacity(0);

        assert_eq!(config.shards.len(), 1);
        assert_eq!(config.hash, HashAlgorithm::Md5);
        assert_eq!(config.key_tag, KeyTag::Disabled);
        assert!(config.pipelining);
        assert_eq!(config.reply_queue_capacity, 1);
    }
}
