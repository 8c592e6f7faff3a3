//! Key Router
//!
//! A [`Sharded`] pairs a [`ShardRing`] with one resource per shard, in ring
//! order. Looking up a key hashes it once and hands back that shard's
//! resource. The two resources that matter are connections:
//!
//! - [`Router`]: one blocking [`Connection`] per shard
//! - [`AsyncRouter`]: one [`AsyncConnection`] per shard
//!
//! Every failure that crosses the router carries the label of the shard it
//! came from. Nothing is retried.

use crate::config::{RouterConfig, ShardDescriptor};
use crate::connection::{AsyncConnection, Connection, ConnectionError};
use crate::protocol::{Command, Reply, Verb};
use crate::sharding::ring::{ConfigError, ShardRing};
use thiserror::Error;
use tracing::debug;

/// Errors returned by a router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The configuration could not be turned into a ring
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A connection failed, while running `verb` if there was one
    #[error("shard {shard}{}: {source}", describe_verb(.verb))]
    Shard {
        shard: String,
        verb: Option<Verb>,
        #[source]
        source: ConnectionError,
    },
}

fn describe_verb(verb: &Option<Verb>) -> String {
    match verb {
        Some(verb) => format!(" ({})", verb),
        None => String::new(),
    }
}

impl RouterError {
    fn shard(shard: &ShardDescriptor, verb: Option<Verb>, source: ConnectionError) -> Self {
        RouterError::Shard {
            shard: shard.label(),
            verb,
            source,
        }
    }

    /// The verb that was running when the shard failed.
    pub fn verb(&self) -> Option<Verb> {
        match self {
            RouterError::Shard { verb, .. } => *verb,
            RouterError::Config(_) => None,
        }
    }

    /// Label of the shard that failed, if the failure came from one.
    pub fn shard_label(&self) -> Option<&str> {
        match self {
            RouterError::Shard { shard, .. } => Some(shard),
            RouterError::Config(_) => None,
        }
    }

    /// The underlying connection error, if any.
    pub fn connection_error(&self) -> Option<&ConnectionError> {
        match self {
            RouterError::Shard { source, .. } => Some(source),
            RouterError::Config(_) => None,
        }
    }
}

/// A ring plus one `R` per shard.
#[derive(Debug)]
pub struct Sharded<R> {
    ring: ShardRing,
    resources: Vec<R>,
}

/// Routes keys to blocking connections.
pub type Router = Sharded<Connection>;

/// Routes keys to async connections.
pub type AsyncRouter = Sharded<AsyncConnection>;

impl<R> Sharded<R> {
    /// Pairs `ring` with resources built from each of its shards, in order.
    pub fn with_resources<F>(ring: ShardRing, make: F) -> Self
    where
        F: FnMut(&ShardDescriptor) -> R,
    {
        let resources = ring.shards().iter().map(make).collect();
        Self { ring, resources }
    }

    /// The resource that owns `key`.
    pub fn shard(&self, key: &[u8]) -> &R {
        &self.resources[self.ring.shard_index(key)]
    }

    /// The resource that owns `key`, mutably.
    pub fn shard_mut(&mut self, key: &[u8]) -> &mut R {
        let index = self.ring.shard_index(key);
        &mut self.resources[index]
    }

    /// The descriptor of the shard that owns `key`.
    pub fn shard_info(&self, key: &[u8]) -> &ShardDescriptor {
        self.ring.lookup(key)
    }

    pub fn shard_index(&self, key: &[u8]) -> usize {
        self.ring.shard_index(key)
    }

    /// The bytes actually hashed for `key`.
    pub fn key_tag<'k>(&self, key: &'k [u8]) -> &'k [u8] {
        self.ring.key_tag(key)
    }

    pub fn all_shards(&self) -> &[R] {
        &self.resources
    }

    pub fn all_shards_mut(&mut self) -> &mut [R] {
        &mut self.resources
    }

    pub fn all_shard_info(&self) -> &[ShardDescriptor] {
        self.ring.shards()
    }

    pub fn shard_count(&self) -> usize {
        self.resources.len()
    }

    pub fn ring(&self) -> &ShardRing {
        &self.ring
    }
}

impl Sharded<Connection> {
    /// Builds the router without touching the network.
    pub fn new(config: &RouterConfig) -> Result<Self, ConfigError> {
        let ring = ShardRing::from_config(config)?;
        let pipelining = config.pipelining;
        Ok(Self::with_resources(ring, |shard| {
            let mut conn = Connection::new(shard.clone());
            conn.set_pipelining(pipelining);
            conn
        }))
    }

    /// Builds the router and connects every shard.
    pub fn connect(config: &RouterConfig) -> Result<Self, RouterError> {
        let mut router = Self::new(config)?;
        router.connect_all()?;
        Ok(router)
    }

    /// Connects every shard, stopping at the first failure.
    pub fn connect_all(&mut self) -> Result<(), RouterError> {
        for conn in &mut self.resources {
            conn.connect()
                .map_err(|e| RouterError::shard(conn.shard(), None, e))?;
        }
        Ok(())
    }

    /// Closes every shard connection.
    pub fn disconnect_all(&mut self) {
        for conn in &mut self.resources {
            conn.disconnect();
        }
    }

    /// Runs `command` on the shard that owns `key`.
    pub fn execute(&mut self, key: &[u8], command: &Command) -> Result<Reply, RouterError> {
        let index = self.ring.shard_index(key);
        let conn = &mut self.resources[index];
        debug!(shard = %conn.shard().label(), verb = %command.verb(), "Routing command");
        conn.execute(command)
            .map_err(|e| RouterError::shard(conn.shard(), Some(command.verb()), e))
    }
}

impl Sharded<AsyncConnection> {
    /// Builds the router without touching the network.
    pub fn new(config: &RouterConfig) -> Result<Self, ConfigError> {
        let ring = ShardRing::from_config(config)?;
        let pipelining = config.pipelining;
        let capacity = config.reply_queue_capacity;
        Ok(Self::with_resources(ring, |shard| {
            let mut conn =
                AsyncConnection::new(shard.clone()).with_reply_queue_capacity(capacity);
            conn.set_pipelining(pipelining);
            conn
        }))
    }

    /// Builds the router and connects every shard.
    pub async fn connect(config: &RouterConfig) -> Result<Self, RouterError> {
        let mut router = Self::new(config)?;
        router.connect_all().await?;
        Ok(router)
    }

    /// Connects every shard, stopping at the first failure.
    pub async fn connect_all(&mut self) -> Result<(), RouterError> {
        for conn in &mut self.resources {
            if let Err(e) = conn.connect().await {
                return Err(RouterError::shard(conn.shard(), None, e));
            }
        }
        Ok(())
    }

    /// Closes every shard connection.
    pub async fn disconnect_all(&mut self) {
        for conn in &mut self.resources {
            conn.disconnect().await;
        }
    }

    /// Runs `command` on the shard that owns `key`.
    pub async fn execute(&mut self, key: &[u8], command: &Command) -> Result<Reply, RouterError> {
        let index = self.ring.shard_index(key);
        let conn = &mut self.resources[index];
        debug!(shard = %conn.shard().label(), verb = %command.verb(), "Routing command");
        match conn.execute(command).await {
            Ok(reply) => Ok(reply),
            Err(e) => Err(RouterError::shard(conn.shard(), Some(command.verb()), e)),
        }
    }
}
