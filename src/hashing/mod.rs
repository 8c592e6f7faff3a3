//! Hash Strategies for Shard Placement
//!
//! The shard ring only needs one thing from a hash function: a 64-bit value for
//! an arbitrary byte string. Keeping that behind a trait means the ring and the
//! key-tag logic never depend on a concrete algorithm.
//!
//! Two strategies are provided:
//!
//! - [`MurmurHash`]: MurmurHash64A, fast and non-cryptographic (the default)
//! - [`Md5Hash`]: the first four bytes of an MD5 digest, little-endian
//!
//! Both are stateless and safe to share across threads.

pub mod md5;
pub mod murmur;

pub use self::md5::Md5Hash;
pub use self::murmur::MurmurHash;

/// Maps bytes to a 64-bit ring position.
pub trait HashStrategy: Send + Sync {
    fn hash(&self, key: &[u8]) -> u64;
}

/// Configuration-level choice of hash strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// MurmurHash64A
    #[default]
    Murmur,
    /// MD5 digest, truncated
    Md5,
}

impl HashStrategy for HashAlgorithm {
    fn hash(&self, key: &[u8]) -> u64 {
        match self {
            HashAlgorithm::Murmur => MurmurHash.hash(key),
            HashAlgorithm::Md5 => Md5Hash.hash(key),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "murmur" | "murmur64" => Ok(HashAlgorithm::Murmur),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(format!("unknown hash algorithm: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_dispatch() {
        assert_eq!(HashAlgorithm::Murmur.hash(b"key"), MurmurHash.hash(b"key"));
        assert_eq!(HashAlgorithm::Md5.hash(b"key"), Md5Hash.hash(b"key"));
    }

    #[test]
    fn test_strategies_are_interchangeable() {
        let strategies: Vec<Box<dyn HashStrategy>> = vec![Box::new(MurmurHash), Box::new(Md5Hash)];
        for strategy in &strategies {
            assert_eq!(strategy.hash(b"same"), strategy.hash(b"same"));
            assert_ne!(strategy.hash(b"one"), strategy.hash(b"two"));
        }
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("MD5".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Md5));
        assert_eq!("murmur".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Murmur));
        assert!("sha1".parse::<HashAlgorithm>().is_err());
    }
}
