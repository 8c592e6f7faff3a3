//! MD5-based hash strategy.
//!
//! Uses the first four bytes of the digest as a little-endian integer, so ring
//! positions fall in `0..2^32`. Slower than Murmur, but places keys the same way
//! as other clients that shard with MD5.

use super::HashStrategy;
use ::md5::{Digest, Md5};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Md5Hash;

impl HashStrategy for Md5Hash {
    fn hash(&self, key: &[u8]) -> u64 {
        let digest = Md5::digest(key);
        u64::from(u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(Md5Hash.hash(b""), 0xd98c_1dd4);
        assert_eq!(Md5Hash.hash(b"a"), 0xb975_c10c);
        assert_eq!(Md5Hash.hash(b"hello"), 0x2a40_415d);
    }

    #[test]
    fn test_fits_in_32_bits() {
        for key in [&b"x"[..], b"user:1000", b"\x00\xff"] {
            assert!(Md5Hash.hash(key) <= u64::from(u32::MAX));
        }
    }
}
