//! MurmurHash64A
//!
//! Austin Appleby's 64-bit MurmurHash2 variant, reading input as little-endian
//! 8-byte words. Public domain algorithm.

use super::HashStrategy;

const M: u64 = 0xc6a4_a793_5bd1_e995;
const R: u32 = 47;

/// Seed used for ring placement.
pub const DEFAULT_SEED: u32 = 0xe17a_1465;

/// MurmurHash64A with [`DEFAULT_SEED`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MurmurHash;

impl MurmurHash {
    /// Hashes `data` with an explicit seed.
    pub fn hash_with_seed(data: &[u8], seed: u32) -> u64 {
        let mut h = u64::from(seed) ^ (data.len() as u64).wrapping_mul(M);

        let mut chunks = data.chunks_exact(8);
        for chunk in &mut chunks {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            let mut k = u64::from_le_bytes(word);

            k = k.wrapping_mul(M);
            k ^= k >> R;
            k = k.wrapping_mul(M);

            h ^= k;
            h = h.wrapping_mul(M);
        }

        let tail = chunks.remainder();
        if !tail.is_empty() {
            for (i, &byte) in tail.iter().enumerate().rev() {
                h ^= u64::from(byte) << (8 * i);
            }
            h = h.wrapping_mul(M);
        }

        h ^= h >> R;
        h = h.wrapping_mul(M);
        h ^= h >> R;
        h
    }
}

impl HashStrategy for MurmurHash {
    fn hash(&self, key: &[u8]) -> u64 {
        Self::hash_with_seed(key, DEFAULT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(MurmurHash.hash(b""), 0x9bfa_e0a4_e613_fc3c);
        assert_eq!(MurmurHash.hash(b"a"), 0x081c_cc83_1546_66a7);
        assert_eq!(MurmurHash.hash(b"hello"), 0xc656_272f_1aa3_2ab5);
        assert_eq!(MurmurHash.hash(b"12345678"), 0x0f96_dc47_4f19_b994);
        assert_eq!(MurmurHash.hash(b"shard key tag!"), 0x34a6_fbfa_1365_753e);
    }

    #[test]
    fn test_seed_changes_output() {
        assert_ne!(
            MurmurHash::hash_with_seed(b"hello", 1),
            MurmurHash::hash_with_seed(b"hello", 2)
        );
    }
}
