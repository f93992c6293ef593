//! Key hashing
//!
//! A [`Hasher`] turns an arbitrary-length key into a fixed-length digest. The
//! digest is both the sort key of a Cueball index and the source of its bucket
//! bits, so every implementation must be pure and stable across runs, builds
//! and platforms.

use crate::error::{CueballError, CueballResult};

/// MurmurHash64A multiplier
const MURMUR_M: u64 = 0xc6a4a7935bd1e995;

/// MurmurHash64A shift
const MURMUR_R: u32 = 47;

/// Seed used for the first 8 digest bytes and by the Murmur64 partitioner
pub const MURMUR_SEED: u64 = 1;

/// Maps a key to a fixed-length digest.
pub trait Hasher: Send + Sync {
    /// Fill `digest` (its length is the output length) from `key`.
    fn hash(&self, key: &[u8], digest: &mut [u8]);

    /// Kind tag of this implementation.
    fn kind(&self) -> HasherKind;
}

/// 64-bit MurmurHash (variant 64A, little-endian block reads).
pub fn murmur_hash64(data: &[u8], seed: u64) -> u64 {
    let len = data.len();
    let mut h = seed ^ (len as u64).wrapping_mul(MURMUR_M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes([
            chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
        ]);
        k = k.wrapping_mul(MURMUR_M);
        k ^= k >> MURMUR_R;
        k = k.wrapping_mul(MURMUR_M);

        h ^= k;
        h = h.wrapping_mul(MURMUR_M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, byte) in tail.iter().enumerate() {
            h ^= (*byte as u64) << (8 * i);
        }
        h = h.wrapping_mul(MURMUR_M);
    }

    h ^= h >> MURMUR_R;
    h = h.wrapping_mul(MURMUR_M);
    h ^= h >> MURMUR_R;
    h
}

/// Murmur64 digest of any length.
///
/// The first 8 bytes are `murmur_hash64(key, 1)` in big-endian order; each
/// following 8-byte group is seeded with the previous group's hash. Big-endian
/// emission keeps the leading digest bytes (the bucket bits) equal to the
/// high bits of the first hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur64Hasher;

impl Hasher for Murmur64Hasher {
    fn hash(&self, key: &[u8], digest: &mut [u8]) {
        let mut seed = MURMUR_SEED;
        for group in digest.chunks_mut(8) {
            let h = murmur_hash64(key, seed);
            group.copy_from_slice(&h.to_be_bytes()[..group.len()]);
            seed = h;
        }
    }

    fn kind(&self) -> HasherKind {
        HasherKind::Murmur64
    }
}

/// Uses the key itself as its digest: truncated when longer than the digest,
/// zero-padded on the right when shorter. For keys that are already uniformly
/// distributed hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl Hasher for IdentityHasher {
    fn hash(&self, key: &[u8], digest: &mut [u8]) {
        let n = key.len().min(digest.len());
        digest[..n].copy_from_slice(&key[..n]);
        digest[n..].fill(0);
    }

    fn kind(&self) -> HasherKind {
        HasherKind::Identity
    }
}

/// Registered hasher implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HasherKind {
    /// [`Murmur64Hasher`]
    Murmur64,
    /// [`IdentityHasher`]
    Identity,
}

impl HasherKind {
    /// Resolve a configuration name.
    pub fn from_name(name: &str) -> CueballResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "murmur64" => Ok(HasherKind::Murmur64),
            "identity" => Ok(HasherKind::Identity),
            _ => Err(CueballError::UnknownIdentifier {
                component: "hasher",
                name: name.to_string(),
            }),
        }
    }

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            HasherKind::Murmur64 => "murmur64",
            HasherKind::Identity => "identity",
        }
    }

    /// Instantiate the implementation.
    pub fn build(&self) -> Box<dyn Hasher> {
        match self {
            HasherKind::Murmur64 => Box::new(Murmur64Hasher),
            HasherKind::Identity => Box::new(IdentityHasher),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(hasher: &dyn Hasher, key: &[u8], len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        hasher.hash(key, &mut out);
        out
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_murmur_reference_values() {
        assert_eq!(murmur_hash64(b"", 1), 0xc6a4a7935bd064dc);
        assert_eq!(murmur_hash64(b"a", 1), 0xa52be5b3f6674b2a);
        assert_eq!(murmur_hash64(b"hello", 1), 0x530a1bd8a612eb4e);
        assert_eq!(murmur_hash64(b"hello world", 1), 0x26487f815882e16d);
        assert_eq!(murmur_hash64(b"0123456789abcdef", 1), 0x80b0ccb48691679e);
    }

    #[test]
    fn test_murmur_digest_lengths() {
        let h = Murmur64Hasher;
        assert_eq!(hex(&digest(&h, b"hello", 10)), "530a1bd8a612eb4edbbb");
        assert_eq!(
            hex(&digest(&h, b"hello world", 20)),
            "26487f815882e16d61af3007d66bb5a373a5c1b5"
        );
        assert_eq!(hex(&digest(&h, b"a", 3)), "a52be5");
    }

    #[test]
    fn test_murmur_is_deterministic() {
        let h = Murmur64Hasher;
        let a = digest(&h, b"some key", 16);
        let b = digest(&h, b"some key", 16);
        assert_eq!(a, b);
        assert_ne!(a, digest(&h, b"some kez", 16));
    }

    #[test]
    fn test_identity_truncates_and_pads() {
        let h = IdentityHasher;
        assert_eq!(digest(&h, b"abcdef", 4), b"abcd");
        assert_eq!(digest(&h, b"ab", 4), b"ab\0\0");
    }

    #[test]
    fn test_kind_registry() {
        assert_eq!(HasherKind::from_name("Murmur64").unwrap(), HasherKind::Murmur64);
        assert_eq!(HasherKind::from_name(" identity ").unwrap(), HasherKind::Identity);
        assert!(matches!(
            HasherKind::from_name("md5"),
            Err(CueballError::UnknownIdentifier { component: "hasher", .. })
        ));
        for kind in [HasherKind::Murmur64, HasherKind::Identity] {
            assert_eq!(kind.build().kind(), kind);
            assert_eq!(HasherKind::from_name(kind.name()).unwrap(), kind);
        }
    }
}
