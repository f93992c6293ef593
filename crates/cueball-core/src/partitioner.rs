//! Key-to-partition assignment
//!
//! The partitioner used to write a domain must be the one used to route reads
//! to it: a key written to partition 3 and looked up in partition 5 is simply
//! lost. Reduction laws here are therefore part of the on-disk contract.

use crate::error::{CueballError, CueballResult};
use crate::hasher::{murmur_hash64, MURMUR_SEED};

/// Maps a key to a partition in `[0, num_partitions)`.
pub trait Partitioner: Send + Sync {
    /// Partition of `key`. `num_partitions` must be at least 1.
    fn partition(&self, key: &[u8], num_partitions: u32) -> u32;

    /// Kind tag of this implementation.
    fn kind(&self) -> PartitionerKind;
}

/// Partition = `|(i32) murmur_hash64(key, 1)| mod num_partitions`.
///
/// The 64-bit hash is truncated to its low 32 bits as a signed integer and the
/// absolute value is taken in 64-bit arithmetic, so `i32::MIN` maps to
/// `2^31 mod n` instead of overflowing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Murmur64Partitioner;

impl Partitioner for Murmur64Partitioner {
    fn partition(&self, key: &[u8], num_partitions: u32) -> u32 {
        let truncated = murmur_hash64(key, MURMUR_SEED) as i32;
        ((truncated as i64).unsigned_abs() % num_partitions.max(1) as u64) as u32
    }

    fn kind(&self) -> PartitionerKind {
        PartitionerKind::Murmur64
    }
}

/// Partition = leading 8 key bytes (zero-padded) as a big-endian integer,
/// modulo `num_partitions`. Suited to keys that are already hashes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModPartitioner;

impl Partitioner for ModPartitioner {
    fn partition(&self, key: &[u8], num_partitions: u32) -> u32 {
        let mut prefix = [0u8; 8];
        let n = key.len().min(8);
        prefix[..n].copy_from_slice(&key[..n]);
        (u64::from_be_bytes(prefix) % num_partitions.max(1) as u64) as u32
    }

    fn kind(&self) -> PartitionerKind {
        PartitionerKind::Mod
    }
}

/// Registered partitioner implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionerKind {
    /// [`Murmur64Partitioner`]
    Murmur64,
    /// [`ModPartitioner`]
    Mod,
}

impl PartitionerKind {
    /// Resolve a configuration name.
    pub fn from_name(name: &str) -> CueballResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "murmur64" => Ok(PartitionerKind::Murmur64),
            "mod" => Ok(PartitionerKind::Mod),
            _ => Err(CueballError::UnknownIdentifier {
                component: "partitioner",
                name: name.to_string(),
            }),
        }
    }

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            PartitionerKind::Murmur64 => "murmur64",
            PartitionerKind::Mod => "mod",
        }
    }

    /// Instantiate the implementation.
    pub fn build(&self) -> Box<dyn Partitioner> {
        match self {
            PartitionerKind::Murmur64 => Box::new(Murmur64Partitioner),
            PartitionerKind::Mod => Box::new(ModPartitioner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur_partition_reference_values() {
        let p = Murmur64Partitioner;
        assert_eq!(p.partition(b"hello", 4), 2);
        assert_eq!(p.partition(b"hello", 7), 2);
        assert_eq!(p.partition(b"hello", 1024), 178);
        assert_eq!(p.partition(b"hello world", 4), 1);
        assert_eq!(p.partition(b"hello world", 7), 6);
        assert_eq!(p.partition(b"a", 1024), 214);
        assert_eq!(p.partition(b"", 1024), 220);
    }

    #[test]
    fn test_partition_always_in_range() {
        let p = Murmur64Partitioner;
        for n in [1u32, 2, 3, 16, 1000] {
            for i in 0u32..500 {
                let key = i.to_le_bytes();
                assert!(p.partition(&key, n) < n);
            }
        }
    }

    #[test]
    fn test_single_partition() {
        assert_eq!(Murmur64Partitioner.partition(b"anything", 1), 0);
        assert_eq!(ModPartitioner.partition(b"anything", 1), 0);
    }

    #[test]
    fn test_mod_partitioner() {
        let p = ModPartitioner;
        assert_eq!(p.partition(&[0, 0, 0, 0, 0, 0, 0, 10], 4), 2);
        assert_eq!(p.partition(&[0, 0, 0, 0, 0, 0, 0, 10, 0xff], 4), 2);
        // Short keys are padded on the right
        assert_eq!(p.partition(&[1], 3), ((1u64 << 56) % 3) as u32);
    }

    #[test]
    fn test_kind_registry() {
        assert_eq!(PartitionerKind::from_name("MOD").unwrap(), PartitionerKind::Mod);
        assert!(matches!(
            PartitionerKind::from_name("ring"),
            Err(CueballError::UnknownIdentifier { component: "partitioner", .. })
        ));
        for kind in [PartitionerKind::Murmur64, PartitionerKind::Mod] {
            assert_eq!(kind.build().kind(), kind);
        }
    }
}
