//! Domain configuration for Cueball
//!
//! A domain's shape (digest length, value length, index bits, partition count)
//! and its pluggable components are fixed when the domain is created. Every
//! writer and reader of the domain must be built from an equal configuration.

use std::collections::BTreeMap;

use crate::codec::{CodecKind, DEFAULT_ZSTD_LEVEL};
use crate::error::{CueballError, CueballResult};
use crate::format::OFFSET_WIDTH;
use crate::hasher::HasherKind;
use crate::partitioner::PartitionerKind;

/// Largest supported digest length in bytes
pub const MAX_HASH_LENGTH: usize = 64;

/// Largest supported uncompressed value length (16MB)
pub const MAX_VALUE_LENGTH: usize = 16 * 1024 * 1024;

/// Largest supported number of index bits (16M buckets, 128MB directory)
pub const MAX_INDEX_BITS: u8 = 24;

/// Cueball domain configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    /// Digest length in bytes
    pub hash_length: usize,
    /// Uncompressed value length in bytes
    pub value_length: usize,
    /// Number of leading digest bits selecting an index bucket
    pub index_bits: u8,
    /// Number of partitions in the domain
    pub num_partitions: u32,
    /// Value codec
    pub codec: CodecKind,
    /// Compression level handed to the codec (zstd only)
    pub compression_level: i32,
    /// Key hasher
    pub hasher: HasherKind,
    /// Key partitioner
    pub partitioner: PartitionerKind,
    /// Reader cache capacity in entries; 0 disables the cache
    pub cache_capacity: usize,
}

impl DomainConfig {
    /// Explicit shape with Murmur64 hashing/partitioning, no compression, no cache.
    pub fn new(hash_length: usize, value_length: usize, index_bits: u8, num_partitions: u32) -> Self {
        Self {
            hash_length,
            value_length,
            index_bits,
            num_partitions,
            codec: CodecKind::None,
            compression_level: DEFAULT_ZSTD_LEVEL,
            hasher: HasherKind::Murmur64,
            partitioner: PartitionerKind::Murmur64,
            cache_capacity: 0,
        }
    }

    /// Small domain: 8-byte digests, 16-byte values, 16 buckets, 4 partitions.
    pub fn small() -> Self {
        Self::new(8, 16, 4, 4)
    }

    /// Production-sized domain: 10-byte digests, 64KB buckets, zstd values.
    pub fn standard(value_length: usize, num_partitions: u32) -> Self {
        Self::new(10, value_length, 16, num_partitions).with_codec(CodecKind::Zstd)
    }

    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_hasher(mut self, hasher: HasherKind) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_partitioner(mut self, partitioner: PartitionerKind) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Number of index buckets (`2^index_bits`).
    pub fn num_buckets(&self) -> usize {
        1usize << self.index_bits
    }

    /// Bytes per index entry: digest plus data offset.
    pub fn entry_stride(&self) -> usize {
        self.hash_length + OFFSET_WIDTH
    }

    /// Build from a string option mapping.
    ///
    /// Required keys: `hash_length`, `value_length`, `index_bits`,
    /// `num_partitions`. Optional: `compression_codec`, `compression_level`,
    /// `hasher`, `partitioner`, `cache_capacity`. Unknown keys are rejected.
    pub fn from_options(options: &BTreeMap<String, String>) -> CueballResult<Self> {
        const KNOWN: [&str; 9] = [
            "hash_length",
            "value_length",
            "index_bits",
            "num_partitions",
            "compression_codec",
            "compression_level",
            "hasher",
            "partitioner",
            "cache_capacity",
        ];
        if let Some(unknown) = options.keys().find(|k| !KNOWN.contains(&k.as_str())) {
            return Err(CueballError::InvalidConfig {
                reason: format!("unknown option '{}'", unknown),
            });
        }

        let mut config = Self::new(
            required(options, "hash_length")?,
            required(options, "value_length")?,
            required(options, "index_bits")?,
            required(options, "num_partitions")?,
        );
        if let Some(name) = options.get("compression_codec") {
            config.codec = CodecKind::from_name(name)?;
        }
        if let Some(level) = optional::<i32>(options, "compression_level")? {
            config.compression_level = level;
        }
        if let Some(name) = options.get("hasher") {
            config.hasher = HasherKind::from_name(name)?;
        }
        if let Some(name) = options.get("partitioner") {
            config.partitioner = PartitionerKind::from_name(name)?;
        }
        if let Some(capacity) = optional::<usize>(options, "cache_capacity")? {
            config.cache_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> CueballResult<()> {
        let invalid = |reason: String| Err(CueballError::InvalidConfig { reason });

        if self.hash_length == 0 || self.hash_length > MAX_HASH_LENGTH {
            return invalid(format!("hash_length must be in [1, {}]", MAX_HASH_LENGTH));
        }
        if self.value_length == 0 || self.value_length > MAX_VALUE_LENGTH {
            return invalid(format!("value_length must be in [1, {}]", MAX_VALUE_LENGTH));
        }
        let max_bits = (MAX_INDEX_BITS as usize).min(8 * self.hash_length);
        if self.index_bits as usize > max_bits {
            return invalid(format!(
                "index_bits must be <= {} for hash_length {}",
                max_bits, self.hash_length
            ));
        }
        if self.num_partitions == 0 {
            return invalid("num_partitions must be > 0".into());
        }
        if self.codec == CodecKind::Zstd && !(1..=22).contains(&self.compression_level) {
            return invalid("compression_level must be in [1, 22] for zstd".into());
        }
        Ok(())
    }

    /// Check that data written under `self` can be read under `other`.
    pub fn check_compatible(&self, other: &DomainConfig) -> CueballResult<()> {
        let fields: [(&str, bool); 7] = [
            ("hash_length", self.hash_length == other.hash_length),
            ("value_length", self.value_length == other.value_length),
            ("index_bits", self.index_bits == other.index_bits),
            ("num_partitions", self.num_partitions == other.num_partitions),
            ("compression_codec", self.codec == other.codec),
            ("hasher", self.hasher == other.hasher),
            ("partitioner", self.partitioner == other.partitioner),
        ];
        match fields.iter().find(|(_, equal)| !equal) {
            Some((field, _)) => Err(CueballError::InvalidConfig {
                reason: format!("domain configurations disagree on {}", field),
            }),
            None => Ok(()),
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self { Self::small() }
}

fn required<T: std::str::FromStr>(options: &BTreeMap<String, String>, key: &str) -> CueballResult<T> {
    optional(options, key)?.ok_or_else(|| CueballError::InvalidConfig {
        reason: format!("missing required option '{}'", key),
    })
}

fn optional<T: std::str::FromStr>(options: &BTreeMap<String, String>, key: &str) -> CueballResult<Option<T>> {
    match options.get(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| CueballError::InvalidConfig {
            reason: format!("option '{}' has invalid value '{}'", key, raw),
        }),
    }
}
