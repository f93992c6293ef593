//! Cueball Core: Hash-Indexed, Versioned Partition Storage
//!
//! Cueball stores the immutable key/value contents of one partition of a
//! domain per version, in two files built once and then only read:
//!
//! - **Index**: digests sorted ascending, grouped into `2^index_bits` buckets
//!   by their leading bits, with a bucket directory for O(1) range lookup
//! - **Data**: one checksummed, optionally compressed block per value
//!
//! # Architecture
//!
//! - **Write path**: digest-sorted entries stream through a [`CueballWriter`]
//!   into an [`OutputTarget`], normally a [`StagingArea`]
//! - **Promotion**: a whole version becomes visible through one directory
//!   rename ([`StagingArea::promote`])
//! - **Read path**: [`CueballReader`] maps both files read-only; any number of
//!   threads look up keys without locking, optionally through a
//!   [`SynchronizedCache`]
//!
//! Keys are never stored, only their digests. Distinct keys with equal
//! digests cannot be told apart; the first entry in index order wins.

pub mod cache;
pub mod codec;
pub mod config;
pub mod cueball;
pub mod durability;
pub mod error;
pub mod format;
pub mod hasher;
pub mod output;
pub mod partitioner;
pub mod reader;
pub mod staging;
pub mod storage;
pub mod writer;

// Re-export key types for convenience
pub use cache::SynchronizedCache;
pub use codec::{CodecKind, CompressionCodec, NoCompressionCodec, ZstdCodec};
pub use config::DomainConfig;
pub use cueball::{file_stem, version_dir, Cueball};
pub use error::{CueballError, CueballResult};
pub use hasher::{Hasher, HasherKind, IdentityHasher, Murmur64Hasher};
pub use output::{LocalOutputTarget, MemoryOutputTarget, OutputStream, OutputTarget};
pub use partitioner::{ModPartitioner, Murmur64Partitioner, Partitioner, PartitionerKind};
pub use reader::{CueballReader, ReaderResult};
pub use staging::StagingArea;
pub use storage::{build_storage_engine, Reader, StorageEngine, StorageEngineKind, Writer};
pub use writer::{CueballWriter, WriterStats};
