//! The Cueball storage engine
//!
//! `Cueball` binds a validated [`DomainConfig`] to its hasher, partitioner
//! and codec, hands out writers for any output target, and opens readers on
//! promoted versions below the domain root.
//!
//! Promoted layout:
//!
//! ```text
//! <root>/v<version>/<partition>/<version:05>.base.cueball.index
//! <root>/v<version>/<partition>/<version:05>.base.cueball.data
//! ```
//!
//! Delta versions use `delta` in place of `base`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::CompressionCodec;
use crate::config::DomainConfig;
use crate::error::{CueballError, CueballResult};
use crate::hasher::Hasher;
use crate::output::{partition_dir, OutputTarget};
use crate::partitioner::Partitioner;
use crate::reader::{CueballReader, ReaderResult};
use crate::storage::{Reader, StorageEngine, StorageEngineKind, Writer};
use crate::writer::{CueballWriter, WriterStats};

/// File name stem shared by the index and data file of one version.
pub fn file_stem(version: u32, is_base: bool) -> String {
    format!("{:05}.{}.cueball", version, if is_base { "base" } else { "delta" })
}

/// Directory of a promoted version below the domain root.
pub fn version_dir(root: &Path, version: u32) -> PathBuf {
    root.join(format!("v{}", version))
}

/// Cueball engine for one domain.
#[derive(Clone)]
pub struct Cueball {
    config: DomainConfig,
    root: PathBuf,
    hasher: Arc<dyn Hasher>,
    partitioner: Arc<dyn Partitioner>,
    codec: Arc<dyn CompressionCodec>,
}

impl Cueball {
    /// Engine for the domain rooted at `root`. The root need not exist yet.
    pub fn new<P: AsRef<Path>>(config: DomainConfig, root: P) -> CueballResult<Self> {
        config.validate()?;
        Ok(Self {
            hasher: Arc::from(config.hasher.build()),
            partitioner: Arc::from(config.partitioner.build()),
            codec: Arc::from(config.codec.build(config.compression_level)),
            root: root.as_ref().to_path_buf(),
            config,
        })
    }

    /// Engine from a string option mapping (see [`DomainConfig::from_options`]).
    pub fn from_options(options: &BTreeMap<String, String>, root: &Path) -> CueballResult<Self> {
        Self::new(DomainConfig::from_options(options)?, root)
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Partition owning `key`.
    pub fn partition_of(&self, key: &[u8]) -> u32 {
        self.partitioner.partition(key, self.config.num_partitions)
    }

    /// Domain digest of `key`.
    pub fn hash(&self, key: &[u8]) -> Vec<u8> {
        let mut digest = vec![0u8; self.config.hash_length];
        self.hasher.hash(key, &mut digest);
        digest
    }

    /// Writer for `(partition, version)` streaming into `target`.
    pub fn open_writer(
        &self,
        target: &dyn OutputTarget,
        partition: u32,
        version: u32,
        is_base: bool,
    ) -> CueballResult<CueballWriter> {
        CueballWriter::new(
            &self.config,
            Arc::clone(&self.hasher),
            Arc::clone(&self.codec),
            target,
            partition,
            version,
            is_base,
        )
    }

    /// Reader for a promoted `(partition, version)`, base files first.
    pub fn open_reader(&self, partition: u32, version: u32) -> CueballResult<CueballReader> {
        if partition >= self.config.num_partitions {
            return Err(CueballError::PartitionOutOfRange {
                partition,
                num_partitions: self.config.num_partitions,
            });
        }

        let dir = partition_dir(&version_dir(&self.root, version), partition);
        for is_base in [true, false] {
            let stem = file_stem(version, is_base);
            let index_path = dir.join(format!("{}.index", stem));
            if index_path.is_file() {
                let data_path = dir.join(format!("{}.data", stem));
                return CueballReader::open(
                    &self.config,
                    Arc::clone(&self.hasher),
                    Arc::clone(&self.codec),
                    &index_path,
                    &data_path,
                );
            }
        }
        Err(CueballError::VersionNotFound { path: dir, version })
    }
}

impl std::fmt::Debug for Cueball {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cueball")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish()
    }
}

impl StorageEngine for Cueball {
    fn writer(
        &self,
        target: &dyn OutputTarget,
        partition: u32,
        version: u32,
        is_base: bool,
    ) -> CueballResult<Box<dyn Writer>> {
        Ok(Box::new(self.open_writer(target, partition, version, is_base)?))
    }

    fn reader(&self, partition: u32, version: u32) -> CueballResult<Box<dyn Reader>> {
        Ok(Box::new(self.open_reader(partition, version)?))
    }

    fn kind(&self) -> StorageEngineKind {
        StorageEngineKind::Cueball
    }
}

impl Writer for CueballWriter {
    fn write(&mut self, key: &[u8], value: &[u8]) -> CueballResult<()> {
        CueballWriter::write(self, key, value)
    }

    fn write_hash(&mut self, digest: &[u8], value: &[u8]) -> CueballResult<()> {
        CueballWriter::write_hash(self, digest, value)
    }

    fn close(self: Box<Self>) -> CueballResult<WriterStats> {
        CueballWriter::close(*self)
    }
}

impl Reader for CueballReader {
    fn get(&self, key: &[u8], result: &mut ReaderResult) -> CueballResult<()> {
        CueballReader::get(self, key, result)
    }
}
