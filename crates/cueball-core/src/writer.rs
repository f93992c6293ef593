//! Cueball writer
//!
//! Streams one (partition, version) into an index file and a data file.
//! Entries must arrive in non-decreasing digest order; the writer trusts its
//! caller and never sorts or checks. Out-of-order input cannot crash the
//! writer or a later reader, but some of the misplaced keys will not be found.

use std::io::{BufWriter, Write};
use std::sync::Arc;

use tracing::debug;

use crate::codec::CompressionCodec;
use crate::config::DomainConfig;
use crate::error::{CueballError, CueballResult};
use crate::format::{
    block_header, bucket_of, data_header, IndexFooter, IndexHeader, BLOCK_HEADER_SIZE,
    DATA_HEADER_SIZE, FLAG_BASE, INDEX_FOOTER_SIZE, INDEX_HEADER_SIZE, OFFSET_WIDTH,
};
use crate::hasher::Hasher;
use crate::output::{OutputStream, OutputTarget};

/// Write buffer size for both output streams (1MB)
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Summary of a closed writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    /// Entries written
    pub entries: u64,
    /// Buckets holding at least one entry
    pub non_empty_buckets: u64,
    /// Total index file size in bytes
    pub index_bytes: u64,
    /// Total data file size in bytes
    pub data_bytes: u64,
}

/// Writes a single partition of a single version.
pub struct CueballWriter {
    partition: u32,
    version: u32,
    hash_length: usize,
    value_length: usize,
    index_bits: u8,
    hasher: Arc<dyn Hasher>,
    codec: Arc<dyn CompressionCodec>,
    index: BufWriter<Box<dyn OutputStream>>,
    data: BufWriter<Box<dyn OutputStream>>,
    /// directory[b] = position of the first entry of bucket b
    directory: Vec<u64>,
    current_bucket: usize,
    non_empty_buckets: u64,
    entries: u64,
    data_offset: u64,
    digest: Vec<u8>,
    compressed: Vec<u8>,
    /// Set once a write fails part-way; the output is unusable from then on
    failed: bool,
}

impl CueballWriter {
    /// Open the index and data streams of `(partition, version)` on `target`.
    pub fn new(
        config: &DomainConfig,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn CompressionCodec>,
        target: &dyn OutputTarget,
        partition: u32,
        version: u32,
        is_base: bool,
    ) -> CueballResult<Self> {
        config.validate()?;
        if partition >= config.num_partitions {
            return Err(CueballError::PartitionOutOfRange {
                partition,
                num_partitions: config.num_partitions,
            });
        }

        let stem = crate::cueball::file_stem(version, is_base);
        let index_stream = target.output_stream(partition, &format!("{}.index", stem))?;
        let data_stream = target.output_stream(partition, &format!("{}.data", stem))?;

        let mut index = BufWriter::with_capacity(WRITE_BUFFER_SIZE, index_stream);
        let mut data = BufWriter::with_capacity(WRITE_BUFFER_SIZE, data_stream);

        let header = IndexHeader {
            hash_length: config.hash_length as u16,
            index_bits: config.index_bits,
            offset_width: OFFSET_WIDTH as u8,
            codec: codec.kind().tag(),
            flags: if is_base { FLAG_BASE } else { 0 },
            entry_stride: config.entry_stride() as u32,
            value_length: config.value_length as u32,
        };
        index.write_all(&header.to_bytes())?;
        data.write_all(&data_header())?;

        Ok(Self {
            partition,
            version,
            hash_length: config.hash_length,
            value_length: config.value_length,
            index_bits: config.index_bits,
            hasher,
            codec,
            index,
            data,
            directory: vec![0u64; config.num_buckets() + 1],
            current_bucket: 0,
            non_empty_buckets: 0,
            entries: 0,
            data_offset: DATA_HEADER_SIZE as u64,
            digest: vec![0u8; config.hash_length],
            compressed: Vec::with_capacity(config.value_length + BLOCK_HEADER_SIZE),
            failed: false,
        })
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Hash `key` with the domain hasher and write it.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> CueballResult<()> {
        let mut digest = std::mem::take(&mut self.digest);
        self.hasher.hash(key, &mut digest);
        let result = self.write_hash(&digest, value);
        self.digest = digest;
        result
    }

    /// Whether an earlier write failed. A failed writer rejects every further
    /// write and refuses to close.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    fn ensure_healthy(&self) -> CueballResult<()> {
        if self.failed {
            return Err(CueballError::WriterFailed {
                partition: self.partition,
                version: self.version,
            });
        }
        Ok(())
    }

    /// Write a value under a precomputed digest.
    ///
    /// Length errors leave the writer usable. Any codec or I/O error may leave
    /// a partial block behind and fails the writer.
    pub fn write_hash(&mut self, digest: &[u8], value: &[u8]) -> CueballResult<()> {
        self.ensure_healthy()?;
        if digest.len() != self.hash_length {
            return Err(CueballError::DigestLength {
                expected: self.hash_length,
                actual: digest.len(),
            });
        }
        if value.len() != self.value_length {
            return Err(CueballError::ValueLength {
                expected: self.value_length,
                actual: value.len(),
            });
        }

        let offset = self.data_offset;
        if let Err(e) = self.append_block(value) {
            self.failed = true;
            return Err(e);
        }

        // Buckets only move forward. An out-of-order digest for an earlier
        // bucket is appended to the current bucket, where lookups cannot find it.
        let bucket = bucket_of(digest, self.index_bits);
        if bucket > self.current_bucket || self.entries == 0 {
            for position in &mut self.directory[self.current_bucket + 1..=bucket] {
                *position = self.entries;
            }
            self.current_bucket = self.current_bucket.max(bucket);
            self.non_empty_buckets += 1;
        }

        if let Err(e) = self.append_entry(digest, offset) {
            self.failed = true;
            return Err(e);
        }
        self.entries += 1;
        Ok(())
    }

    fn append_block(&mut self, value: &[u8]) -> CueballResult<()> {
        self.compressed.clear();
        self.codec.compress(value, &mut self.compressed)?;
        self.data.write_all(&block_header(&self.compressed))?;
        self.data.write_all(&self.compressed)?;
        self.data_offset += (BLOCK_HEADER_SIZE + self.compressed.len()) as u64;
        Ok(())
    }

    fn append_entry(&mut self, digest: &[u8], offset: u64) -> CueballResult<()> {
        self.index.write_all(digest)?;
        self.index.write_all(&offset.to_le_bytes())?;
        Ok(())
    }

    /// Write the bucket directory and footer, then flush and sync both files.
    pub fn close(mut self) -> CueballResult<WriterStats> {
        self.ensure_healthy()?;
        let num_buckets = self.directory.len() - 1;
        for position in &mut self.directory[self.current_bucket + 1..=num_buckets] {
            *position = self.entries;
        }

        let mut directory_bytes = Vec::with_capacity(self.directory.len() * 8);
        for position in &self.directory {
            directory_bytes.extend_from_slice(&position.to_le_bytes());
        }
        let footer = IndexFooter {
            entry_count: self.entries,
            directory_checksum: crc32c::crc32c(&directory_bytes),
        };
        self.index.write_all(&directory_bytes)?;
        self.index.write_all(&footer.to_bytes())?;

        finish(self.index)?;
        finish(self.data)?;

        let stats = WriterStats {
            entries: self.entries,
            non_empty_buckets: self.non_empty_buckets,
            index_bytes: (INDEX_HEADER_SIZE
                + directory_bytes.len()
                + INDEX_FOOTER_SIZE) as u64
                + self.entries * (self.hash_length + OFFSET_WIDTH) as u64,
            data_bytes: self.data_offset,
        };
        debug!(
            partition = self.partition,
            version = self.version,
            entries = stats.entries,
            non_empty_buckets = stats.non_empty_buckets,
            data_bytes = stats.data_bytes,
            "closed cueball writer"
        );
        Ok(stats)
    }
}

fn finish(writer: BufWriter<Box<dyn OutputStream>>) -> CueballResult<()> {
    let mut stream = writer.into_inner().map_err(|e| CueballError::from(e.into_error()))?;
    stream.sync()?;
    Ok(())
}
