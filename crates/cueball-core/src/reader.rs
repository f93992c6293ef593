//! Cueball reader
//!
//! A reader maps the index and data files of one promoted (partition,
//! version) read-only. Lookups are pure reads of immutable memory, so a
//! single reader serves any number of threads without locking.
//!
//! Lookup path:
//!   digest -> bucket (leading bits) -> directory[b]..directory[b+1]
//!   -> lower-bound binary search -> data block -> CRC32C check -> decode

use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use crate::cache::SynchronizedCache;
use crate::codec::{CodecKind, CompressionCodec};
use crate::config::DomainConfig;
use crate::error::{CueballError, CueballResult};
use crate::format::{
    bucket_of, check_data_header, index_file_size, IndexFooter, IndexHeader, BLOCK_HEADER_SIZE,
    INDEX_FOOTER_SIZE, INDEX_HEADER_SIZE, OFFSET_WIDTH,
};
use crate::hasher::Hasher;

/// Caller-owned, reusable lookup result.
///
/// The buffer only grows, so a hot loop reusing one result allocates at most
/// once per distinct value size.
#[derive(Debug, Clone, Default)]
pub struct ReaderResult {
    buffer: Vec<u8>,
    found: bool,
}

impl ReaderResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the buffer can hold `size` bytes without reallocating.
    pub fn requires_buffer_size(&mut self, size: usize) {
        if self.buffer.capacity() < size {
            self.buffer.reserve(size - self.buffer.len());
        }
    }

    /// Current buffer capacity.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn found(&mut self) {
        self.found = true;
    }

    pub fn not_found(&mut self) {
        self.found = false;
        self.buffer.clear();
    }

    pub fn is_found(&self) -> bool {
        self.found
    }

    /// The value of the last successful lookup; empty when not found.
    pub fn value(&self) -> &[u8] {
        &self.buffer
    }

    /// Reset to "not found", keeping the allocation.
    pub fn clear(&mut self) {
        self.not_found();
    }
}

/// Read-only bytes backing an index or data file.
enum Region {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Region {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Region::Mapped(map) => map,
            Region::Owned(bytes) => bytes,
        }
    }
}

fn map_file(path: &Path) -> CueballResult<Region> {
    let file = File::open(path).map_err(|e| CueballError::io(path, e, "Failed to open cueball file"))?;
    // SAFETY: promoted cueball files are never modified or truncated, so the
    // mapping stays valid and unchanged for the reader's lifetime.
    let map = unsafe { Mmap::map(&file) }
        .map_err(|e| CueballError::io(path, e, "Failed to map cueball file"))?;
    Ok(Region::Mapped(map))
}

/// Reads a single partition of a single version.
pub struct CueballReader {
    index_path: PathBuf,
    data_path: PathBuf,
    index: Region,
    data: Region,
    header: IndexHeader,
    entry_count: u64,
    /// Byte offset of the bucket directory inside the index
    directory_start: usize,
    hash_length: usize,
    value_length: usize,
    hasher: Arc<dyn Hasher>,
    codec: Arc<dyn CompressionCodec>,
    cache: SynchronizedCache<Vec<u8>, Arc<[u8]>>,
}

impl CueballReader {
    /// Map `index_path` and `data_path` and verify them against `config`.
    pub fn open(
        config: &DomainConfig,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn CompressionCodec>,
        index_path: &Path,
        data_path: &Path,
    ) -> CueballResult<Self> {
        let index = map_file(index_path)?;
        let data = map_file(data_path)?;
        let reader = Self::from_regions(config, hasher, codec, index_path, data_path, index, data)?;
        debug!(
            index = %index_path.display(),
            entries = reader.entry_count,
            "opened cueball reader"
        );
        Ok(reader)
    }

    /// Reader over in-memory file contents.
    pub fn from_bytes(
        config: &DomainConfig,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn CompressionCodec>,
        index: Vec<u8>,
        data: Vec<u8>,
    ) -> CueballResult<Self> {
        Self::from_regions(
            config,
            hasher,
            codec,
            Path::new("<memory index>"),
            Path::new("<memory data>"),
            Region::Owned(index),
            Region::Owned(data),
        )
    }

    fn from_regions(
        config: &DomainConfig,
        hasher: Arc<dyn Hasher>,
        codec: Arc<dyn CompressionCodec>,
        index_path: &Path,
        data_path: &Path,
        index: Region,
        data: Region,
    ) -> CueballResult<Self> {
        config.validate()?;

        if index.len() < INDEX_HEADER_SIZE + INDEX_FOOTER_SIZE {
            return Err(CueballError::Corrupted {
                path: index_path.to_path_buf(),
                offset: 0,
                reason: format!("index file too short: {} bytes", index.len()),
            });
        }
        let mut header_bytes = [0u8; INDEX_HEADER_SIZE];
        header_bytes.copy_from_slice(&index[..INDEX_HEADER_SIZE]);
        let header = IndexHeader::from_bytes(&header_bytes, index_path)?;

        let mismatch = |field: &'static str, expected: u64, actual: u64| -> CueballResult<()> {
            if expected == actual {
                Ok(())
            } else {
                Err(CueballError::ConfigMismatch {
                    path: index_path.to_path_buf(),
                    field,
                    expected,
                    actual,
                })
            }
        };
        mismatch("hash_length", config.hash_length as u64, header.hash_length as u64)?;
        mismatch("value_length", config.value_length as u64, header.value_length as u64)?;
        mismatch("index_bits", config.index_bits as u64, header.index_bits as u64)?;
        mismatch("offset_width", OFFSET_WIDTH as u64, header.offset_width as u64)?;
        mismatch("entry_stride", config.entry_stride() as u64, header.entry_stride as u64)?;
        let file_codec = CodecKind::from_tag(header.codec)?;
        mismatch("compression_codec", config.codec.tag() as u64, file_codec.tag() as u64)?;
        mismatch("compression_codec", codec.kind().tag() as u64, file_codec.tag() as u64)?;

        let footer_offset = index.len() - INDEX_FOOTER_SIZE;
        let mut footer_bytes = [0u8; INDEX_FOOTER_SIZE];
        footer_bytes.copy_from_slice(&index[footer_offset..]);
        let footer = IndexFooter::from_bytes(&footer_bytes, index_path, footer_offset as u64)?;

        let expected_size = index_file_size(footer.entry_count, config.entry_stride(), config.index_bits);
        if expected_size != index.len() as u64 {
            return Err(CueballError::Corrupted {
                path: index_path.to_path_buf(),
                offset: footer_offset as u64,
                reason: format!(
                    "index holds {} bytes but {} entries need {}",
                    index.len(),
                    footer.entry_count,
                    expected_size
                ),
            });
        }

        let directory_start = INDEX_HEADER_SIZE + footer.entry_count as usize * config.entry_stride();
        let directory = &index[directory_start..footer_offset];
        let actual = crc32c::crc32c(directory);
        if actual != footer.directory_checksum {
            return Err(CueballError::ChecksumMismatch {
                path: index_path.to_path_buf(),
                expected: footer.directory_checksum,
                actual,
                offset: directory_start as u64,
            });
        }

        check_data_header(&data, data_path)?;

        Ok(Self {
            index_path: index_path.to_path_buf(),
            data_path: data_path.to_path_buf(),
            index,
            data,
            header,
            entry_count: footer.entry_count,
            directory_start,
            hash_length: config.hash_length,
            value_length: config.value_length,
            hasher,
            codec,
            cache: SynchronizedCache::new(config.cache_capacity),
        })
    }

    /// Number of index entries.
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Whether the files belong to a base version.
    pub fn is_base(&self) -> bool {
        self.header.is_base()
    }

    pub fn cache(&self) -> &SynchronizedCache<Vec<u8>, Arc<[u8]>> {
        &self.cache
    }

    /// Look up `key`. A miss is reported through `result`, not as an error.
    pub fn get(&self, key: &[u8], result: &mut ReaderResult) -> CueballResult<()> {
        if self.cache.is_active() {
            if let Some(value) = self.cache.get(&key.to_vec()) {
                result.requires_buffer_size(value.len());
                result.buffer.clear();
                result.buffer.extend_from_slice(&value);
                result.found();
                return Ok(());
            }
        }

        let mut digest = [0u8; 64];
        let digest = &mut digest[..self.hash_length];
        self.hasher.hash(key, digest);
        self.get_hash(digest, result)?;

        if result.is_found() && self.cache.is_active() {
            self.cache.put(key.to_vec(), Arc::<[u8]>::from(result.value()))?;
        }
        Ok(())
    }

    /// Look up a precomputed digest.
    ///
    /// `result` reports "not found" whenever an error is returned.
    pub fn get_hash(&self, digest: &[u8], result: &mut ReaderResult) -> CueballResult<()> {
        result.not_found();
        if digest.len() != self.hash_length {
            return Err(CueballError::DigestLength {
                expected: self.hash_length,
                actual: digest.len(),
            });
        }

        let bucket = bucket_of(digest, self.header.index_bits);
        let start = self.directory_entry(bucket);
        let end = self.directory_entry(bucket + 1);
        if start > end || end > self.entry_count {
            return Err(CueballError::Corrupted {
                path: self.index_path.clone(),
                offset: (self.directory_start + bucket * 8) as u64,
                reason: format!("bucket {} has invalid range {}..{}", bucket, start, end),
            });
        }

        match self.search(digest, start, end) {
            Some(offset) => self.read_value(offset, result),
            None => {
                result.not_found();
                Ok(())
            }
        }
    }

    fn directory_entry(&self, bucket: usize) -> u64 {
        let at = self.directory_start + bucket * 8;
        u64::from_le_bytes([
            self.index[at],
            self.index[at + 1],
            self.index[at + 2],
            self.index[at + 3],
            self.index[at + 4],
            self.index[at + 5],
            self.index[at + 6],
            self.index[at + 7],
        ])
    }

    fn entry(&self, position: u64) -> &[u8] {
        let stride = self.hash_length + OFFSET_WIDTH;
        let at = INDEX_HEADER_SIZE + position as usize * stride;
        &self.index[at..at + stride]
    }

    /// Lower-bound search of `digest` in entries `[start, end)`; data offset of
    /// the first exact match.
    fn search(&self, digest: &[u8], start: u64, end: u64) -> Option<u64> {
        let (mut lo, mut hi) = (start, end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if &self.entry(mid)[..self.hash_length] < digest {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == end {
            return None;
        }
        let entry = self.entry(lo);
        if &entry[..self.hash_length] != digest {
            return None;
        }
        let mut offset = [0u8; OFFSET_WIDTH];
        offset.copy_from_slice(&entry[self.hash_length..]);
        Some(u64::from_le_bytes(offset))
    }

    fn read_value(&self, offset: u64, result: &mut ReaderResult) -> CueballResult<()> {
        let corrupted = |reason: String| CueballError::Corrupted {
            path: self.data_path.clone(),
            offset,
            reason,
        };

        let start = offset as usize;
        if offset > self.data.len() as u64 || start + BLOCK_HEADER_SIZE > self.data.len() {
            return Err(corrupted(format!(
                "block header past end of data file ({} bytes)",
                self.data.len()
            )));
        }
        let block = &self.data[start..start + BLOCK_HEADER_SIZE];
        let length = u32::from_le_bytes([block[0], block[1], block[2], block[3]]) as usize;
        let expected = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);

        let body_start = start + BLOCK_HEADER_SIZE;
        if body_start + length > self.data.len() {
            return Err(corrupted(format!("block of {} bytes past end of data file", length)));
        }
        let body = &self.data[body_start..body_start + length];
        let actual = crc32c::crc32c(body);
        if actual != expected {
            return Err(CueballError::ChecksumMismatch {
                path: self.data_path.clone(),
                expected,
                actual,
                offset,
            });
        }

        result.requires_buffer_size(self.value_length);
        result.buffer.clear();
        if let Err(e) = self.codec.decompress(body, &mut result.buffer) {
            result.not_found();
            return Err(e);
        }
        if result.buffer.len() != self.value_length {
            let decoded = result.buffer.len();
            result.not_found();
            return Err(corrupted(format!(
                "decoded value has {} bytes, expected {}",
                decoded, self.value_length
            )));
        }
        result.found();
        Ok(())
    }
}

impl std::fmt::Debug for CueballReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CueballReader")
            .field("index", &self.index_path)
            .field("entries", &self.entry_count)
            .field("base", &self.is_base())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{NoCompressionCodec, ZstdCodec};
    use crate::hasher::{IdentityHasher, Murmur64Hasher};
    use crate::output::MemoryOutputTarget;
    use crate::writer::CueballWriter;

    const INDEX: &str = "00001.base.cueball.index";
    const DATA: &str = "00001.base.cueball.data";

    /// Write `entries` (digest, value) through a writer and reopen the bytes.
    fn build(config: &DomainConfig, entries: &[(Vec<u8>, Vec<u8>)]) -> (Vec<u8>, Vec<u8>) {
        let target = MemoryOutputTarget::new();
        let codec = config.codec.build(config.compression_level);
        let mut writer = CueballWriter::new(
            config,
            Arc::new(IdentityHasher),
            Arc::from(codec),
            &target,
            0,
            1,
            true,
        )
        .unwrap();
        for (digest, value) in entries {
            writer.write_hash(digest, value).unwrap();
        }
        writer.close().unwrap();
        (target.file(0, INDEX).unwrap(), target.file(0, DATA).unwrap())
    }

    fn reader(config: &DomainConfig, files: (Vec<u8>, Vec<u8>)) -> CueballReader {
        let codec = config.codec.build(config.compression_level);
        CueballReader::from_bytes(config, Arc::new(IdentityHasher), Arc::from(codec), files.0, files.1)
            .unwrap()
    }

    fn sorted_entries(count: u32) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = (0..count)
            .map(|i| {
                let mut digest = vec![0u8; 4];
                Murmur64Hasher.hash(&i.to_le_bytes(), &mut digest);
                (digest, format!("value-{:06}", i).into_bytes())
            })
            .collect();
        entries.sort();
        entries
    }

    #[test]
    fn test_every_entry_found() {
        let config = DomainConfig::new(4, 12, 4, 1);
        let entries = sorted_entries(500);
        let reader = reader(&config, build(&config, &entries));
        assert_eq!(reader.len(), 500);
        assert!(reader.is_base());

        let mut result = ReaderResult::new();
        for (digest, value) in &entries {
            reader.get_hash(digest, &mut result).unwrap();
            assert!(result.is_found());
            assert_eq!(result.value(), value.as_slice());
        }
    }

    #[test]
    fn test_zstd_values() {
        let config = DomainConfig::new(4, 12, 3, 1).with_codec(CodecKind::Zstd);
        let entries = sorted_entries(100);
        let reader = reader(&config, build(&config, &entries));

        let mut result = ReaderResult::new();
        for (digest, value) in &entries {
            reader.get_hash(digest, &mut result).unwrap();
            assert_eq!(result.value(), value.as_slice());
        }
    }

    #[test]
    fn test_missing_digest_in_non_empty_bucket() {
        let config = DomainConfig::new(2, 4, 2, 1);
        let entries = vec![
            (vec![0x01, 0x00], b"aaaa".to_vec()),
            (vec![0x01, 0x09], b"bbbb".to_vec()),
        ];
        let reader = reader(&config, build(&config, &entries));

        let mut result = ReaderResult::new();
        for digest in [[0x01, 0x05], [0x00, 0x00], [0x01, 0xFF], [0xFF, 0xFF]] {
            reader.get_hash(&digest, &mut result).unwrap();
            assert!(!result.is_found(), "digest {:?}", digest);
            assert!(result.value().is_empty());
        }
    }

    #[test]
    fn test_empty_partition() {
        let config = DomainConfig::new(2, 4, 2, 1);
        let reader = reader(&config, build(&config, &[]));
        assert!(reader.is_empty());

        let mut result = ReaderResult::new();
        reader.get(b"anything", &mut result).unwrap();
        assert!(!result.is_found());
    }

    #[test]
    fn test_duplicate_digest_returns_first_written() {
        let config = DomainConfig::new(2, 4, 2, 1);
        let entries = vec![
            (vec![0x40, 0x01], b"aaaa".to_vec()),
            (vec![0x40, 0x02], b"firs".to_vec()),
            (vec![0x40, 0x02], b"last".to_vec()),
            (vec![0x40, 0x03], b"cccc".to_vec()),
        ];
        let reader = reader(&config, build(&config, &entries));

        let mut result = ReaderResult::new();
        reader.get_hash(&[0x40, 0x02], &mut result).unwrap();
        assert!(result.is_found());
        assert_eq!(result.value(), b"firs");
    }

    #[test]
    fn test_result_buffer_reused() {
        let config = DomainConfig::new(4, 12, 4, 1);
        let entries = sorted_entries(10);
        let reader = reader(&config, build(&config, &entries));

        let mut result = ReaderResult::new();
        reader.get_hash(&entries[0].0, &mut result).unwrap();
        let capacity = result.buffer_capacity();
        assert!(capacity >= 12);
        for (digest, _) in &entries {
            reader.get_hash(digest, &mut result).unwrap();
            assert_eq!(result.buffer_capacity(), capacity);
        }
    }

    #[test]
    fn test_config_mismatch_detected() {
        let written = DomainConfig::new(4, 12, 4, 1);
        let files = build(&written, &sorted_entries(5));

        let other = DomainConfig::new(4, 16, 4, 1);
        let result = CueballReader::from_bytes(
            &other,
            Arc::new(IdentityHasher),
            Arc::new(NoCompressionCodec),
            files.0.clone(),
            files.1.clone(),
        );
        assert!(matches!(result, Err(CueballError::ConfigMismatch { field: "value_length", .. })));

        let zstd = written.clone().with_codec(CodecKind::Zstd);
        let result = CueballReader::from_bytes(
            &zstd,
            Arc::new(IdentityHasher),
            Arc::new(ZstdCodec::default()),
            files.0,
            files.1,
        );
        assert!(matches!(
            result,
            Err(CueballError::ConfigMismatch { field: "compression_codec", .. })
        ));
    }

    #[test]
    fn test_corrupted_block_detected() {
        let config = DomainConfig::new(4, 12, 4, 1);
        let entries = sorted_entries(3);
        let (index, mut data) = build(&config, &entries);
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let reader = reader(&config, (index, data));

        let mut result = ReaderResult::new();
        let outcome = reader.get_hash(&entries[2].0, &mut result);
        assert!(matches!(outcome, Err(CueballError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_undecodable_block_clears_previous_result() {
        let config = DomainConfig::new(4, 12, 4, 1).with_codec(CodecKind::Zstd);
        let entries = sorted_entries(3);
        let (index, mut data) = build(&config, &entries);

        // Replace the first block's body with garbage under a valid checksum.
        let length = u32::from_le_bytes(data[8..12].try_into().unwrap()) as usize;
        let body = 16..16 + length;
        data[body.clone()].fill(0xAA);
        let crc = crc32c::crc32c(&data[body]);
        data[12..16].copy_from_slice(&crc.to_le_bytes());
        let reader = reader(&config, (index, data));

        let mut result = ReaderResult::new();
        reader.get_hash(&entries[1].0, &mut result).unwrap();
        assert!(result.is_found());

        assert!(reader.get_hash(&entries[0].0, &mut result).is_err());
        assert!(!result.is_found());
        assert!(result.value().is_empty());
    }

    #[test]
    fn test_truncated_index_rejected() {
        let config = DomainConfig::new(4, 12, 4, 1);
        let (mut index, data) = build(&config, &sorted_entries(3));
        index.remove(INDEX_HEADER_SIZE);
        let result = CueballReader::from_bytes(
            &config,
            Arc::new(IdentityHasher),
            Arc::new(NoCompressionCodec),
            index,
            data,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_serves_repeated_lookups() {
        let config = DomainConfig::new(4, 12, 4, 1).with_cache_capacity(8);
        let entries: Vec<(Vec<u8>, Vec<u8>)> = {
            let mut e: Vec<_> = (0u32..20)
                .map(|i| (i.to_be_bytes().to_vec(), format!("value-{:06}", i).into_bytes()))
                .collect();
            e.sort();
            e
        };
        let reader = reader(&config, build(&config, &entries));

        let mut result = ReaderResult::new();
        reader.get(&7u32.to_be_bytes(), &mut result).unwrap();
        assert!(result.is_found());
        assert_eq!(reader.cache().len(), 1);

        reader.get(&7u32.to_be_bytes(), &mut result).unwrap();
        assert_eq!(result.value(), b"value-000007");

        // misses are never cached
        reader.get(&99u32.to_be_bytes(), &mut result).unwrap();
        assert!(!result.is_found());
        assert_eq!(reader.cache().len(), 1);
    }
}
