//! Binary format definitions for Cueball index and data files
//!
//! Index file:
//!   IndexHeader (32 bytes)
//!   + entry_count × (digest[hash_length] + offset u64 LE)
//!   + bucket directory: (2^index_bits + 1) × u64 LE entry positions
//!   + IndexFooter (16 bytes)
//!
//! Data file:
//!   DataHeader (8 bytes) + blocks of (compressed_len u32 LE + crc32c u32 LE + bytes)
//!
//! Bucket `b` holds entries `directory[b] .. directory[b + 1]`; an empty bucket
//! has two equal adjacent positions.

use std::path::Path;

use crate::error::{CueballError, CueballResult};

/// Magic bytes identifying Cueball index files
pub const INDEX_MAGIC: [u8; 4] = *b"CUEB";

/// Magic bytes identifying Cueball data files
pub const DATA_MAGIC: [u8; 4] = *b"CUED";

/// On-disk format version
pub const FORMAT_VERSION: u16 = 1;

/// Index header size in bytes
pub const INDEX_HEADER_SIZE: usize = 32;

/// Index footer size in bytes
pub const INDEX_FOOTER_SIZE: usize = 16;

/// Data file header size in bytes
pub const DATA_HEADER_SIZE: usize = 8;

/// Data block header size in bytes
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Width of a data offset stored in an index entry
pub const OFFSET_WIDTH: usize = 8;

/// Flag bit: the file belongs to a base (complete) version
pub const FLAG_BASE: u8 = 0x01;

/// Fixed-size header at the start of every index file.
///
/// Layout:
///   [0..4]   magic:        [u8;4] - "CUEB"
///   [4..6]   version:      u16
///   [6..8]   hash_length:  u16
///   [8]      index_bits:   u8
///   [9]      offset_width: u8
///   [10]     codec:        u8     - CodecKind tag
///   [11]     flags:        u8     - bit 0 = base version
///   [12..16] entry_stride: u32
///   [16..20] value_length: u32
///   [20..24] reserved
///   [24..28] checksum:     u32    - CRC32C of bytes [0..24]
///   [28..32] padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub hash_length: u16,
    pub index_bits: u8,
    pub offset_width: u8,
    pub codec: u8,
    pub flags: u8,
    pub entry_stride: u32,
    pub value_length: u32,
}

impl IndexHeader {
    pub fn is_base(&self) -> bool {
        (self.flags & FLAG_BASE) != 0
    }

    /// Serialize header to bytes for writing
    pub fn to_bytes(&self) -> [u8; INDEX_HEADER_SIZE] {
        let mut buf = [0u8; INDEX_HEADER_SIZE];
        buf[0..4].copy_from_slice(&INDEX_MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.hash_length.to_le_bytes());
        buf[8] = self.index_bits;
        buf[9] = self.offset_width;
        buf[10] = self.codec;
        buf[11] = self.flags;
        buf[12..16].copy_from_slice(&self.entry_stride.to_le_bytes());
        buf[16..20].copy_from_slice(&self.value_length.to_le_bytes());
        let checksum = crc32c::crc32c(&buf[0..24]);
        buf[24..28].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Parse and verify a header. `path` is only used for error context.
    pub fn from_bytes(bytes: &[u8; INDEX_HEADER_SIZE], path: &Path) -> CueballResult<Self> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != INDEX_MAGIC {
            return Err(CueballError::NoMagicFound {
                path: path.to_path_buf(),
                offset: 0,
                found_bytes: magic,
            });
        }

        let expected = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
        let actual = crc32c::crc32c(&bytes[0..24]);
        if expected != actual {
            return Err(CueballError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
                offset: 0,
            });
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(CueballError::Corrupted {
                path: path.to_path_buf(),
                offset: 4,
                reason: format!("unsupported format version {}", version),
            });
        }

        Ok(Self {
            hash_length: u16::from_le_bytes([bytes[6], bytes[7]]),
            index_bits: bytes[8],
            offset_width: bytes[9],
            codec: bytes[10],
            flags: bytes[11],
            entry_stride: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            value_length: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        })
    }
}

/// Fixed-size footer at the end of every index file.
///
/// Layout:
///   [0..8]   entry_count:        u64
///   [8..12]  directory_checksum: u32 - CRC32C of the bucket directory bytes
///   [12..16] magic:              [u8;4] - "CUEB"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFooter {
    pub entry_count: u64,
    pub directory_checksum: u32,
}

impl IndexFooter {
    pub fn to_bytes(&self) -> [u8; INDEX_FOOTER_SIZE] {
        let mut buf = [0u8; INDEX_FOOTER_SIZE];
        buf[0..8].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[8..12].copy_from_slice(&self.directory_checksum.to_le_bytes());
        buf[12..16].copy_from_slice(&INDEX_MAGIC);
        buf
    }

    pub fn from_bytes(bytes: &[u8; INDEX_FOOTER_SIZE], path: &Path, offset: u64) -> CueballResult<Self> {
        let magic = [bytes[12], bytes[13], bytes[14], bytes[15]];
        if magic != INDEX_MAGIC {
            return Err(CueballError::NoMagicFound {
                path: path.to_path_buf(),
                offset: offset + 12,
                found_bytes: magic,
            });
        }
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[0..8]);
        Ok(Self {
            entry_count: u64::from_le_bytes(count),
            directory_checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }
}

/// Data file header: magic + u32 format version.
pub fn data_header() -> [u8; DATA_HEADER_SIZE] {
    let mut buf = [0u8; DATA_HEADER_SIZE];
    buf[0..4].copy_from_slice(&DATA_MAGIC);
    buf[4..8].copy_from_slice(&(FORMAT_VERSION as u32).to_le_bytes());
    buf
}

/// Verify a data file header.
pub fn check_data_header(bytes: &[u8], path: &Path) -> CueballResult<()> {
    if bytes.len() < DATA_HEADER_SIZE {
        return Err(CueballError::Corrupted {
            path: path.to_path_buf(),
            offset: 0,
            reason: format!("data file too short: {} bytes", bytes.len()),
        });
    }
    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != DATA_MAGIC {
        return Err(CueballError::NoMagicFound {
            path: path.to_path_buf(),
            offset: 0,
            found_bytes: magic,
        });
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION as u32 {
        return Err(CueballError::Corrupted {
            path: path.to_path_buf(),
            offset: 4,
            reason: format!("unsupported format version {}", version),
        });
    }
    Ok(())
}

/// Data block header: compressed length + CRC32C of the compressed bytes.
pub fn block_header(compressed: &[u8]) -> [u8; BLOCK_HEADER_SIZE] {
    let mut buf = [0u8; BLOCK_HEADER_SIZE];
    buf[0..4].copy_from_slice(&(compressed.len() as u32).to_le_bytes());
    buf[4..8].copy_from_slice(&crc32c::crc32c(compressed).to_le_bytes());
    buf
}

/// Bucket selected by the leading `index_bits` bits of `digest`.
///
/// Digests shorter than 8 bytes are treated as zero-padded on the right.
pub fn bucket_of(digest: &[u8], index_bits: u8) -> usize {
    if index_bits == 0 {
        return 0;
    }
    let mut prefix = [0u8; 8];
    let n = digest.len().min(8);
    prefix[..n].copy_from_slice(&digest[..n]);
    (u64::from_be_bytes(prefix) >> (64 - index_bits as u32)) as usize
}

/// Total index file size for the given shape.
pub fn index_file_size(entry_count: u64, entry_stride: usize, index_bits: u8) -> u64 {
    let directory = ((1u64 << index_bits) + 1) * 8;
    // Saturates so a corrupt entry count cannot overflow.
    entry_count
        .saturating_mul(entry_stride as u64)
        .saturating_add(INDEX_HEADER_SIZE as u64 + directory + INDEX_FOOTER_SIZE as u64)
}
