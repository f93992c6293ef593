//! Value compression codecs
//!
//! The codec is fixed per domain version at write time and its tag is
//! recorded in the index header, so a reader always decodes with the codec the
//! file was written with.

use crate::error::{CueballError, CueballResult};

/// Default zstd compression level
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Encodes and decodes value blocks.
pub trait CompressionCodec: Send + Sync {
    /// Append the encoded form of `src` to `dst`.
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> CueballResult<()>;

    /// Append the decoded form of `src` to `dst`.
    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>) -> CueballResult<()>;

    /// Kind tag of this implementation.
    fn kind(&self) -> CodecKind;
}

/// Stores values as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompressionCodec;

impl CompressionCodec for NoCompressionCodec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> CueballResult<()> {
        dst.extend_from_slice(src);
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>) -> CueballResult<()> {
        dst.extend_from_slice(src);
        Ok(())
    }

    fn kind(&self) -> CodecKind {
        CodecKind::None
    }
}

/// zstd block compression.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ZSTD_LEVEL)
    }
}

impl CompressionCodec for ZstdCodec {
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> CueballResult<()> {
        let compressed = zstd::bulk::compress(src, self.level)?;
        dst.extend_from_slice(&compressed);
        Ok(())
    }

    fn decompress(&self, src: &[u8], dst: &mut Vec<u8>) -> CueballResult<()> {
        zstd::stream::copy_decode(src, &mut *dst)?;
        Ok(())
    }

    fn kind(&self) -> CodecKind {
        CodecKind::Zstd
    }
}

/// Registered codecs. The discriminant is the on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CodecKind {
    /// [`NoCompressionCodec`]
    None = 0,
    /// [`ZstdCodec`]
    Zstd = 1,
}

impl CodecKind {
    /// Resolve a configuration name.
    pub fn from_name(name: &str) -> CueballResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "no_compression" => Ok(CodecKind::None),
            "zstd" => Ok(CodecKind::Zstd),
            _ => Err(CueballError::UnknownIdentifier {
                component: "compression codec",
                name: name.to_string(),
            }),
        }
    }

    /// Resolve an on-disk tag.
    pub fn from_tag(tag: u8) -> CueballResult<Self> {
        match tag {
            0 => Ok(CodecKind::None),
            1 => Ok(CodecKind::Zstd),
            other => Err(CueballError::UnknownIdentifier {
                component: "compression codec",
                name: format!("tag {}", other),
            }),
        }
    }

    /// On-disk tag.
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Canonical configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::None => "none",
            CodecKind::Zstd => "zstd",
        }
    }

    /// Instantiate the implementation. `level` only applies to zstd.
    pub fn build(&self, level: i32) -> Box<dyn CompressionCodec> {
        match self {
            CodecKind::None => Box::new(NoCompressionCodec),
            CodecKind::Zstd => Box::new(ZstdCodec::new(level)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(codec: &dyn CompressionCodec, value: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::new();
        codec.compress(value, &mut encoded).unwrap();
        let mut decoded = Vec::new();
        codec.decompress(&encoded, &mut decoded).unwrap();
        decoded
    }

    #[test]
    fn test_identity_for_every_codec() {
        let values: [&[u8]; 3] = [b"", b"0123456789abcdef", &[7u8; 4096]];
        for kind in [CodecKind::None, CodecKind::Zstd] {
            let codec = kind.build(DEFAULT_ZSTD_LEVEL);
            for value in values {
                assert_eq!(roundtrip(codec.as_ref(), value), value, "codec {:?}", kind);
            }
        }
    }

    #[test]
    fn test_zstd_shrinks_repetitive_values() {
        let value = vec![0x42u8; 4096];
        let mut encoded = Vec::new();
        ZstdCodec::default().compress(&value, &mut encoded).unwrap();
        assert!(encoded.len() < value.len() / 10);
    }

    #[test]
    fn test_decompress_appends() {
        let mut dst = b"prefix".to_vec();
        NoCompressionCodec.decompress(b"-tail", &mut dst).unwrap();
        assert_eq!(dst, b"prefix-tail");
    }

    #[test]
    fn test_zstd_rejects_garbage() {
        let mut dst = Vec::new();
        let result = ZstdCodec::default().decompress(b"definitely not zstd", &mut dst);
        assert!(matches!(result, Err(CueballError::Io { .. })));
    }

    #[test]
    fn test_tags() {
        for kind in [CodecKind::None, CodecKind::Zstd] {
            assert_eq!(CodecKind::from_tag(kind.tag()).unwrap(), kind);
            assert_eq!(CodecKind::from_name(kind.name()).unwrap(), kind);
            assert_eq!(kind.build(1).kind(), kind);
        }
        assert!(CodecKind::from_tag(9).is_err());
        assert!(CodecKind::from_name("gzip").is_err());
    }
}
