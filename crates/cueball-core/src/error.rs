//! Error types for Cueball operations
//!
//! All Cueball errors are represented by the `CueballError` enum. Variants carry
//! enough context (paths, offsets, expected/actual values) to tell a
//! misconfigured domain apart from a corrupted file or a failed disk.

use std::path::PathBuf;

use thiserror::Error;

/// Cueball error types with detailed context
#[derive(Debug, Clone, Error)]
pub enum CueballError {
    /// I/O operation failed
    #[error("I/O error{}: {message} ({kind})", fmt_path(.path))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Checksum verification failed
    #[error("Checksum mismatch in {} at offset {offset}: expected 0x{expected:08x}, got 0x{actual:08x}", .path.display())]
    ChecksumMismatch {
        /// File where checksum failed
        path: PathBuf,
        /// Expected checksum value
        expected: u32,
        /// Actual checksum computed
        actual: u32,
        /// Byte offset of the corrupted data
        offset: u64,
    },

    /// Magic bytes not found at expected location
    #[error("Magic bytes not found in {} at offset {offset}: found {:02x}{:02x}{:02x}{:02x}",
        .path.display(), .found_bytes[0], .found_bytes[1], .found_bytes[2], .found_bytes[3])]
    NoMagicFound {
        /// File being read
        path: PathBuf,
        /// Offset where magic was expected
        offset: u64,
        /// Bytes actually found
        found_bytes: [u8; 4],
    },

    /// Structural damage in an index or data file
    #[error("Corrupted file {} at offset {offset}: {reason}", .path.display())]
    Corrupted {
        /// Damaged file
        path: PathBuf,
        /// Byte offset where the damage was detected
        offset: u64,
        /// Description of the damage
        reason: String,
    },

    /// Domain configuration is invalid on its own
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Which rule was violated
        reason: String,
    },

    /// A file was written with a different domain configuration than the reader's
    #[error("Configuration mismatch in {} for {field}: domain expects {expected}, file has {actual}", .path.display())]
    ConfigMismatch {
        /// File whose header disagrees
        path: PathBuf,
        /// Name of the disagreeing field
        field: &'static str,
        /// Value from the domain configuration
        expected: u64,
        /// Value recorded in the file
        actual: u64,
    },

    /// Name or tag does not resolve to a known implementation
    #[error("Unknown {component} identifier: {name}")]
    UnknownIdentifier {
        /// Kind of component (hasher, partitioner, codec, storage engine)
        component: &'static str,
        /// The unresolved name or tag
        name: String,
    },

    /// Value does not have the domain's fixed length
    #[error("Value length {actual} does not match domain value length {expected}")]
    ValueLength {
        /// Domain value length
        expected: usize,
        /// Supplied value length
        actual: usize,
    },

    /// Digest does not have the domain's fixed length
    #[error("Digest length {actual} does not match domain hash length {expected}")]
    DigestLength {
        /// Domain hash length
        expected: usize,
        /// Supplied digest length
        actual: usize,
    },

    /// Partition id outside `[0, num_partitions)`
    #[error("Partition {partition} out of range for {num_partitions} partitions")]
    PartitionOutOfRange {
        /// Requested partition
        partition: u32,
        /// Domain partition count
        num_partitions: u32,
    },

    /// Caller violated an API contract
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the violation
        message: String,
    },

    /// Staging directory still holds files after every written partition moved out
    #[error("Staging directory {} was not empty after moving all written partitions ({remaining} entries left)", .path.display())]
    StagingNotEmpty {
        /// Staging directory that was left in place
        path: PathBuf,
        /// Number of unexpected entries
        remaining: usize,
    },

    /// A partition was fed to a build twice
    #[error("Partition {partition} has already been written in this build")]
    PartitionAlreadyWritten {
        /// The repeated partition
        partition: u32,
    },

    /// An earlier write failed part-way; the output must not be used
    #[error("Writer for partition {partition}, version {version} failed earlier and cannot continue")]
    WriterFailed {
        /// Partition being written
        partition: u32,
        /// Version being written
        version: u32,
    },

    /// No promoted files exist for the requested partition and version
    #[error("No cueball files for version {version} in {}", .path.display())]
    VersionNotFound {
        /// Partition directory that was searched
        path: PathBuf,
        /// Requested version
        version: u32,
    },
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl CueballError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error, context: &str) -> Self {
        CueballError::Io {
            path: Some(path.into()),
            kind: err.kind(),
            message: format!("{}: {}", context, err),
        }
    }
}

/// Convert std::io::Error to CueballError::Io
impl From<std::io::Error> for CueballError {
    fn from(err: std::io::Error) -> Self {
        CueballError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for Cueball operations
pub type CueballResult<T> = Result<T, CueballError>;
