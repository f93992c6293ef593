//! Output targets: where a writer's bytes go
//!
//! Writers never open files themselves. They ask an [`OutputTarget`] for one
//! stream per (partition, file name), which lets the same writer produce a
//! build on local disk, inside a staging directory, or in memory.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::durability::durable_sync;
use crate::error::{CueballError, CueballResult};

/// A writable stream that can be made durable.
pub trait OutputStream: Write + Send {
    /// Flush buffered bytes and persist them.
    fn sync(&mut self) -> io::Result<()>;
}

/// Factory for the output streams of one build.
pub trait OutputTarget: Send + Sync {
    /// Open a new stream for `file_name` of `partition`. Fails if it already exists.
    fn output_stream(&self, partition: u32, file_name: &str) -> CueballResult<Box<dyn OutputStream>>;
}

/// Directory holding `partition`'s files under `root`.
pub fn partition_dir(root: &Path, partition: u32) -> PathBuf {
    root.join(partition.to_string())
}

/// Writes `<root>/<partition>/<file_name>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalOutputTarget {
    root: PathBuf,
}

impl LocalOutputTarget {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl OutputTarget for LocalOutputTarget {
    fn output_stream(&self, partition: u32, file_name: &str) -> CueballResult<Box<dyn OutputStream>> {
        let dir = partition_dir(&self.root, partition);
        std::fs::create_dir_all(&dir)
            .map_err(|e| CueballError::io(&dir, e, "Failed to create partition directory"))?;

        let path = dir.join(file_name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CueballError::io(&path, e, "Failed to create output file"))?;

        Ok(Box::new(LocalOutputStream { file, path }))
    }
}

struct LocalOutputStream {
    file: File,
    path: PathBuf,
}

impl Write for LocalOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl OutputStream for LocalOutputStream {
    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        durable_sync(&self.file).map_err(|e| {
            io::Error::new(e.kind(), format!("durable_sync of {} failed: {}", self.path.display(), e))
        })
    }
}

type MemoryFiles = Arc<Mutex<HashMap<(u32, String), Vec<u8>>>>;

/// Keeps every stream in memory. Bytes become visible once the stream is synced.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutputTarget {
    files: MemoryFiles,
}

impl MemoryOutputTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a synced file.
    pub fn file(&self, partition: u32, file_name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(&(partition, file_name.to_string())).cloned()
    }

    /// Names of all synced files of `partition`, sorted.
    pub fn file_names(&self, partition: u32) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .keys()
            .filter(|(p, _)| *p == partition)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl OutputTarget for MemoryOutputTarget {
    fn output_stream(&self, partition: u32, file_name: &str) -> CueballResult<Box<dyn OutputStream>> {
        let key = (partition, file_name.to_string());
        if self.files.lock().contains_key(&key) {
            return Err(CueballError::Io {
                path: Some(PathBuf::from(file_name)),
                kind: io::ErrorKind::AlreadyExists,
                message: format!("partition {} already has {}", partition, file_name),
            });
        }
        Ok(Box::new(MemoryOutputStream {
            files: Arc::clone(&self.files),
            key,
            buffer: Vec::new(),
        }))
    }
}

struct MemoryOutputStream {
    files: MemoryFiles,
    key: (u32, String),
    buffer: Vec<u8>,
}

impl Write for MemoryOutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputStream for MemoryOutputStream {
    fn sync(&mut self) -> io::Result<()> {
        self.files.lock().insert(self.key.clone(), self.buffer.clone());
        Ok(())
    }
}
