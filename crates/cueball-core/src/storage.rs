//! Storage engine abstraction
//!
//! Callers above the engine (bulk loaders, serving partitions) talk to
//! `StorageEngine`, `Writer` and `Reader` and select an implementation by
//! name through a static factory table.

use std::collections::BTreeMap;
use std::path::Path;

use crate::cueball::Cueball;
use crate::error::{CueballError, CueballResult};
use crate::output::OutputTarget;
use crate::reader::ReaderResult;
use crate::writer::WriterStats;

/// Write session for one (partition, version).
pub trait Writer: Send {
    /// Hash `key` with the domain hasher and append it.
    fn write(&mut self, key: &[u8], value: &[u8]) -> CueballResult<()>;

    /// Append a value under a precomputed digest.
    fn write_hash(&mut self, digest: &[u8], value: &[u8]) -> CueballResult<()>;

    /// Finish both files and make them durable.
    fn close(self: Box<Self>) -> CueballResult<WriterStats>;
}

/// Point lookups against one promoted (partition, version).
pub trait Reader: Send + Sync {
    fn get(&self, key: &[u8], result: &mut ReaderResult) -> CueballResult<()>;
}

/// A storage engine bound to one domain.
pub trait StorageEngine: Send + Sync {
    fn writer(
        &self,
        target: &dyn OutputTarget,
        partition: u32,
        version: u32,
        is_base: bool,
    ) -> CueballResult<Box<dyn Writer>>;

    fn reader(&self, partition: u32, version: u32) -> CueballResult<Box<dyn Reader>>;

    fn kind(&self) -> StorageEngineKind;
}

/// Available storage engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageEngineKind {
    Cueball,
}

impl StorageEngineKind {
    pub fn from_name(name: &str) -> CueballResult<Self> {
        FACTORIES
            .iter()
            .find(|(kind, _)| kind.name() == name)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| CueballError::UnknownIdentifier {
                component: "storage engine",
                name: name.to_string(),
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageEngineKind::Cueball => "cueball",
        }
    }
}

type EngineFactory = fn(&BTreeMap<String, String>, &Path) -> CueballResult<Box<dyn StorageEngine>>;

fn build_cueball(options: &BTreeMap<String, String>, root: &Path) -> CueballResult<Box<dyn StorageEngine>> {
    Ok(Box::new(Cueball::from_options(options, root)?))
}

static FACTORIES: &[(StorageEngineKind, EngineFactory)] = &[(StorageEngineKind::Cueball, build_cueball)];

/// Build the engine registered under `name` for the domain rooted at `root`.
pub fn build_storage_engine(
    name: &str,
    options: &BTreeMap<String, String>,
    root: &Path,
) -> CueballResult<Box<dyn StorageEngine>> {
    let kind = StorageEngineKind::from_name(name)?;
    let factory = FACTORIES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, factory)| *factory)
        .ok_or_else(|| CueballError::UnknownIdentifier {
            component: "storage engine",
            name: name.to_string(),
        })?;
    factory(options, root)
}
