//! Partition-grouped record writer
//!
//! Bulk loaders emit the records of a version grouped by partition. The
//! `DomainRecordWriter` keeps exactly one storage engine writer open (the one
//! for the partition currently being written), closes it when the next
//! partition starts, and promotes the whole staging area on `close`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cueball_core::{
    CueballError, CueballResult, LocalOutputTarget, StagingArea, StorageEngine, Writer,
    WriterStats,
};
use tracing::{debug, info, warn};

/// Outcome of a promoted build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    /// Promoted version directory
    pub version_dir: PathBuf,
    /// Per-partition writer statistics, in the order partitions were written
    pub partitions: Vec<(u32, WriterStats)>,
}

impl LoadSummary {
    /// Entries written across every partition.
    pub fn total_entries(&self) -> u64 {
        self.partitions.iter().map(|(_, stats)| stats.entries).sum()
    }
}

/// Writes one version of a domain, partition after partition.
pub struct DomainRecordWriter {
    engine: Arc<dyn StorageEngine>,
    staging: StagingArea,
    target: LocalOutputTarget,
    version: u32,
    is_base: bool,
    current: Option<(u32, Box<dyn Writer>)>,
    finished: Vec<(u32, WriterStats)>,
    /// Partition of the first failed operation; such a build is never promoted
    failed: Option<u32>,
}

impl DomainRecordWriter {
    /// Start building `version` of the domain rooted at `domain_root`.
    ///
    /// Fails before creating any staging files when `version` already exists.
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        domain_root: &Path,
        version: u32,
        is_base: bool,
    ) -> CueballResult<Self> {
        let staging = StagingArea::create_for(domain_root, version)?;
        let target = staging.output_target();
        debug!(
            version,
            staging = %staging.staging_dir().display(),
            "started domain build"
        );
        Ok(Self {
            engine,
            staging,
            target,
            version,
            is_base,
            current: None,
            finished: Vec::new(),
            failed: None,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.staging_dir()
    }

    /// Partition currently open for writing.
    pub fn current_partition(&self) -> Option<u32> {
        self.current.as_ref().map(|(partition, _)| *partition)
    }

    /// Make `partition` the current partition, finishing the previous one.
    ///
    /// Starting the current partition again is a no-op; returning to any
    /// partition that was already finished fails.
    pub fn start_partition(&mut self, partition: u32) -> CueballResult<()> {
        let result = self.switch_to(partition);
        self.record_failure(partition, &result);
        result
    }

    fn switch_to(&mut self, partition: u32) -> CueballResult<()> {
        if self.current_partition() == Some(partition) {
            return Ok(());
        }
        if self.staging.is_written(partition) {
            return Err(CueballError::PartitionAlreadyWritten { partition });
        }
        self.finish_current()?;

        let writer = self.engine.writer(&self.target, partition, self.version, self.is_base)?;
        self.current = Some((partition, writer));
        Ok(())
    }

    /// Hash `key` with the domain hasher and write it to `partition`.
    pub fn write(&mut self, partition: u32, key: &[u8], value: &[u8]) -> CueballResult<()> {
        let result = self.current_writer(partition).and_then(|writer| writer.write(key, value));
        self.record_failure(partition, &result);
        result
    }

    /// Write a precomputed digest to `partition`.
    pub fn write_hash(&mut self, partition: u32, digest: &[u8], value: &[u8]) -> CueballResult<()> {
        let result = self
            .current_writer(partition)
            .and_then(|writer| writer.write_hash(digest, value));
        self.record_failure(partition, &result);
        result
    }

    /// Whether any write or partition switch has failed.
    pub fn has_failed(&self) -> bool {
        self.failed.is_some()
    }

    fn record_failure(&mut self, partition: u32, result: &CueballResult<()>) {
        if result.is_err() && self.failed.is_none() {
            self.failed = Some(partition);
        }
    }

    fn current_writer(&mut self, partition: u32) -> CueballResult<&mut Box<dyn Writer>> {
        self.switch_to(partition)?;
        match self.current.as_mut() {
            Some((_, writer)) => Ok(writer),
            None => Err(CueballError::InvalidArgument {
                message: format!("no writer open for partition {}", partition),
            }),
        }
    }

    fn finish_current(&mut self) -> CueballResult<()> {
        if let Some((partition, writer)) = self.current.take() {
            let stats = writer.close()?;
            self.staging.mark_written(partition)?;
            self.finished.push((partition, stats));
        }
        Ok(())
    }

    /// Finish the open partition and promote every written partition.
    ///
    /// A build in which any operation failed is left unpromoted in staging.
    pub fn close(mut self) -> CueballResult<LoadSummary> {
        if let Some(partition) = self.failed {
            warn!(
                version = self.version,
                partition,
                staging = %self.staging.staging_dir().display(),
                "refusing to promote a failed build"
            );
            return Err(CueballError::WriterFailed {
                partition,
                version: self.version,
            });
        }
        self.finish_current()?;
        let version_dir = self.staging.promote(self.version)?;
        let summary = LoadSummary {
            version_dir,
            partitions: self.finished,
        };
        info!(
            version = self.version,
            partitions = summary.partitions.len(),
            entries = summary.total_entries(),
            "domain build promoted"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for DomainRecordWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRecordWriter")
            .field("version", &self.version)
            .field("staging", &self.staging.staging_dir())
            .field("current", &self.current_partition())
            .finish()
    }
}
