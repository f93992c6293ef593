//! Staging and atomic version promotion
//!
//! All partitions of a version are built in a private staging directory and
//! published together:
//!
//! ```text
//! <root>/_tmp_cueball_build/<id>/<partition>/...   writers output here
//! <root>/_tmp_cueball_build/<id>.pending/          written partitions moved here
//! <root>/v<version>/                               single rename of .pending
//! ```
//!
//! Readers only ever open `<root>/v<version>`, which appears through one
//! directory rename, so they see either nothing or the whole version. Any file
//! left in the staging directory after the written partitions are moved out
//! aborts promotion; nothing is deleted in that case.

use std::fs;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::cueball::version_dir;
use crate::durability::{durable_rename, sync_dir};
use crate::error::{CueballError, CueballResult};
use crate::output::{partition_dir, LocalOutputTarget};

/// Parent of every staging directory below a domain root
pub const STAGING_DIR_NAME: &str = "_tmp_cueball_build";

/// Private build location for one version.
#[derive(Debug)]
pub struct StagingArea {
    domain_root: PathBuf,
    staging_dir: PathBuf,
    id: Uuid,
    written: HashSet<u32>,
}

impl StagingArea {
    /// Create a fresh, uniquely named staging directory below `domain_root`.
    pub fn create<P: AsRef<Path>>(domain_root: P) -> CueballResult<Self> {
        let domain_root = domain_root.as_ref().to_path_buf();
        let id = Uuid::new_v4();
        let staging_dir = domain_root.join(STAGING_DIR_NAME).join(id.to_string());
        fs::create_dir_all(&staging_dir)
            .map_err(|e| CueballError::io(&staging_dir, e, "Failed to create staging directory"))?;
        Ok(Self {
            domain_root,
            staging_dir,
            id,
            written: HashSet::new(),
        })
    }

    /// Like [`StagingArea::create`], but refuse up front when `version` has
    /// already been promoted, so a doomed build never writes anything.
    pub fn create_for<P: AsRef<Path>>(domain_root: P, version: u32) -> CueballResult<Self> {
        let domain_root = domain_root.as_ref();
        ensure_unpromoted(domain_root, version)?;
        Self::create(domain_root)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Output target placing partition files inside this staging area.
    pub fn output_target(&self) -> LocalOutputTarget {
        LocalOutputTarget::new(&self.staging_dir)
    }

    /// Record that `partition` has been fully written. Each partition may be
    /// written at most once per build.
    pub fn mark_written(&mut self, partition: u32) -> CueballResult<()> {
        if !self.written.insert(partition) {
            return Err(CueballError::PartitionAlreadyWritten { partition });
        }
        Ok(())
    }

    pub fn is_written(&self, partition: u32) -> bool {
        self.written.contains(&partition)
    }

    /// Written partitions, ascending.
    pub fn written_partitions(&self) -> Vec<u32> {
        let mut partitions: Vec<u32> = self.written.iter().copied().collect();
        partitions.sort_unstable();
        partitions
    }

    /// Publish every written partition as `<root>/v<version>` and return that path.
    pub fn promote(self, version: u32) -> CueballResult<PathBuf> {
        // Checked again here: another build may have promoted since creation.
        ensure_unpromoted(&self.domain_root, version)?;
        let final_dir = version_dir(&self.domain_root, version);

        let staging_parent = self.domain_root.join(STAGING_DIR_NAME);
        let pending_dir = staging_parent.join(format!("{}.pending", self.id));
        fs::create_dir(&pending_dir)
            .map_err(|e| CueballError::io(&pending_dir, e, "Failed to create pending directory"))?;

        let partitions = self.written_partitions();
        for &partition in &partitions {
            let from = partition_dir(&self.staging_dir, partition);
            let to = partition_dir(&pending_dir, partition);
            fs::rename(&from, &to)
                .map_err(|e| CueballError::io(&from, e, "Failed to move partition out of staging"))?;
        }

        let remaining = fs::read_dir(&self.staging_dir)
            .map_err(|e| CueballError::io(&self.staging_dir, e, "Failed to list staging directory"))?
            .count();
        if remaining > 0 {
            error!(
                staging = %self.staging_dir.display(),
                remaining,
                "staging directory is not empty after moving written partitions"
            );
            return Err(CueballError::StagingNotEmpty {
                path: self.staging_dir,
                remaining,
            });
        }

        fs::remove_dir(&self.staging_dir)
            .map_err(|e| CueballError::io(&self.staging_dir, e, "Failed to remove staging directory"))?;
        sync_dir(&pending_dir).map_err(|e| CueballError::io(&pending_dir, e, "Failed to sync pending directory"))?;

        durable_rename(&pending_dir, &final_dir)
            .map_err(|e| CueballError::io(&final_dir, e, "Failed to promote version"))?;

        // Other builds may still be staging next to us.
        if let Ok(mut entries) = fs::read_dir(&staging_parent) {
            if entries.next().is_none() {
                fs::remove_dir(&staging_parent)
                    .map_err(|e| CueballError::io(&staging_parent, e, "Failed to remove staging parent"))?;
            }
        }

        info!(
            version,
            partitions = partitions.len(),
            path = %final_dir.display(),
            "promoted cueball version"
        );
        Ok(final_dir)
    }
}

fn ensure_unpromoted(domain_root: &Path, version: u32) -> CueballResult<()> {
    let final_dir = version_dir(domain_root, version);
    if final_dir.exists() {
        return Err(CueballError::Io {
            path: Some(final_dir),
            kind: std::io::ErrorKind::AlreadyExists,
            message: format!("version {} has already been promoted", version),
        });
    }
    Ok(())
}
