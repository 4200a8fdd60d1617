use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::collector::traits::FileSystem;

use super::blkid::{BlockIdLookup, identify};
use super::mount::{MountEntry, parse_mount_table, resolve_mount_entry};
use super::usage::VolumeUsage;

/// Measures data volumes and works out which block device holds them.
pub struct VolumeProbe<F: FileSystem> {
    fs: F,
    lookup: Box<dyn BlockIdLookup>,
    mtab_path: PathBuf,
    fs_types: Vec<String>,
}

impl<F: FileSystem> VolumeProbe<F> {
    pub fn new(
        fs: F,
        lookup: Box<dyn BlockIdLookup>,
        mtab_path: impl Into<PathBuf>,
        fs_types: Vec<String>,
    ) -> Self {
        Self {
            fs,
            lookup,
            mtab_path: mtab_path.into(),
            fs_types,
        }
    }

    /// Reads space and inode counters of the filesystem holding `volume`.
    pub fn measure(&self, volume: &str) -> io::Result<VolumeUsage> {
        self.fs.statvfs(Path::new(volume))
    }

    /// Mount entry holding `volume`, re-reading the mount table on each call.
    pub fn mount_entry(&self, volume: &str) -> Option<MountEntry> {
        let content = match self.fs.read_to_string(&self.mtab_path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.mtab_path.display(), "cannot read mount table: {}", e);
                return None;
            }
        };
        let entries = parse_mount_table(&content);
        resolve_mount_entry(&entries, volume, &self.fs_types).cloned()
    }

    /// Stable identifier of the device holding `volume`.
    ///
    /// Without a matching mount entry the volume path itself is used.
    pub fn volume_identifier(&self, volume: &str) -> String {
        match self.mount_entry(volume) {
            Some(entry) => identify(self.lookup.as_ref(), &entry),
            None => {
                debug!(volume = %volume, "no mount entry for volume, using its path");
                volume.to_string()
            }
        }
    }
}
