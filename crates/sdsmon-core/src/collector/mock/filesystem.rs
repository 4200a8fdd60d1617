//! In-memory mock filesystem for testing collectors without touching the host.
//!
//! `MockFs` simulates configuration files, the mount table and mounted data
//! volumes, so discovery and volume probing can be exercised anywhere.

use crate::collector::traits::FileSystem;
use crate::collector::volume::VolumeUsage;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Mounted volumes and the usage `statvfs` reports for them.
    volumes: HashMap<PathBuf, VolumeUsage>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Mounts a volume at `path` reporting the given usage.
    pub fn add_volume(&mut self, path: impl AsRef<Path>, usage: VolumeUsage) {
        let path = path.as_ref().to_path_buf();
        self.add_dir(&path);
        self.volumes.insert(path, usage);
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    /// Resolves the deepest mounted volume containing `path`.
    fn statvfs(&self, path: &Path) -> io::Result<VolumeUsage> {
        self.volumes
            .iter()
            .filter(|(mount, _)| path.starts_with(mount))
            .max_by_key(|(mount, _)| mount.components().count())
            .map(|(_, usage)| *usage)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no volume mounted for {:?}", path),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_add_file() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/oio/sds.conf", "[OPENIO]\n");

        let entries = fs.read_dir(Path::new("/etc/oio")).unwrap();
        assert_eq!(entries, vec![PathBuf::from("/etc/oio/sds.conf")]);

        let content = fs.read_to_string(Path::new("/etc/oio/sds.conf")).unwrap();
        assert_eq!(content, "[OPENIO]\n");
    }

    #[test]
    fn test_mock_fs_read_dir() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/oio/sds.conf.d/OPENIO", "a");
        fs.add_file("/etc/oio/sds.conf.d/TEST", "b");
        fs.add_file("/etc/oio/sds.conf", "c");

        let entries = fs.read_dir(Path::new("/etc/oio/sds.conf.d")).unwrap();
        assert_eq!(entries.len(), 2);

        let entries = fs.read_dir(Path::new("/etc/oio")).unwrap();
        assert_eq!(entries.len(), 2); // sds.conf and sds.conf.d
    }

    #[test]
    fn test_mock_fs_statvfs_nested_volumes() {
        let mut fs = MockFs::new();
        fs.add_volume(
            "/",
            VolumeUsage {
                block_size: 4096,
                blocks_total: 10,
                ..Default::default()
            },
        );
        fs.add_volume(
            "/mnt/data1",
            VolumeUsage {
                block_size: 4096,
                blocks_total: 100,
                ..Default::default()
            },
        );

        let usage = fs.statvfs(Path::new("/mnt/data1/rawx-1")).unwrap();
        assert_eq!(usage.blocks_total, 100);

        let usage = fs.statvfs(Path::new("/var/lib")).unwrap();
        assert_eq!(usage.blocks_total, 10);
    }

    #[test]
    fn test_mock_fs_not_found() {
        let fs = MockFs::new();
        let result = fs.read_to_string(Path::new("/nonexistent"));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(fs.statvfs(Path::new("/mnt/data1")).is_err());
    }
}
