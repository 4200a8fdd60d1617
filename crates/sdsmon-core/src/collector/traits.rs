//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait lets the collector read namespace configuration and
//! the mount table, and stat data volumes, either on the real host or against
//! an in-memory mock.

use std::io;
use std::path::{Path, PathBuf};

use crate::collector::volume::VolumeUsage;

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Reads space and inode statistics of the filesystem holding `path`.
    ///
    /// # Returns
    /// The usage counters, or an I/O error if the path cannot be statted
    /// (for example an unmounted volume).
    fn statvfs(&self, path: &Path) -> io::Result<VolumeUsage>;
}

/// Real filesystem implementation that delegates to `std::fs` and `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    #[cfg(unix)]
    #[allow(clippy::unnecessary_cast)]
    fn statvfs(&self, path: &Path) -> io::Result<VolumeUsage> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `stat` is a plain C struct, zeroed memory is a valid value,
        // and `c_path` is a NUL-terminated string that outlives the call.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(VolumeUsage {
            block_size: stat.f_bsize as u64,
            blocks_total: stat.f_blocks as u64,
            blocks_free: stat.f_bfree as u64,
            blocks_avail: stat.f_bavail as u64,
            inodes_total: stat.f_files as u64,
            inodes_free: stat.f_ffree as u64,
            inodes_avail: stat.f_favail as u64,
        })
    }

    #[cfg(not(unix))]
    fn statvfs(&self, _path: &Path) -> io::Result<VolumeUsage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "statvfs is not available on this platform",
        ))
    }
}
