//! Block device identification.
//!
//! The stable identifier of a volume is the filesystem UUID reported by the
//! block-id lookup for the device behind its mount entry. When the lookup
//! cannot produce one, the device path is used instead.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

use tracing::{debug, warn};

use super::mount::MountEntry;

/// Error type for block-id lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockIdError {
    /// The lookup tool could not be started.
    Spawn { program: String, message: String },
    /// The lookup tool exited unsuccessfully.
    ExitStatus {
        device: String,
        code: Option<i32>,
        stderr: String,
    },
    /// The lookup tool printed something that is not UTF-8.
    Utf8 { device: String },
    /// The lookup succeeded but reported no UUID.
    MissingUuid { device: String },
}

impl fmt::Display for BlockIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockIdError::Spawn { program, message } => {
                write!(f, "cannot run {}: {}", program, message)
            }
            BlockIdError::ExitStatus {
                device,
                code,
                stderr,
            } => match code {
                Some(code) => write!(f, "lookup of {} exited with {}: {}", device, code, stderr),
                None => write!(f, "lookup of {} killed by signal: {}", device, stderr),
            },
            BlockIdError::Utf8 { device } => write!(f, "lookup of {} returned invalid UTF-8", device),
            BlockIdError::MissingUuid { device } => write!(f, "no UUID reported for {}", device),
        }
    }
}

impl std::error::Error for BlockIdError {}

/// Maps a block device to its identifying attributes (`UUID`, `TYPE`, ...).
pub trait BlockIdLookup: Send + Sync {
    fn probe(&self, device: &str) -> Result<BTreeMap<String, String>, BlockIdError>;
}

/// Lookup that runs the `blkid` utility.
#[derive(Debug, Clone)]
pub struct BlkidCommand {
    program: PathBuf,
}

impl Default for BlkidCommand {
    fn default() -> Self {
        Self::new("blkid")
    }
}

impl BlkidCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl BlockIdLookup for BlkidCommand {
    fn probe(&self, device: &str) -> Result<BTreeMap<String, String>, BlockIdError> {
        let output = Command::new(&self.program)
            .arg(device)
            .output()
            .map_err(|e| BlockIdError::Spawn {
                program: self.program.display().to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BlockIdError::ExitStatus {
                device: device.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|_| BlockIdError::Utf8 {
            device: device.to_string(),
        })?;
        Ok(parse_blkid_output(&stdout))
    }
}

/// Memoizes successful lookups of another [`BlockIdLookup`].
///
/// Filesystem UUIDs do not change while a device stays mounted, so one lookup
/// per device is enough for the lifetime of the collector. Failures are not
/// cached and are retried on the next call.
pub struct CachingBlockIdLookup<L: BlockIdLookup> {
    inner: L,
    cache: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl<L: BlockIdLookup> CachingBlockIdLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached devices.
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: BlockIdLookup> BlockIdLookup for CachingBlockIdLookup<L> {
    fn probe(&self, device: &str) -> Result<BTreeMap<String, String>, BlockIdError> {
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(device)
        {
            return Ok(hit.clone());
        }

        let attributes = self.inner.probe(device)?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(device.to_string(), attributes.clone());
        Ok(attributes)
    }
}

/// Parses `blkid` output into `KEY → VALUE`.
///
/// Accepts the default format (`/dev/sdb1: UUID="..." TYPE="xfs"`) as well as
/// `-o export` (one `KEY=VALUE` per line). Double-quoted values may contain
/// spaces and backslash escapes.
pub fn parse_blkid_output(output: &str) -> BTreeMap<String, String> {
    let body = match output.split_once(": ") {
        Some((label, rest)) if !label.contains('=') => rest,
        _ => output,
    };

    let mut pairs = BTreeMap::new();
    let mut chars = body.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            // Bare token without a value.
            continue;
        }
        chars.next();

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }

        if !key.is_empty() {
            pairs.insert(key, value);
        }
    }

    pairs
}

/// Looks up the filesystem UUID of `device`.
pub fn lookup_uuid(lookup: &dyn BlockIdLookup, device: &str) -> Result<String, BlockIdError> {
    let mut attributes = lookup.probe(device)?;
    match attributes.remove("UUID") {
        Some(uuid) if !uuid.is_empty() => Ok(uuid),
        _ => Err(BlockIdError::MissingUuid {
            device: device.to_string(),
        }),
    }
}

/// Returns the stable identifier of a mount entry's device.
///
/// Never fails: any lookup error is logged and the device path is returned.
pub fn identify(lookup: &dyn BlockIdLookup, entry: &MountEntry) -> String {
    match lookup_uuid(lookup, &entry.device) {
        Ok(uuid) => {
            debug!(device = %entry.device, uuid = %uuid, "identified block device");
            uuid
        }
        Err(e) => {
            warn!(
                device = %entry.device,
                mount_point = %entry.mount_point,
                "block device identification failed, using device path: {}",
                e
            );
            entry.device.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockBlockId;

    fn entry(device: &str) -> MountEntry {
        MountEntry {
            device: device.to_string(),
            mount_point: "/mnt/data1".to_string(),
            fs_type: "xfs".to_string(),
        }
    }

    #[test]
    fn test_parse_default_format() {
        let out = "/dev/sdb1: UUID=\"8f3c2a5e-1b7d-4c1e-9f0a-2d4b6c8e0f12\" BLOCK_SIZE=\"4096\" TYPE=\"xfs\" PARTUUID=\"0f1e2d3c-01\"\n";
        let pairs = parse_blkid_output(out);
        assert_eq!(pairs["UUID"], "8f3c2a5e-1b7d-4c1e-9f0a-2d4b6c8e0f12");
        assert_eq!(pairs["TYPE"], "xfs");
        assert_eq!(pairs["BLOCK_SIZE"], "4096");
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn test_parse_export_format() {
        let out = "DEVNAME=/dev/sdb1\nUUID=1234-ABCD\nTYPE=vfat\n";
        let pairs = parse_blkid_output(out);
        assert_eq!(pairs["DEVNAME"], "/dev/sdb1");
        assert_eq!(pairs["UUID"], "1234-ABCD");
    }

    #[test]
    fn test_parse_quoted_spaces_and_escapes() {
        let out = "/dev/sdc1: LABEL=\"data \\\"one\\\"\" UUID=\"abc\"\n";
        let pairs = parse_blkid_output(out);
        assert_eq!(pairs["LABEL"], "data \"one\"");
        assert_eq!(pairs["UUID"], "abc");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_blkid_output("").is_empty());
    }

    #[test]
    fn test_identify_uuid() {
        let lookup = MockBlockId::new().with_uuid("/dev/sdb1", "8f3c2a5e");
        assert_eq!(identify(&lookup, &entry("/dev/sdb1")), "8f3c2a5e");
    }

    #[test]
    fn test_identify_falls_back_to_device() {
        let lookup = MockBlockId::new();
        assert_eq!(identify(&lookup, &entry("/dev/sdz9")), "/dev/sdz9");

        let lookup = MockBlockId::new().with_attributes("/dev/sdb1", [("TYPE", "xfs")]);
        assert_eq!(identify(&lookup, &entry("/dev/sdb1")), "/dev/sdb1");
    }

    #[test]
    fn test_identify_missing_tool() {
        let lookup = BlkidCommand::new("/nonexistent/bin/blkid-12345");
        assert_eq!(identify(&lookup, &entry("/dev/sdb1")), "/dev/sdb1");
        assert!(matches!(
            lookup.probe("/dev/sdb1"),
            Err(BlockIdError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_nonzero_exit() {
        let lookup = BlkidCommand::new("false");
        match lookup.probe("/dev/sdb1") {
            Err(BlockIdError::ExitStatus { device, code, .. }) => {
                assert_eq!(device, "/dev/sdb1");
                assert_eq!(code, Some(1));
            }
            other => panic!("expected exit status error, got {:?}", other),
        }
        assert_eq!(identify(&lookup, &entry("/dev/sdb1")), "/dev/sdb1");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_parses_stdout() {
        // `echo` prints its argument back, standing in for blkid output.
        let lookup = BlkidCommand::new("echo");
        let pairs = lookup
            .probe("/dev/sdc1: UUID=\"4b9d6f10-data2\" TYPE=\"xfs\"")
            .unwrap();
        assert_eq!(pairs["UUID"], "4b9d6f10-data2");
        assert_eq!(pairs["TYPE"], "xfs");
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_caching_lookup() {
        let inner = MockBlockId::new().with_uuid("/dev/sdb1", "8f3c2a5e");
        let lookup = CachingBlockIdLookup::new(inner);

        assert_eq!(lookup_uuid(&lookup, "/dev/sdb1").unwrap(), "8f3c2a5e");
        assert_eq!(lookup_uuid(&lookup, "/dev/sdb1").unwrap(), "8f3c2a5e");
        assert_eq!(lookup.inner.probe_count(), 1);

        // Failures are not cached.
        assert!(lookup.probe("/dev/sdz9").is_err());
        assert!(lookup.probe("/dev/sdz9").is_err());
        assert_eq!(lookup.inner.probe_count(), 3);
        assert_eq!(lookup.len(), 1);
    }
}
