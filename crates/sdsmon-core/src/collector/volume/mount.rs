//! Mount table parsing and volume → mount entry resolution.

/// One mounted filesystem from `/etc/mtab` or `/proc/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
}

/// Parses a mount table.
/// Format: "device mountpoint fstype options dump pass", one entry per line.
/// Lines with fewer than three fields are skipped.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                device: unescape_octal(device),
                mount_point: unescape_octal(mount_point),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Finds the mount entry holding `volume`.
///
/// The first non-root entry whose mount point is a string prefix of `volume`
/// and whose filesystem type is allowed wins, even if a later entry would be
/// a longer match. Without such an entry the root mount is used.
pub fn resolve_mount_entry<'a>(
    entries: &'a [MountEntry],
    volume: &str,
    allowed_fs_types: &[String],
) -> Option<&'a MountEntry> {
    let mut root = None;
    for entry in entries {
        if entry.mount_point == "/" {
            if root.is_none() {
                root = Some(entry);
            }
            continue;
        }
        if allowed_fs_types.iter().any(|t| *t == entry.fs_type)
            && volume.starts_with(entry.mount_point.as_str())
        {
            return Some(entry);
        }
    }
    root
}

/// Decodes the `\040`-style octal escapes the kernel uses for spaces and tabs.
fn unescape_octal(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let code = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(code) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
