//! Data volume probing for storage nodes.
//!
//! For every local storage node the collector stats the volume named in the
//! instance's tags, identifies the block device behind it, and publishes space
//! and inode usage under `{service prefix}.{device id}`.
//!
//! Identification is best effort: the mount table and the block-id lookup may
//! fail in many ways, and every failure degrades to a fallback identifier.
//! Measuring usage is not: a volume that cannot be statted is reported as an
//! error to the caller.

mod blkid;
mod mount;
mod probe;
mod units;
mod usage;

pub use blkid::{
    BlkidCommand, BlockIdError, BlockIdLookup, CachingBlockIdLookup, identify, lookup_uuid,
    parse_blkid_output,
};
pub use mount::{MountEntry, parse_mount_table, resolve_mount_entry};
pub use probe::VolumeProbe;
pub use units::ByteUnit;
pub use usage::{VolumeUsage, publish_usage, usage_points, volume_segment};
