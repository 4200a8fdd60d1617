//! Space and inode usage of a volume, and its metric points.

use crate::metrics::{MetricPoint, MetricSink, metric_name};

use super::units::ByteUnit;

/// Raw filesystem counters for one volume, as reported by `statvfs`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeUsage {
    pub block_size: u64,
    pub blocks_total: u64,
    pub blocks_free: u64,
    pub blocks_avail: u64,
    pub inodes_total: u64,
    pub inodes_free: u64,
    pub inodes_avail: u64,
}

impl VolumeUsage {
    pub fn blocks_used(&self) -> u64 {
        self.blocks_total.saturating_sub(self.blocks_free)
    }

    pub fn inodes_used(&self) -> u64 {
        self.inodes_total.saturating_sub(self.inodes_free)
    }

    /// Free blocks as a percentage of all blocks; 0 for an empty filesystem.
    pub fn percent_free(&self) -> f64 {
        let denominator = self.blocks_free + self.blocks_used();
        if denominator == 0 {
            return 0.0;
        }
        self.blocks_free as f64 / denominator as f64 * 100.0
    }

    /// Free inodes as a percentage of all inodes, or `None` without inodes.
    pub fn inodes_percent_free(&self) -> Option<f64> {
        if self.inodes_total == 0 {
            return None;
        }
        Some(self.inodes_free as f64 / self.inodes_total as f64 * 100.0)
    }

    fn bytes(&self, blocks: u64) -> f64 {
        self.block_size as f64 * blocks as f64
    }
}

/// Turns a device identifier into a single metric name segment.
///
/// `/dev/sdb1` becomes `dev-sdb1`. UUIDs pass through unchanged.
pub fn volume_segment(identifier: &str) -> String {
    let replaced: String = identifier
        .chars()
        .map(|c| match c {
            '/' | '_' | '.' => '-',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_start_matches('-');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Builds the usage points of one volume.
///
/// Space metrics go under `{prefix}.{volume segment}`, one group of four per
/// unit. Inode metrics go directly under `{prefix}`.
pub fn usage_points(
    prefix: &str,
    usage: &VolumeUsage,
    identifier: &str,
    units: &[ByteUnit],
) -> Vec<MetricPoint> {
    let volume_prefix = metric_name(prefix, &volume_segment(identifier));
    let mut points = Vec::with_capacity(units.len() * 4 + 4);

    for unit in units {
        let name = |suffix: &str| metric_name(&volume_prefix, &format!("{}_{}", unit, suffix));
        points.push(MetricPoint::gauge(name("percentfree"), usage.percent_free(), 2));
        points.push(MetricPoint::gauge(
            name("used"),
            unit.convert(usage.bytes(usage.blocks_used())),
            2,
        ));
        points.push(MetricPoint::gauge(
            name("free"),
            unit.convert(usage.bytes(usage.blocks_free)),
            2,
        ));
        points.push(MetricPoint::gauge(
            name("avail"),
            unit.convert(usage.bytes(usage.blocks_avail)),
            2,
        ));
    }

    if let Some(percent) = usage.inodes_percent_free() {
        points.push(MetricPoint::gauge(
            metric_name(prefix, "inodes_percentfree"),
            percent,
            2,
        ));
    }
    points.push(MetricPoint::gauge(
        metric_name(prefix, "inodes_used"),
        count(usage.inodes_used()),
        0,
    ));
    points.push(MetricPoint::gauge(
        metric_name(prefix, "inodes_free"),
        count(usage.inodes_free),
        0,
    ));
    points.push(MetricPoint::gauge(
        metric_name(prefix, "inodes_avail"),
        count(usage.inodes_avail),
        0,
    ));

    points
}

/// Publishes the usage points of one volume and returns how many were sent.
pub fn publish_usage(
    sink: &dyn MetricSink,
    prefix: &str,
    usage: &VolumeUsage,
    identifier: &str,
    units: &[ByteUnit],
) -> usize {
    let points = usage_points(prefix, usage, identifier, units);
    let published = points.len();
    for point in points {
        sink.publish(point);
    }
    published
}

fn count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
