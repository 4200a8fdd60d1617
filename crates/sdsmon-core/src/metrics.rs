//! Metric points, dotted naming and the publish sink.
//!
//! Every observation the collector makes ends up as one [`MetricPoint`]
//! handed to a [`MetricSink`]. Names are built as
//! `{namespace}.{service_type}.{address}.{stat}` where the address has its
//! dots replaced with underscores (the port separator is kept).

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Kind of a published metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    Gauge,
    Counter,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricType::Gauge => write!(f, "GAUGE"),
            MetricType::Counter => write!(f, "COUNTER"),
        }
    }
}

/// Numeric value of a metric point.
///
/// Integers are kept as integers so large counters survive unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    /// Unsigned counters beyond `i64::MAX`.
    UInt(u64),
    Float(f64),
}

impl MetricValue {
    /// Number of fractional digits needed to print the value without loss.
    ///
    /// Integers need none; floats use their shortest decimal representation.
    pub fn natural_precision(&self) -> u32 {
        match self {
            MetricValue::Int(_) | MetricValue::UInt(_) => 0,
            MetricValue::Float(v) => {
                let text = v.to_string();
                text.split_once('.')
                    .map(|(_, frac)| frac.len() as u32)
                    .unwrap_or(0)
            }
        }
    }

    /// Formats the value with the given number of fractional digits.
    pub fn format(&self, precision: u32) -> String {
        match self {
            MetricValue::Int(v) => v.to_string(),
            MetricValue::UInt(v) => v.to_string(),
            MetricValue::Float(v) => format!("{:.*}", precision as usize, v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

/// A finalized observation, ready to publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: MetricValue,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub precision: u32,
}

impl MetricPoint {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<MetricValue>,
        metric_type: MetricType,
        precision: u32,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            metric_type,
            precision,
        }
    }

    pub fn gauge(name: impl Into<String>, value: impl Into<MetricValue>, precision: u32) -> Self {
        Self::new(name, value, MetricType::Gauge, precision)
    }

    /// Formatted value, honoring the point's precision.
    pub fn formatted_value(&self) -> String {
        self.value.format(self.precision)
    }
}

/// Destination for metric points.
///
/// Sinks are append-only and shared across namespace workers.
pub trait MetricSink: Send + Sync {
    fn publish(&self, point: MetricPoint);
}

/// Sink that keeps every point in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    points: Mutex<Vec<MetricPoint>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all points published so far, in publication order.
    pub fn points(&self) -> Vec<MetricPoint> {
        self.lock().clone()
    }

    /// Returns all points sorted by name.
    pub fn sorted_points(&self) -> Vec<MetricPoint> {
        let mut points = self.points();
        points.sort_by(|a, b| a.name.cmp(&b.name));
        points
    }

    /// Drains the sink.
    pub fn take(&self) -> Vec<MetricPoint> {
        std::mem::take(&mut *self.lock())
    }

    /// Finds the first point with the given name.
    pub fn get(&self, name: &str) -> Option<MetricPoint> {
        self.lock().iter().find(|p| p.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricPoint>> {
        self.points.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MetricSink for MemorySink {
    fn publish(&self, point: MetricPoint) {
        self.lock().push(point);
    }
}

/// Replaces dots in a `host:port` address so it forms a single name segment.
pub fn sanitize_address(address: &str) -> String {
    address.replace('.', "_")
}

/// Builds the per-service prefix `{namespace}.{service_type}.{address}`.
pub fn service_prefix(namespace: &str, service_type: &str, address: &str) -> String {
    format!(
        "{}.{}.{}",
        namespace,
        service_type,
        sanitize_address(address)
    )
}

/// Appends a segment to a dotted metric prefix.
pub fn metric_name(prefix: &str, suffix: &str) -> String {
    format!("{}.{}", prefix, suffix)
}
