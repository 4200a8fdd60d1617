//! Line-oriented output of metric points.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;
use tracing::warn;

use sdsmon_core::metrics::{MetricPoint, MetricSink};

/// Output line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Graphite plaintext: `path value timestamp`.
    #[default]
    Graphite,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Graphite => write!(f, "graphite"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graphite" => Ok(OutputFormat::Graphite),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "unknown output format '{}' (expected graphite or json)",
                other
            )),
        }
    }
}

/// Sink writing one line per point to `W`.
pub struct LineSink<W: Write + Send> {
    writer: Mutex<W>,
    format: OutputFormat,
    path_prefix: String,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W, format: OutputFormat, path_prefix: &str) -> Self {
        Self {
            writer: Mutex::new(writer),
            format,
            path_prefix: path_prefix.trim_matches('.').to_string(),
        }
    }

    /// Full metric path, with the configured prefix.
    fn path(&self, name: &str) -> String {
        if self.path_prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path_prefix, name)
        }
    }

    /// Renders one point stamped with `timestamp` (Unix seconds).
    pub fn format_line(&self, point: &MetricPoint, timestamp: i64) -> String {
        match self.format {
            OutputFormat::Graphite => format!(
                "{} {} {}",
                self.path(&point.name),
                point.formatted_value(),
                timestamp
            ),
            OutputFormat::Json => json!({
                "path": self.path(&point.name),
                "value": point.value,
                "type": point.metric_type,
                "precision": point.precision,
                "timestamp": timestamp,
            })
            .to_string(),
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }

    /// Consumes the sink and returns the writer.
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, W> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> MetricSink for LineSink<W> {
    fn publish(&self, point: MetricPoint) {
        let line = self.format_line(&point, Utc::now().timestamp());
        if let Err(e) = writeln!(self.lock(), "{}", line) {
            warn!(metric = %point.name, "cannot write metric: {}", e);
        }
    }
}
