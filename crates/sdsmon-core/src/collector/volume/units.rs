//! Binary byte units used for volume space metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unit a byte count is converted to before publication.
///
/// Multiples are binary (1 kilobyte = 1024 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteUnit {
    Bit,
    Byte,
    Kilobyte,
    Megabyte,
    Gigabyte,
    Terabyte,
    Petabyte,
}

impl ByteUnit {
    /// Converts a byte count into this unit.
    pub fn convert(&self, bytes: f64) -> f64 {
        match self {
            ByteUnit::Bit => bytes * 8.0,
            ByteUnit::Byte => bytes,
            ByteUnit::Kilobyte => bytes / 1024f64,
            ByteUnit::Megabyte => bytes / 1024f64.powi(2),
            ByteUnit::Gigabyte => bytes / 1024f64.powi(3),
            ByteUnit::Terabyte => bytes / 1024f64.powi(4),
            ByteUnit::Petabyte => bytes / 1024f64.powi(5),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ByteUnit::Bit => "bit",
            ByteUnit::Byte => "byte",
            ByteUnit::Kilobyte => "kilobyte",
            ByteUnit::Megabyte => "megabyte",
            ByteUnit::Gigabyte => "gigabyte",
            ByteUnit::Terabyte => "terabyte",
            ByteUnit::Petabyte => "petabyte",
        }
    }
}

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ByteUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unit = match s {
            "b" => ByteUnit::Bit,
            "B" => ByteUnit::Byte,
            "kB" | "KB" | "KiB" => ByteUnit::Kilobyte,
            "MB" | "MiB" => ByteUnit::Megabyte,
            "GB" | "GiB" => ByteUnit::Gigabyte,
            "TB" | "TiB" => ByteUnit::Terabyte,
            "PB" | "PiB" => ByteUnit::Petabyte,
            _ => match s.to_ascii_lowercase().as_str() {
                "bit" => ByteUnit::Bit,
                "byte" => ByteUnit::Byte,
                "kilobyte" => ByteUnit::Kilobyte,
                "megabyte" => ByteUnit::Megabyte,
                "gigabyte" => ByteUnit::Gigabyte,
                "terabyte" => ByteUnit::Terabyte,
                "petabyte" => ByteUnit::Petabyte,
                _ => return Err(format!("unknown byte unit '{}'", s)),
            },
        };
        Ok(unit)
    }
}
