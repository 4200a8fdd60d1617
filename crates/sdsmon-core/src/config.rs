//! Collector configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::locality::LocalityPolicy;
use crate::collector::volume::ByteUnit;

/// Default namespace polled when none is configured.
pub const DEFAULT_NAMESPACE: &str = "OPENIO";

/// How the collector treats instances of a given service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Stores data on a local volume: probe the volume, then read `/stat` directly.
    StorageNode,
    /// Only reachable through the registry: ask it to forward a stats request.
    ForwardedStats,
    /// Publish the score and nothing else.
    ScoreOnly,
}

/// Settings for one collector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Namespaces polled on every cycle, in order.
    pub namespaces: Vec<String>,
    /// Filesystem types considered when resolving a volume's mount entry.
    pub fs_types: Vec<String>,
    /// Units in which volume space metrics are published.
    pub byte_units: Vec<ByteUnit>,
    /// Which discovered instances count as local to the registry endpoint.
    pub locality: LocalityPolicy,
    /// Service types that own a data volume.
    pub storage_types: Vec<String>,
    /// Service types whose stats go through the registry forwarder.
    pub forwarded_types: Vec<String>,
    /// Tag carrying the data volume path of a storage node.
    pub volume_tag: String,
    /// Mount table consulted for block device identification.
    pub mtab_path: PathBuf,
    /// Per-request timeout for registry and service calls, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum number of namespaces processed concurrently.
    pub namespace_workers: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
            fs_types: vec!["xfs".to_string(), "ext4".to_string()],
            byte_units: vec![ByteUnit::Byte],
            locality: LocalityPolicy::default(),
            storage_types: vec!["rawx".to_string()],
            forwarded_types: vec!["meta2".to_string()],
            volume_tag: "tag.vol".to_string(),
            mtab_path: PathBuf::from("/etc/mtab"),
            request_timeout_secs: 10,
            namespace_workers: 1,
        }
    }
}

impl CollectorConfig {
    /// Returns the role assigned to a service type.
    pub fn role_of(&self, service_type: &str) -> ServiceRole {
        if self.storage_types.iter().any(|t| t == service_type) {
            ServiceRole::StorageNode
        } else if self.forwarded_types.iter().any(|t| t == service_type) {
            ServiceRole::ForwardedStats
        } else {
            ServiceRole::ScoreOnly
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Worker count, never below one.
    pub fn workers(&self) -> usize {
        self.namespace_workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roles() {
        let config = CollectorConfig::default();
        assert_eq!(config.role_of("rawx"), ServiceRole::StorageNode);
        assert_eq!(config.role_of("meta2"), ServiceRole::ForwardedStats);
        assert_eq!(config.role_of("meta0"), ServiceRole::ScoreOnly);
        assert_eq!(config.role_of("rdir"), ServiceRole::ScoreOnly);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CollectorConfig =
            serde_json::from_str(r#"{"namespaces":["NS1","NS2"],"locality":"exact"}"#).unwrap();
        assert_eq!(config.namespaces, vec!["NS1", "NS2"]);
        assert_eq!(config.locality, LocalityPolicy::Exact);
        assert_eq!(config.fs_types, vec!["xfs", "ext4"]);
        assert_eq!(config.byte_units, vec![ByteUnit::Byte]);
    }

    #[test]
    fn test_workers_floor() {
        let config = CollectorConfig {
            namespace_workers: 0,
            ..Default::default()
        };
        assert_eq!(config.workers(), 1);
    }
}
