//! Namespace configuration lookup.
//!
//! A namespace resolves to the endpoint of its registry proxy. Lookups are
//! performed on every cycle, so edits to the configuration files are picked up
//! without restarting the collector. A namespace without configuration is a
//! normal condition: the provider returns `None` and the cycle moves on.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::traits::FileSystem;
use crate::collector::transport::normalize_endpoint;

/// Key holding the registry proxy endpoint in a namespace section.
pub const PROXY_KEY: &str = "proxy";

/// Resolved configuration of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    pub name: String,
    /// Registry endpoint, always with a scheme and without a trailing slash.
    pub registry_endpoint: String,
}

impl NamespaceConfig {
    pub fn new(name: impl Into<String>, registry_endpoint: &str) -> Self {
        Self {
            name: name.into(),
            registry_endpoint: normalize_endpoint(registry_endpoint),
        }
    }
}

/// Resolves a namespace name to its configuration.
pub trait NamespaceConfigProvider: Send + Sync {
    fn resolve(&self, namespace: &str) -> Option<NamespaceConfig>;
}

/// Reads namespace sections from INI-style `sds.conf` files.
///
/// Every search path is either a file or a directory whose files are read in
/// name order. Later files override keys of earlier ones.
pub struct SdsConfProvider<F: FileSystem> {
    fs: F,
    search_paths: Vec<PathBuf>,
}

impl<F: FileSystem> SdsConfProvider<F> {
    /// Creates a provider over the standard locations.
    pub fn new(fs: F) -> Self {
        Self::with_paths(fs, Self::default_search_paths())
    }

    pub fn with_paths(fs: F, search_paths: Vec<PathBuf>) -> Self {
        Self { fs, search_paths }
    }

    /// `/etc/oio/sds.conf`, `/etc/oio/sds.conf.d/` and `$HOME/.oio/sds.conf`.
    pub fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("/etc/oio/sds.conf"),
            PathBuf::from("/etc/oio/sds.conf.d"),
        ];
        if let Ok(home) = std::env::var("HOME") {
            paths.push(Path::new(&home).join(".oio/sds.conf"));
        }
        paths
    }

    fn config_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in &self.search_paths {
            match self.fs.read_dir(path) {
                Ok(mut entries) => {
                    entries.sort();
                    files.extend(entries);
                }
                Err(_) => files.push(path.clone()),
            }
        }
        files
    }

    fn load_sections(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

        for file in self.config_files() {
            let content = match self.fs.read_to_string(&file) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %file.display(), "cannot read namespace configuration: {}", e);
                    continue;
                }
            };

            for (section, keys) in parse_ini(&content) {
                sections.entry(section).or_default().extend(keys);
            }
        }

        sections
    }
}

impl<F: FileSystem> NamespaceConfigProvider for SdsConfProvider<F> {
    fn resolve(&self, namespace: &str) -> Option<NamespaceConfig> {
        let mut keys = self.load_sections().remove(namespace)?;
        let Some(proxy) = keys.remove(PROXY_KEY) else {
            debug!(namespace, "namespace section has no {} key", PROXY_KEY);
            return None;
        };

        Some(NamespaceConfig::new(namespace, &proxy))
    }
}

/// Explicit `namespace → endpoint` table, typically from the command line.
#[derive(Default)]
pub struct StaticNamespaceProvider {
    endpoints: BTreeMap<String, String>,
    fallback: Option<Box<dyn NamespaceConfigProvider>>,
}

impl StaticNamespaceProvider {
    pub fn new(endpoints: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            endpoints: endpoints.into_iter().collect(),
            fallback: None,
        }
    }

    /// Consults `fallback` for namespaces missing from the table.
    pub fn with_fallback(mut self, fallback: Box<dyn NamespaceConfigProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl NamespaceConfigProvider for StaticNamespaceProvider {
    fn resolve(&self, namespace: &str) -> Option<NamespaceConfig> {
        match self.endpoints.get(namespace) {
            Some(endpoint) => Some(NamespaceConfig::new(namespace, endpoint)),
            None => self.fallback.as_ref()?.resolve(namespace),
        }
    }
}

/// Parses a `NAMESPACE=ENDPOINT` override.
pub fn parse_endpoint_override(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((ns, endpoint)) if !ns.trim().is_empty() && !endpoint.trim().is_empty() => {
            Ok((ns.trim().to_string(), endpoint.trim().to_string()))
        }
        _ => Err(format!("expected NAMESPACE=ENDPOINT, got '{}'", value)),
    }
}

/// Parses INI content into `section → key → value`.
///
/// Keys are lowercased; `#` and `;` start comments; both `key=value` and
/// `key: value` are accepted. Keys outside any section are ignored.
pub fn parse_ini(content: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(section) = current.as_ref() else {
            continue;
        };

        let separator = match (line.find('='), line.find(':')) {
            (Some(eq), Some(colon)) => Some(eq.min(colon)),
            (eq, colon) => eq.or(colon),
        };
        if let Some(idx) = separator {
            let key = line[..idx].trim().to_lowercase();
            let value = line[idx + 1..].trim().to_string();
            if !key.is_empty() {
                sections
                    .entry(section.clone())
                    .or_default()
                    .insert(key, value);
            }
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    #[test]
    fn test_parse_ini() {
        let content = "\
# global settings
[OPENIO]
proxy=127.0.0.1:6000
Conscience = 127.0.0.1:6001
; comment
zookeeper: 127.0.0.1:2181

[TEST]
proxy=http://10.0.0.1:6000
";
        let sections = parse_ini(content);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections["OPENIO"]["proxy"], "127.0.0.1:6000");
        assert_eq!(sections["OPENIO"]["conscience"], "127.0.0.1:6001");
        assert_eq!(sections["OPENIO"]["zookeeper"], "127.0.0.1:2181");
        assert_eq!(sections["TEST"]["proxy"], "http://10.0.0.1:6000");
    }

    #[test]
    fn test_sds_conf_resolve() {
        let mut fs = MockFs::new();
        fs.add_file(
            "/etc/oio/sds.conf",
            "[OPENIO]\nproxy=127.0.0.1:6000\nns.chunk_size=1048576\n",
        );
        let provider =
            SdsConfProvider::with_paths(fs, vec![PathBuf::from("/etc/oio/sds.conf")]);

        let config = provider.resolve("OPENIO").unwrap();
        assert_eq!(config.name, "OPENIO");
        assert_eq!(config.registry_endpoint, "http://127.0.0.1:6000");

        assert!(provider.resolve("UNKNOWN").is_none());
    }

    #[test]
    fn test_sds_conf_directory_overrides() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/oio/sds.conf", "[OPENIO]\nproxy=10.0.0.1:6000\n");
        fs.add_file("/etc/oio/sds.conf.d/OPENIO", "[OPENIO]\nproxy=10.0.0.2:6000\n");
        fs.add_file("/etc/oio/sds.conf.d/TEST", "[TEST]\nproxy=10.0.0.3:6000\n");
        let provider = SdsConfProvider::with_paths(
            fs,
            vec![
                PathBuf::from("/etc/oio/sds.conf"),
                PathBuf::from("/etc/oio/sds.conf.d"),
            ],
        );

        assert_eq!(
            provider.resolve("OPENIO").unwrap().registry_endpoint,
            "http://10.0.0.2:6000"
        );
        assert_eq!(
            provider.resolve("TEST").unwrap().registry_endpoint,
            "http://10.0.0.3:6000"
        );
    }

    #[test]
    fn test_section_without_proxy_is_missing() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/oio/sds.conf", "[OPENIO]\nconscience=127.0.0.1:6001\n");
        let provider =
            SdsConfProvider::with_paths(fs, vec![PathBuf::from("/etc/oio/sds.conf")]);
        assert!(provider.resolve("OPENIO").is_none());
    }

    #[test]
    fn test_missing_files_are_ignored() {
        let provider = SdsConfProvider::with_paths(
            MockFs::new(),
            vec![PathBuf::from("/etc/oio/sds.conf")],
        );
        assert!(provider.resolve("OPENIO").is_none());
    }

    #[test]
    fn test_static_provider_with_fallback() {
        let mut fs = MockFs::new();
        fs.add_file("/etc/oio/sds.conf", "[OPENIO]\nproxy=10.0.0.1:6000\n");
        let fallback =
            SdsConfProvider::with_paths(fs, vec![PathBuf::from("/etc/oio/sds.conf")]);

        let provider = StaticNamespaceProvider::new([(
            "TEST".to_string(),
            "10.0.0.9:6000".to_string(),
        )])
        .with_fallback(Box::new(fallback));

        assert_eq!(
            provider.resolve("TEST").unwrap().registry_endpoint,
            "http://10.0.0.9:6000"
        );
        assert_eq!(
            provider.resolve("OPENIO").unwrap().registry_endpoint,
            "http://10.0.0.1:6000"
        );
        assert!(provider.resolve("OTHER").is_none());
    }

    #[test]
    fn test_parse_endpoint_override() {
        assert_eq!(
            parse_endpoint_override("OPENIO=10.0.0.1:6000").unwrap(),
            ("OPENIO".to_string(), "10.0.0.1:6000".to_string())
        );
        assert!(parse_endpoint_override("OPENIO").is_err());
        assert!(parse_endpoint_override("=10.0.0.1:6000").is_err());
    }
}
