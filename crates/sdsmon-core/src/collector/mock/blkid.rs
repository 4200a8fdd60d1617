//! Scripted block-id lookup.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collector::volume::{BlockIdError, BlockIdLookup};

/// Block-id lookup answering from a fixed device table.
///
/// Unknown devices fail the way `blkid` does for a device it cannot probe
/// (exit status 2).
#[derive(Debug, Default)]
pub struct MockBlockId {
    devices: HashMap<String, BTreeMap<String, String>>,
    probes: AtomicUsize,
}

impl MockBlockId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device with the given filesystem UUID.
    pub fn with_uuid(self, device: &str, uuid: &str) -> Self {
        self.with_attributes(device, [("UUID", uuid)])
    }

    /// Registers a device with arbitrary attributes.
    pub fn with_attributes<'a>(
        mut self,
        device: &str,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let entry = self.devices.entry(device.to_string()).or_default();
        for (key, value) in attributes {
            entry.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Number of probes made so far.
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

impl BlockIdLookup for MockBlockId {
    fn probe(&self, device: &str) -> Result<BTreeMap<String, String>, BlockIdError> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        self.devices
            .get(device)
            .cloned()
            .ok_or_else(|| BlockIdError::ExitStatus {
                device: device.to_string(),
                code: Some(2),
                stderr: String::new(),
            })
    }
}
