//! Pre-built cluster scenarios for testing.
//!
//! These scenarios provide a realistic single-node view of a cluster: the
//! namespace configuration, mount table and data volumes on the host, and the
//! registry and service HTTP answers.

use std::sync::Arc;

use super::blkid::MockBlockId;
use super::filesystem::MockFs;
use super::transport::MockTransport;
use crate::collector::collector::SdsCollector;
use crate::collector::conscience::{instances_url, types_url};
use crate::collector::namespace::SdsConfProvider;
use crate::collector::stats::{direct_url, forward_url};
use crate::collector::transport::HttpMethod;
use crate::collector::volume::{VolumeProbe, VolumeUsage};
use crate::config::CollectorConfig;

/// Registry endpoint of the `OPENIO` namespace in [`ClusterScenario::typical`].
pub const REGISTRY_ENDPOINT: &str = "http://10.0.0.1:6000";

/// Host, HTTP and block device state making up one test cluster.
pub struct ClusterScenario {
    pub fs: MockFs,
    pub transport: MockTransport,
    pub blkid: MockBlockId,
}

impl ClusterScenario {
    /// Empty host with no namespace configured.
    pub fn empty() -> Self {
        Self {
            fs: MockFs::new(),
            transport: MockTransport::new(),
            blkid: MockBlockId::new(),
        }
    }

    /// Typical storage node of namespace `OPENIO`.
    ///
    /// The registry proxy runs on `10.0.0.1`. Local services: one `meta0`,
    /// one `meta2` and two `rawx` on separate xfs volumes. `10.0.0.2` hosts a
    /// remote `meta2` and `rawx` that must be ignored.
    pub fn typical() -> Self {
        let mut scenario = Self::empty();

        scenario.fs.add_file(
            "/etc/oio/sds.conf",
            "\
[default]
# shared defaults

[OPENIO]
conscience=10.0.0.1:6000
zookeeper=10.0.0.1:6005
proxy=10.0.0.1:6000
event-agent=beanstalk://10.0.0.1:6014
",
        );
        scenario.fs.add_file(
            "/etc/mtab",
            "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
/dev/sdb1 /mnt/data1 xfs rw,noatime,attr2,inode64 0 0
/dev/sdc1 /mnt/data2 xfs rw,noatime,attr2,inode64 0 0
",
        );
        scenario.fs.add_volume(
            "/mnt/data1",
            VolumeUsage {
                block_size: 4096,
                blocks_total: 1000,
                blocks_free: 250,
                blocks_avail: 200,
                inodes_total: 5000,
                inodes_free: 4000,
                inodes_avail: 4000,
            },
        );
        scenario.fs.add_volume(
            "/mnt/data2",
            VolumeUsage {
                block_size: 4096,
                blocks_total: 2000,
                blocks_free: 1000,
                blocks_avail: 900,
                inodes_total: 0,
                inodes_free: 0,
                inodes_avail: 0,
            },
        );

        scenario.blkid = MockBlockId::new()
            .with_uuid("/dev/sda1", "0c5e7a1d-root")
            .with_uuid("/dev/sdb1", "8f3c2a5e-data1")
            .with_uuid("/dev/sdc1", "4b9d6f10-data2");

        let t = &mut scenario.transport;
        t.respond(
            HttpMethod::Get,
            types_url(REGISTRY_ENDPOINT, "OPENIO"),
            r#"["rawx","meta2","meta0"]"#,
        );
        t.respond(
            HttpMethod::Get,
            instances_url(REGISTRY_ENDPOINT, "OPENIO", "meta0"),
            r#"[{"addr":"10.0.0.1:6001","score":100,"tags":{"tag.up":true}}]"#,
        );
        t.respond(
            HttpMethod::Get,
            instances_url(REGISTRY_ENDPOINT, "OPENIO", "meta2"),
            r#"[
                {"addr":"10.0.0.1:6120","score":95,"tags":{"tag.vol":"/var/lib/oio/meta2-1"}},
                {"addr":"10.0.0.2:6120","score":90,"tags":{}}
            ]"#,
        );
        t.respond(
            HttpMethod::Get,
            instances_url(REGISTRY_ENDPOINT, "OPENIO", "rawx"),
            r#"[
                {"addr":"10.0.0.1:6200","score":97,"tags":{"tag.vol":"/mnt/data1/rawx-1"}},
                {"addr":"10.0.0.1:6201","score":80,"tags":{"tag.vol":"/mnt/data2/rawx-2"}},
                {"addr":"10.0.0.2:6200","score":88,"tags":{"tag.vol":"/mnt/data1/rawx-1"}}
            ]"#,
        );
        t.respond(
            HttpMethod::Get,
            direct_url("10.0.0.1:6200"),
            "\
counter req.hits 1520
counter req.hits.raw 1500
gauge rep.bytes.free 12.5
config service_id rawx-1
",
        );
        t.respond(
            HttpMethod::Get,
            direct_url("10.0.0.1:6201"),
            "counter req.hits 30\n",
        );
        t.respond(
            HttpMethod::Post,
            forward_url(REGISTRY_ENDPOINT, "10.0.0.1:6120"),
            "\
counter req.hits 4096
counter req.time 123456
gauge cnx.client 4
",
        );

        scenario
    }

    /// Builds a collector over this scenario's host and cluster.
    ///
    /// The transport is returned alongside so tests can inspect the requests.
    pub fn into_collector(
        self,
        config: CollectorConfig,
    ) -> (SdsCollector<MockFs>, Arc<MockTransport>) {
        let provider = SdsConfProvider::with_paths(
            self.fs.clone(),
            vec!["/etc/oio/sds.conf".into(), "/etc/oio/sds.conf.d".into()],
        );
        let probe = VolumeProbe::new(
            self.fs,
            Box::new(self.blkid),
            config.mtab_path.clone(),
            config.fs_types.clone(),
        );
        let transport = Arc::new(self.transport);
        let collector = SdsCollector::new(config, Box::new(provider), transport.clone(), probe);
        (collector, transport)
    }
}
