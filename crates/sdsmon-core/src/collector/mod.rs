//! Storage cluster metrics collector.
//!
//! This module walks the cluster registry ("conscience") of every configured
//! namespace, polls the services running next to it, probes their data
//! volumes, and turns everything into flat dotted metric points.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          SdsCollector                          │
//! │  ┌─────────────────────────┐   ┌────────────────────────────┐  │
//! │  │ NamespaceConfigProvider │   │      ConscienceClient      │  │
//! │  │ - sds.conf, sds.conf.d  │   │ - info?what=types          │  │
//! │  │ - --proxy overrides     │   │ - list?type=...            │  │
//! │  └─────────────────────────┘   └─────────────┬──────────────┘  │
//! │                                              │ LocalityPolicy  │
//! │              ┌───────────────────────────────┼────────────┐    │
//! │              │                               │            │    │
//! │    ┌─────────▼─────────┐          ┌──────────▼───────┐  score  │
//! │    │    VolumeProbe    │          │   StatFetcher    │  only   │
//! │    │ - statvfs         │          │ - GET /stat      │         │
//! │    │ - mtab + blkid    │          │ - POST forward   │         │
//! │    └─────────┬─────────┘          └──────────┬───────┘         │
//! │              │                               │                 │
//! │       ┌──────▼──────┐                ┌───────▼───────┐         │
//! │       │ FileSystem  │ (trait)        │ HttpTransport │ (trait) │
//! │       └──────┬──────┘                └───────┬───────┘         │
//! └──────────────┼───────────────────────────────┼─────────────────┘
//!                │                               │
//!         ┌──────┴──────┐                ┌───────┴──────────┐
//!         │             │                │                  │
//!   ┌─────▼────┐ ┌──────▼─────┐  ┌───────▼────────┐ ┌───────▼───────┐
//!   │  RealFs  │ │   MockFs   │  │ReqwestTransport│ │ MockTransport │
//!   │  (libc)  │ │ (Testing)  │  │   (reqwest)    │ │   (Testing)   │
//!   └──────────┘ └────────────┘  └────────────────┘ └───────────────┘
//! ```
//!
//! # Usage
//!
//! ## Testing (with mocks)
//!
//! ```
//! use sdsmon_core::collector::mock::ClusterScenario;
//! use sdsmon_core::config::CollectorConfig;
//! use sdsmon_core::metrics::MemorySink;
//!
//! let (collector, _transport) = ClusterScenario::typical().into_collector(CollectorConfig::default());
//! let sink = MemorySink::new();
//! let report = collector.collect(&sink);
//! assert_eq!(report.namespaces_collected, 1);
//! assert!(sink.get("OPENIO.rawx.10_0_0_1:6200.score").is_some());
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod conscience;
pub mod locality;
pub mod mock;
pub mod namespace;
pub mod stats;
pub mod traits;
pub mod transport;
pub mod volume;

pub use collector::{CycleReport, NamespaceError, NamespaceSummary, SdsCollector, log_cycle};
pub use conscience::{ConscienceClient, DiscoveryError, Score, ServiceRecord};
pub use locality::LocalityPolicy;
pub use mock::{MockBlockId, MockFs, MockTransport};
pub use namespace::{
    NamespaceConfig, NamespaceConfigProvider, SdsConfProvider, StaticNamespaceProvider,
};
pub use stats::{StatError, StatFetcher, StatParseError, StatSource};
pub use traits::{FileSystem, RealFs};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{HttpMethod, HttpTransport, TransportError};
pub use volume::{BlkidCommand, BlockIdLookup, ByteUnit, CachingBlockIdLookup, VolumeProbe};
