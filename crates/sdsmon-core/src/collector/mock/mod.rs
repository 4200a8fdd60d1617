//! Mock implementations for testing.
//!
//! This module provides `MockFs`, `MockTransport` and `MockBlockId`, plus
//! pre-built cluster scenarios, so the whole collection cycle can be tested
//! without a running cluster, real volumes or the `blkid` binary.

mod blkid;
mod filesystem;
mod scenarios;
mod transport;

pub use blkid::MockBlockId;
pub use filesystem::MockFs;
pub use scenarios::{ClusterScenario, REGISTRY_ENDPOINT};
pub use transport::MockTransport;
