//! sdsmon-core - shared library for the sdsmon collector.
//!
//! Provides:
//! - `collector` - registry discovery, stat retrieval, volume probing and the
//!   per-cycle orchestration that ties them together
//! - `metrics` - metric points, dotted naming and the publish sink
//! - `config` - collector configuration

pub mod collector;
pub mod config;
pub mod metrics;
