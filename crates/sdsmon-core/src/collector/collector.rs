//! Collection cycle orchestrator.
//!
//! The `SdsCollector` walks every configured namespace: it resolves the
//! registry endpoint, discovers service types and their instances, keeps the
//! instances local to the registry host, and publishes each one's score plus
//! the metrics its role calls for.

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::collector::conscience::{ConscienceClient, DiscoveryError, ServiceRecord};
use crate::collector::locality::endpoint_host;
use crate::collector::namespace::{NamespaceConfig, NamespaceConfigProvider};
use crate::collector::stats::{StatFetcher, StatParseError, StatSource};
use crate::collector::traits::FileSystem;
use crate::collector::transport::HttpTransport;
use crate::collector::volume::{VolumeProbe, publish_usage};
use crate::config::{CollectorConfig, ServiceRole};
use crate::metrics::{MetricPoint, MetricSink, metric_name, service_prefix};

/// Volume assumed for a storage node whose tags do not name one.
const DEFAULT_VOLUME: &str = "/";

/// Error type for a namespace that could not be fully processed.
#[derive(Debug, Clone, PartialEq)]
pub enum NamespaceError {
    /// No configuration resolves this namespace; it is skipped.
    ConfigurationMissing { namespace: String },
    /// Type or instance listing failed; the rest of the namespace is abandoned.
    Discovery {
        namespace: String,
        source: DiscoveryError,
    },
}

impl fmt::Display for NamespaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceError::ConfigurationMissing { namespace } => {
                write!(f, "no configuration found for namespace {}", namespace)
            }
            NamespaceError::Discovery { namespace, source } => {
                write!(f, "discovery failed for namespace {}: {}", namespace, source)
            }
        }
    }
}

impl std::error::Error for NamespaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NamespaceError::ConfigurationMissing { .. } => None,
            NamespaceError::Discovery { source, .. } => Some(source),
        }
    }
}

/// What one namespace contributed to a cycle.
///
/// Counters include work done before a discovery failure abandoned the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceSummary {
    pub namespace: String,
    pub services_polled: usize,
    pub points_published: usize,
    pub stat_failures: usize,
    pub stat_parse_errors: usize,
    pub volume_failures: usize,
    pub error: Option<NamespaceError>,
}

impl NamespaceSummary {
    fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            services_polled: 0,
            points_published: 0,
            stat_failures: 0,
            stat_parse_errors: 0,
            volume_failures: 0,
            error: None,
        }
    }

    fn publish(&mut self, sink: &dyn MetricSink, point: MetricPoint) {
        sink.publish(point);
        self.points_published += 1;
    }
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Namespaces processed to the end.
    pub namespaces_collected: usize,
    /// Namespaces without configuration.
    pub namespaces_skipped: usize,
    /// Namespaces abandoned after a discovery failure.
    pub namespaces_failed: usize,
    pub services_polled: usize,
    pub points_published: usize,
    pub stat_failures: usize,
    pub volume_failures: usize,
    /// Wall time of the cycle.
    pub elapsed: Duration,
    /// Per-namespace detail, in configuration order.
    pub namespaces: Vec<NamespaceSummary>,
}

impl CycleReport {
    fn from_summaries(namespaces: Vec<NamespaceSummary>, elapsed: Duration) -> Self {
        let mut report = CycleReport {
            elapsed,
            ..Default::default()
        };
        for summary in &namespaces {
            match summary.error {
                None => report.namespaces_collected += 1,
                Some(NamespaceError::ConfigurationMissing { .. }) => report.namespaces_skipped += 1,
                Some(NamespaceError::Discovery { .. }) => report.namespaces_failed += 1,
            }
            report.services_polled += summary.services_polled;
            report.points_published += summary.points_published;
            report.stat_failures += summary.stat_failures;
            report.volume_failures += summary.volume_failures;
        }
        report.namespaces = namespaces;
        report
    }
}

/// Drives discovery, stat retrieval and volume probing for a set of namespaces.
pub struct SdsCollector<F: FileSystem> {
    config: CollectorConfig,
    provider: Box<dyn NamespaceConfigProvider>,
    conscience: ConscienceClient,
    stats: StatFetcher,
    probe: VolumeProbe<F>,
}

impl<F: FileSystem> SdsCollector<F> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `config` - Namespaces, role tables and output settings
    /// * `provider` - Resolves namespaces to registry endpoints
    /// * `transport` - HTTP client shared by discovery and stat retrieval
    /// * `probe` - Volume measurement and device identification
    pub fn new(
        config: CollectorConfig,
        provider: Box<dyn NamespaceConfigProvider>,
        transport: Arc<dyn HttpTransport>,
        probe: VolumeProbe<F>,
    ) -> Self {
        Self {
            config,
            provider,
            conscience: ConscienceClient::new(transport.clone()),
            stats: StatFetcher::new(transport),
            probe,
        }
    }

    /// Runs one collection cycle, publishing every point to `sink`.
    ///
    /// Never fails as a whole: each namespace succeeds or fails on its own
    /// and the outcome is returned in the report.
    pub fn collect(&self, sink: &dyn MetricSink) -> CycleReport {
        let start = Instant::now();
        let namespaces = &self.config.namespaces;
        let workers = self.config.workers().min(namespaces.len());

        let summaries = if workers <= 1 {
            namespaces
                .iter()
                .map(|ns| self.collect_namespace(ns, sink))
                .collect()
        } else {
            self.collect_parallel(namespaces, workers, sink)
        };

        CycleReport::from_summaries(summaries, start.elapsed())
    }

    fn collect_parallel(
        &self,
        namespaces: &[String],
        workers: usize,
        sink: &dyn MetricSink,
    ) -> Vec<NamespaceSummary> {
        let next = AtomicUsize::new(0);
        let done = Mutex::new(Vec::with_capacity(namespaces.len()));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let idx = next.fetch_add(1, Ordering::Relaxed);
                        let Some(namespace) = namespaces.get(idx) else {
                            break;
                        };
                        let summary = self.collect_namespace(namespace, sink);
                        done.lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push((idx, summary));
                    }
                });
            }
        });

        let mut done = done.into_inner().unwrap_or_else(|e| e.into_inner());
        done.sort_by_key(|(idx, _)| *idx);
        done.into_iter().map(|(_, summary)| summary).collect()
    }

    fn collect_namespace(&self, namespace: &str, sink: &dyn MetricSink) -> NamespaceSummary {
        let mut summary = NamespaceSummary::new(namespace);

        if let Err(e) = self.walk_namespace(namespace, sink, &mut summary) {
            match &e {
                NamespaceError::ConfigurationMissing { .. } => {
                    warn!(namespace, "{}", e);
                }
                NamespaceError::Discovery { .. } => {
                    error!(namespace, "{}", e);
                }
            }
            summary.error = Some(e);
        }

        debug!(
            namespace,
            services = summary.services_polled,
            points = summary.points_published,
            "namespace done"
        );
        summary
    }

    fn walk_namespace(
        &self,
        namespace: &str,
        sink: &dyn MetricSink,
        summary: &mut NamespaceSummary,
    ) -> Result<(), NamespaceError> {
        let ns_config =
            self.provider
                .resolve(namespace)
                .ok_or_else(|| NamespaceError::ConfigurationMissing {
                    namespace: namespace.to_string(),
                })?;
        let endpoint = ns_config.registry_endpoint.as_str();
        let registry_host = endpoint_host(endpoint);
        let discovery = |source| NamespaceError::Discovery {
            namespace: namespace.to_string(),
            source,
        };

        let types = self
            .conscience
            .list_types(endpoint, namespace)
            .map_err(discovery)?;
        debug!(namespace, endpoint, types = types.len(), "discovered service types");

        for service_type in &types {
            let instances = self
                .conscience
                .list_instances(endpoint, namespace, service_type)
                .map_err(discovery)?;
            let role = self.config.role_of(service_type);

            for record in instances
                .iter()
                .filter(|r| self.config.locality.is_local(&r.address, registry_host))
            {
                self.collect_instance(&ns_config, role, record, sink, summary);
            }
        }

        Ok(())
    }

    fn collect_instance(
        &self,
        ns_config: &NamespaceConfig,
        role: ServiceRole,
        record: &ServiceRecord,
        sink: &dyn MetricSink,
        summary: &mut NamespaceSummary,
    ) {
        summary.services_polled += 1;
        let namespace = ns_config.name.as_str();
        let prefix = service_prefix(namespace, &record.service_type, &record.address);

        match record.score.value() {
            Some(score) => {
                let point =
                    MetricPoint::gauge(metric_name(&prefix, "score"), score, score.natural_precision());
                summary.publish(sink, point);
            }
            None => debug!(
                namespace,
                service_type = %record.service_type,
                address = %record.address,
                "score unavailable"
            ),
        }

        match role {
            ServiceRole::StorageNode => {
                let volume = record
                    .tag(&self.config.volume_tag)
                    .filter(|v| !v.is_empty())
                    .unwrap_or(DEFAULT_VOLUME);
                self.collect_volume(namespace, record, &prefix, volume, sink, summary);
                self.collect_stats(namespace, record, &prefix, StatSource::Direct, sink, summary);
            }
            ServiceRole::ForwardedStats => {
                let source = StatSource::Forwarded {
                    registry_endpoint: &ns_config.registry_endpoint,
                };
                self.collect_stats(namespace, record, &prefix, source, sink, summary);
            }
            ServiceRole::ScoreOnly => {}
        }
    }

    fn collect_volume(
        &self,
        namespace: &str,
        record: &ServiceRecord,
        prefix: &str,
        volume: &str,
        sink: &dyn MetricSink,
        summary: &mut NamespaceSummary,
    ) {
        let usage = match self.probe.measure(volume) {
            Ok(usage) => usage,
            Err(e) => {
                warn!(
                    namespace,
                    service_type = %record.service_type,
                    address = %record.address,
                    volume,
                    "cannot measure volume: {}",
                    e
                );
                summary.volume_failures += 1;
                return;
            }
        };

        let identifier = self.probe.volume_identifier(volume);
        summary.points_published +=
            publish_usage(sink, prefix, &usage, &identifier, &self.config.byte_units);
    }

    fn collect_stats(
        &self,
        namespace: &str,
        record: &ServiceRecord,
        prefix: &str,
        source: StatSource<'_>,
        sink: &dyn MetricSink,
        summary: &mut NamespaceSummary,
    ) {
        let parsed = match self.stats.fetch(source, &record.address) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    namespace,
                    service_type = %record.service_type,
                    address = %record.address,
                    "cannot fetch stats: {}",
                    e
                );
                summary.stat_failures += 1;
                return;
            }
        };

        for e in &parsed.errors {
            match e {
                StatParseError::FieldCount { .. } => warn!(
                    namespace,
                    service_type = %record.service_type,
                    address = %record.address,
                    "skipping stat line: {}",
                    e
                ),
                StatParseError::UnknownKind { .. } => debug!(
                    namespace,
                    service_type = %record.service_type,
                    address = %record.address,
                    "skipping stat line: {}",
                    e
                ),
            }
        }
        summary.stat_parse_errors += parsed.errors.len();

        for sample in parsed.samples() {
            summary.publish(sink, sample.to_point(prefix));
        }
    }
}

/// Logs a one-line summary of a finished cycle.
pub fn log_cycle(report: &CycleReport) {
    info!(
        namespaces = report.namespaces.len(),
        collected = report.namespaces_collected,
        skipped = report.namespaces_skipped,
        failed = report.namespaces_failed,
        services = report.services_polled,
        points = report.points_published,
        stat_failures = report.stat_failures,
        volume_failures = report.volume_failures,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "collection cycle finished"
    );
}
