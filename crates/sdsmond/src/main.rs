//! sdsmond - Storage cluster metrics collector daemon.
//!
//! Polls the registry of every configured namespace at a fixed interval and
//! writes the metrics of the local services to stdout, one line per point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod sink;

use std::io::{BufWriter, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use sdsmon_core::collector::namespace::parse_endpoint_override;
use sdsmon_core::collector::{
    BlkidCommand, ByteUnit, CachingBlockIdLookup, LocalityPolicy, NamespaceConfigProvider, RealFs,
    ReqwestTransport, SdsCollector, SdsConfProvider, StaticNamespaceProvider, VolumeProbe,
    log_cycle,
};
use sdsmon_core::config::CollectorConfig;

use crate::sink::{LineSink, OutputFormat};

/// Storage cluster metrics collector daemon.
#[derive(Parser, Debug)]
#[command(
    name = "sdsmond",
    about = "Storage cluster metrics collector daemon",
    version
)]
struct Args {
    /// Namespaces to poll, comma separated.
    #[arg(
        short,
        long,
        env = "SDSMON_NAMESPACES",
        default_value = "OPENIO",
        value_delimiter = ','
    )]
    namespaces: Vec<String>,

    /// Collection interval in seconds.
    #[arg(short, long, env = "SDSMON_INTERVAL", default_value = "30")]
    interval: u64,

    /// Filesystem types considered when identifying data volumes.
    #[arg(
        long,
        env = "SDSMON_FS_TYPES",
        default_value = "xfs,ext4",
        value_delimiter = ','
    )]
    fs_types: Vec<String>,

    /// Units for volume space metrics (bit, byte, kilobyte, ... or B, kB, MB, ...).
    #[arg(
        long = "byte-unit",
        env = "SDSMON_BYTE_UNIT",
        default_value = "byte",
        value_delimiter = ','
    )]
    byte_units: Vec<ByteUnit>,

    /// Registry endpoint of a namespace, bypassing sds.conf. Repeatable.
    #[arg(long = "proxy", value_name = "NS=URL", value_parser = parse_endpoint_override)]
    proxies: Vec<(String, String)>,

    /// Namespace configuration file or directory. Repeatable.
    /// Replaces the default search paths when given.
    #[arg(long = "sds-conf", value_name = "PATH", env = "SDSMON_SDS_CONF", value_delimiter = ',')]
    sds_conf: Vec<PathBuf>,

    /// Mount table used to identify data volumes.
    #[arg(long, env = "SDSMON_MTAB", default_value = "/etc/mtab")]
    mtab: PathBuf,

    /// Block device identification program.
    #[arg(long, env = "SDSMON_BLKID", default_value = "blkid")]
    blkid: PathBuf,

    /// Timeout of every HTTP request, in seconds.
    #[arg(long, env = "SDSMON_TIMEOUT", default_value = "10")]
    timeout: u64,

    /// Which discovered services are polled: prefix, exact or all.
    #[arg(long, env = "SDSMON_LOCALITY", default_value = "prefix")]
    locality: LocalityPolicy,

    /// Namespaces processed concurrently.
    #[arg(long, env = "SDSMON_WORKERS", default_value = "1")]
    workers: usize,

    /// Prefix prepended to every metric path. Empty for none.
    #[arg(long, env = "SDSMON_PATH_PREFIX", default_value = "openio")]
    path_prefix: String,

    /// Output format: graphite or json.
    #[arg(long, env = "SDSMON_FORMAT", default_value = "graphite")]
    format: OutputFormat,

    /// Run a single collection cycle and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            namespaces: self.namespaces.clone(),
            fs_types: self.fs_types.clone(),
            byte_units: self.byte_units.clone(),
            locality: self.locality,
            mtab_path: self.mtab.clone(),
            request_timeout_secs: self.timeout,
            namespace_workers: self.workers,
            ..Default::default()
        }
    }

    /// `--proxy` overrides first, then the sds.conf files.
    fn namespace_provider(&self) -> Box<dyn NamespaceConfigProvider> {
        let files = if self.sds_conf.is_empty() {
            SdsConfProvider::new(RealFs::new())
        } else {
            SdsConfProvider::with_paths(RealFs::new(), self.sds_conf.clone())
        };
        Box::new(StaticNamespaceProvider::new(self.proxies.clone()).with_fallback(Box::new(files)))
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
///
/// Logs go to stderr so they never mix with metric lines on stdout.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("sdsmond={}", level).parse().unwrap())
        .add_directive(format!("sdsmon_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_cycle(collector: &SdsCollector<RealFs>, sink: &LineSink<BufWriter<Stdout>>) {
    let report = collector.collect(sink);
    log_cycle(&report);
    if let Err(e) = sink.flush() {
        error!("Failed to flush metrics: {}", e);
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("sdsmond {} starting", env!("CARGO_PKG_VERSION"));
    let config = args.collector_config();
    info!(
        "Config: namespaces={}, interval={}s, format={}, locality={}, workers={}, timeout={}s",
        config.namespaces.join(","),
        args.interval,
        args.format,
        config.locality,
        config.workers(),
        config.request_timeout().as_secs()
    );

    let transport = match ReqwestTransport::new(config.request_timeout()) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let lookup = CachingBlockIdLookup::new(BlkidCommand::new(&args.blkid));
    let probe = VolumeProbe::new(
        RealFs::new(),
        Box::new(lookup),
        config.mtab_path.clone(),
        config.fs_types.clone(),
    );
    let collector = SdsCollector::new(config, args.namespace_provider(), transport, probe);
    let sink = LineSink::new(
        BufWriter::new(std::io::stdout()),
        args.format,
        &args.path_prefix,
    );

    if args.once {
        run_cycle(&collector, &sink);
        return;
    }

    let interval = Duration::from_secs(args.interval.max(1));

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting collection loop");

    while running.load(Ordering::SeqCst) {
        run_cycle(&collector, &sink);

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete");
}
