//! Collector facade: describe, collect and cycle bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sqlsight_common::{Desc, Metric, ValueType, fq_name};
use tokio::sync::Mutex as CycleLock;
use tracing::{debug, info, warn};

use crate::config::ExporterConfig;
use crate::connection::{ConnectionProvider, Connector, MySqlConnector, PoolLimits};
use crate::dispatcher::{CONNECTION_COLLECTOR, DispatchTimeouts, Dispatcher};
use crate::error::ExporterError;
use crate::registry::TaskRegistry;
use crate::scrape;
use crate::sink::{self, SampleSink};

/// Exporter construction options.
#[derive(Debug, Clone)]
pub struct ExporterOptions {
    /// Metric name prefix.
    pub namespace: String,
    /// Pool ceiling hint; capped at 16.
    pub max_connections: u32,
    /// Upper bound for the liveness probe.
    pub liveness_timeout: Duration,
    /// Optional deadline per task.
    pub task_timeout: Option<Duration>,
}

impl Default for ExporterOptions {
    fn default() -> Self {
        Self {
            namespace: "mysql".to_string(),
            max_connections: 3,
            liveness_timeout: Duration::from_secs(5),
            task_timeout: None,
        }
    }
}

impl From<&ExporterConfig> for ExporterOptions {
    fn from(config: &ExporterConfig) -> Self {
        Self {
            namespace: config.mysql.namespace.clone(),
            max_connections: config.mysql.max_connections,
            liveness_timeout: config.mysql.liveness_timeout(),
            task_timeout: config.mysql.task_timeout(),
        }
    }
}

struct Bookkeeping {
    scrapes_total: Arc<Desc>,
    last_scrape_error: Arc<Desc>,
    scrape_errors_total: Arc<Desc>,
    up: Arc<Desc>,
}

impl Bookkeeping {
    fn new(namespace: &str) -> Self {
        Self {
            scrapes_total: Desc::shared(
                fq_name(namespace, "exporter", "scrapes_total"),
                "Total number of times MySQL was scraped for metrics.",
                ValueType::Counter,
                &[],
            ),
            last_scrape_error: Desc::shared(
                fq_name(namespace, "exporter", "last_scrape_error"),
                "Whether the last scrape of metrics from MySQL resulted in an error (1 for error, 0 for success).",
                ValueType::Gauge,
                &[],
            ),
            scrape_errors_total: Desc::shared(
                fq_name(namespace, "exporter", "scrape_errors_total"),
                "Total number of times an error occurred scraping a MySQL.",
                ValueType::Counter,
                &["collector"],
            ),
            up: Desc::shared(
                fq_name(namespace, "", "up"),
                "Whether the MySQL server is up.",
                ValueType::Gauge,
                &[],
            ),
        }
    }
}

/// MySQL metrics collector.
///
/// Every [`collect`](Self::collect) runs one full cycle against the target:
/// pool bootstrap on first use, liveness probe, all enabled tasks
/// concurrently, then the bookkeeping samples. Cycles never overlap.
pub struct Exporter<C: Connector> {
    dispatcher: Dispatcher<C>,
    tasks: TaskRegistry,
    bookkeeping: Bookkeeping,
    cycle: CycleLock<()>,
    total_scrapes: AtomicU64,
    scrape_errors: Mutex<BTreeMap<String, u64>>,
    last_error: AtomicBool,
    up: AtomicBool,
}

/// Exporter backed by a real MySQL pool.
pub type MySqlExporter = Exporter<MySqlConnector>;

impl Exporter<MySqlConnector> {
    /// Build an exporter with the built-in collectors from configuration.
    pub fn mysql(config: &ExporterConfig) -> Result<Self, ExporterError> {
        if config.mysql.dsn.is_empty() {
            return Err(ExporterError::config(
                "No DSN configured (set mysql.dsn, --dsn or DATA_SOURCE_NAME)",
            ));
        }

        let options = ExporterOptions::from(config);
        let scrapers = scrape::builtin(&options.namespace, &config.collect);
        let tasks = TaskRegistry::configure(scrapers, &config.collect.tasks)?;

        Ok(Self::new(MySqlConnector, config.mysql.dsn.clone(), options, tasks))
    }
}

impl<C: Connector> Exporter<C> {
    /// Create an exporter. Nothing connects until the first cycle.
    pub fn new(connector: C, dsn: impl Into<String>, options: ExporterOptions, tasks: TaskRegistry) -> Self {
        let limits = PoolLimits::from_max_connections(options.max_connections);
        let provider = ConnectionProvider::new(connector, dsn, limits);
        let dispatcher = Dispatcher::new(
            provider,
            &options.namespace,
            DispatchTimeouts {
                liveness: options.liveness_timeout,
                task: options.task_timeout,
            },
        );

        // Every enabled task exports an error series from the first cycle on
        let scrape_errors = tasks
            .enabled()
            .map(|task| (task.name.clone(), 0))
            .collect();

        info!(
            namespace = %options.namespace,
            collectors = ?tasks.enabled_names(),
            max_open = limits.max_open,
            "Exporter created"
        );

        Self {
            dispatcher,
            tasks,
            bookkeeping: Bookkeeping::new(&options.namespace),
            cycle: CycleLock::new(()),
            total_scrapes: AtomicU64::new(0),
            scrape_errors: Mutex::new(scrape_errors),
            last_error: AtomicBool::new(false),
            up: AtomicBool::new(false),
        }
    }

    /// Run one cycle, writing task samples then bookkeeping samples to `sink`.
    ///
    /// Never fails: bootstrap, liveness and task errors are logged and show
    /// up in the bookkeeping metrics.
    pub async fn collect(&self, sink: &SampleSink) {
        let _cycle = self.cycle.lock().await;

        let total = self.total_scrapes.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.dispatcher.run_cycle(&self.tasks, sink).await;

        let errors: Vec<(String, u64)> = {
            let mut counters = self.scrape_errors.lock();
            for name in &outcome.failed {
                *counters.entry(name.clone()).or_default() += 1;
            }
            counters.iter().map(|(name, count)| (name.clone(), *count)).collect()
        };
        self.last_error.store(outcome.any_error, Ordering::Relaxed);
        self.up.store(outcome.up, Ordering::Relaxed);

        let books = &self.bookkeeping;
        emit(sink, &books.scrapes_total, total as f64, Vec::<String>::new());
        emit(sink, &books.last_scrape_error, flag(outcome.any_error), Vec::<String>::new());
        for (name, count) in errors {
            emit(sink, &books.scrape_errors_total, count as f64, [name]);
        }
        emit(sink, &books.up, flag(outcome.up), Vec::<String>::new());
        emit(
            sink,
            self.dispatcher.duration_desc(),
            outcome.connection_duration.as_secs_f64(),
            [CONNECTION_COLLECTOR],
        );

        debug!(
            scrape = total,
            up = outcome.up,
            failed = ?outcome.failed,
            "Scrape cycle finished"
        );
    }

    /// Run one cycle and return every sample.
    pub async fn gather(&self) -> Vec<Metric> {
        let (sink, mut stream) = sink::channel();
        self.collect(&sink).await;
        drop(sink);
        stream.drain()
    }

    /// Descriptors of every metric a cycle produces right now.
    ///
    /// Runs a full cycle and keeps only the descriptors, deduplicated and
    /// sorted by name. Task-specific descriptors are missing while the
    /// target is unreachable.
    pub async fn describe(&self) -> Vec<Desc> {
        let descs: BTreeSet<Desc> = self
            .gather()
            .await
            .into_iter()
            .map(|metric| metric.desc().as_ref().clone())
            .collect();
        descs.into_iter().collect()
    }

    /// Number of cycles started so far.
    pub fn total_scrapes(&self) -> u64 {
        self.total_scrapes.load(Ordering::Relaxed)
    }

    /// Failure count of an enabled task.
    pub fn scrape_errors(&self, task: &str) -> Option<u64> {
        self.scrape_errors.lock().get(task).copied()
    }

    /// Whether the last finished cycle had any error.
    pub fn last_scrape_error(&self) -> bool {
        self.last_error.load(Ordering::Relaxed)
    }

    /// Whether the target answered the last liveness probe.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    /// The registered tasks.
    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }
}

fn flag(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}

fn emit<I, S>(sink: &SampleSink, desc: &Arc<Desc>, value: f64, labels: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    if let Err(e) = sink.emit(desc, value, labels) {
        warn!(metric = %desc.fq_name, error = %e, "Failed to emit bookkeeping sample");
    }
}
