//! Scrape dispatcher: one concurrent unit per enabled task, joined per cycle.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use sqlsight_common::{Desc, ValueType, fq_name};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::connection::{ConnectionProvider, Connector, probe_liveness};
use crate::error::ScrapeError;
use crate::registry::{Scraper, TaskRegistry};
use crate::sink::SampleSink;

/// Label value used for the connection-phase duration sample.
pub const CONNECTION_COLLECTOR: &str = "connection";

/// Result of one task unit.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task name.
    pub name: String,
    /// Wall time spent in the scraper.
    pub elapsed: Duration,
    /// Failure message, if the task failed.
    pub error: Option<String>,
}

/// What happened during one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Whether the target answered the liveness probe.
    pub up: bool,
    /// Whether anything in the cycle failed.
    pub any_error: bool,
    /// Tasks that failed.
    pub failed: BTreeSet<String>,
    /// Per-task elapsed time.
    pub durations: BTreeMap<String, Duration>,
    /// Time spent on bootstrap and liveness.
    pub connection_duration: Duration,
}

impl CycleOutcome {
    fn record(&mut self, report: TaskReport) {
        if report.error.is_some() {
            self.any_error = true;
            self.failed.insert(report.name.clone());
        }
        self.durations.insert(report.name, report.elapsed);
    }
}

/// Timing policy for a cycle.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTimeouts {
    /// Upper bound for the liveness probe.
    pub liveness: Duration,
    /// Optional deadline per task; expiry counts as a task failure.
    pub task: Option<Duration>,
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            liveness: Duration::from_secs(5),
            task: None,
        }
    }
}

/// Runs the connection phase and fans out the enabled tasks.
pub struct Dispatcher<C: Connector> {
    provider: ConnectionProvider<C>,
    duration_desc: Arc<Desc>,
    timeouts: DispatchTimeouts,
}

impl<C: Connector> Dispatcher<C> {
    /// Create a dispatcher emitting duration samples under `namespace`.
    pub fn new(provider: ConnectionProvider<C>, namespace: &str, timeouts: DispatchTimeouts) -> Self {
        Self {
            provider,
            duration_desc: Desc::shared(
                fq_name(namespace, "exporter", "collector_duration_seconds"),
                "Collector time duration.",
                ValueType::Gauge,
                &["collector"],
            ),
            timeouts,
        }
    }

    /// Descriptor of the per-task duration samples.
    pub fn duration_desc(&self) -> &Arc<Desc> {
        &self.duration_desc
    }

    /// The connection provider.
    pub fn provider(&self) -> &ConnectionProvider<C> {
        &self.provider
    }

    /// Run one cycle.
    ///
    /// Ensures the pool, probes liveness, then runs every enabled task
    /// concurrently and waits for all of them. When the pool cannot be
    /// created or the probe fails, no task runs.
    pub async fn run_cycle(&self, tasks: &TaskRegistry, sink: &SampleSink) -> CycleOutcome {
        let started = Instant::now();
        let mut outcome = CycleOutcome::default();

        let handle = match self.provider.ensure().await {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Connection bootstrap failed, skipping all collectors");
                outcome.any_error = true;
                outcome.connection_duration = started.elapsed();
                return outcome;
            }
        };

        if let Err(e) = probe_liveness(&handle, self.timeouts.liveness).await {
            error!(error = %e, "Liveness probe failed, skipping all collectors");
            outcome.any_error = true;
            outcome.connection_duration = started.elapsed();
            return outcome;
        }

        outcome.up = true;
        outcome.connection_duration = started.elapsed();

        let mut units = JoinSet::new();
        let mut names = HashMap::new();
        let units_started = Instant::now();
        for task in tasks.enabled() {
            let unit = units.spawn(run_unit(
                task.name.clone(),
                task.scraper.clone(),
                handle.clone(),
                sink.clone(),
                self.duration_desc.clone(),
                self.timeouts.task,
            ));
            names.insert(unit.id(), task.name.clone());
        }

        debug!(units = units.len(), "Scrape units launched");

        while let Some(joined) = units.join_next_with_id().await {
            match joined {
                Ok((_, report)) => outcome.record(report),
                Err(e) => {
                    let name = names
                        .remove(&e.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    let elapsed = units_started.elapsed();
                    error!(collector = %name, error = %e, "Scrape unit did not complete");
                    emit_duration(sink, &self.duration_desc, &name, elapsed);
                    outcome.record(TaskReport {
                        name,
                        elapsed,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcome
    }
}

async fn run_unit<H>(
    name: String,
    scraper: Arc<dyn Scraper>,
    handle: H,
    sink: SampleSink,
    duration_desc: Arc<Desc>,
    deadline: Option<Duration>,
) -> TaskReport
where
    H: crate::db::QueryExecutor + Clone + 'static,
{
    let started = Instant::now();
    // The scraper call itself must sit inside the guard: it may panic before
    // handing back a future.
    let scrape = AssertUnwindSafe(async { scraper.scrape(&handle, &sink).await }).catch_unwind();

    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, scrape).await {
            Ok(caught) => flatten_panic(caught),
            Err(_) => Err(ScrapeError::Timeout(limit)),
        },
        None => flatten_panic(scrape.await),
    };
    let elapsed = started.elapsed();

    if let Err(e) = &result {
        error!(collector = %name, error = %e, "Error scraping collector");
    } else {
        debug!(collector = %name, elapsed_ms = elapsed.as_millis() as u64, "Collector finished");
    }

    emit_duration(&sink, &duration_desc, &name, elapsed);

    TaskReport {
        name,
        elapsed,
        error: result.err().map(|e| e.to_string()),
    }
}

fn emit_duration(sink: &SampleSink, desc: &Arc<Desc>, name: &str, elapsed: Duration) {
    if let Err(e) = sink.emit(desc, elapsed.as_secs_f64(), [name]) {
        warn!(collector = %name, error = %e, "Failed to emit duration sample");
    }
}

fn flatten_panic(
    caught: Result<Result<(), ScrapeError>, Box<dyn Any + Send>>,
) -> Result<(), ScrapeError> {
    caught.unwrap_or_else(|payload| Err(ScrapeError::Panic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::PoolLimits;
    use crate::sink;
    use crate::testing::{FakeConnector, FakeDb, SpyScraper};
    use sqlsight_common::Metric;

    fn dispatcher(connector: FakeConnector, timeouts: DispatchTimeouts) -> Dispatcher<FakeConnector> {
        let provider = ConnectionProvider::new(connector, "fake://", PoolLimits::from_max_connections(4));
        Dispatcher::new(provider, "mysql", timeouts)
    }

    fn registry(scrapers: Vec<Arc<SpyScraper>>) -> TaskRegistry {
        let mut registry = TaskRegistry::new();
        for scraper in scrapers {
            registry.register(scraper, true).unwrap();
        }
        registry
    }

    fn durations(metrics: &[Metric]) -> Vec<String> {
        let mut names: Vec<String> = metrics
            .iter()
            .filter(|m| m.name() == "mysql_exporter_collector_duration_seconds")
            .filter_map(|m| m.label("collector").map(str::to_string))
            .collect();
        names.sort();
        names
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_isolation() {
        let failing = Arc::new(SpyScraper::failing("failing"));
        let fine = Arc::new(SpyScraper::ok("fine").with_samples(3));
        let slow = Arc::new(SpyScraper::ok("slow").with_delay(Duration::from_millis(100)));
        let tasks = registry(vec![failing.clone(), fine.clone(), slow.clone()]);

        let dispatcher = dispatcher(FakeConnector::new(FakeDb::new()), DispatchTimeouts::default());
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;
        let metrics = stream.drain();

        assert!(outcome.up);
        assert!(outcome.any_error);
        assert_eq!(outcome.failed, BTreeSet::from(["failing".to_string()]));
        assert_eq!(outcome.durations.len(), 3);
        assert!(outcome.durations["slow"] >= Duration::from_millis(100));

        assert_eq!(durations(&metrics), vec!["failing", "fine", "slow"]);
        assert_eq!(metrics.iter().filter(|m| m.name() == "spy_fine_samples").count(), 3);
        assert_eq!(failing.calls(), 1);
        assert_eq!(fine.calls(), 1);
        assert_eq!(slow.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_tasks_do_not_run() {
        let on = Arc::new(SpyScraper::ok("on"));
        let off = Arc::new(SpyScraper::ok("off"));
        let mut tasks = TaskRegistry::new();
        tasks.register(on.clone(), true).unwrap();
        tasks.register(off.clone(), false).unwrap();

        let dispatcher = dispatcher(FakeConnector::new(FakeDb::new()), DispatchTimeouts::default());
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;

        assert!(!outcome.any_error);
        assert_eq!(on.calls(), 1);
        assert_eq!(off.calls(), 0);
        assert_eq!(durations(&stream.drain()), vec!["on"]);
    }

    #[tokio::test]
    async fn test_liveness_failure_skips_all_tasks() {
        let spy = Arc::new(SpyScraper::ok("spy"));
        let tasks = registry(vec![spy.clone()]);
        let db = FakeDb::new();
        db.set_down(true);

        let dispatcher = dispatcher(FakeConnector::new(db), DispatchTimeouts::default());
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;

        assert!(!outcome.up);
        assert!(outcome.any_error);
        assert!(outcome.durations.is_empty());
        assert_eq!(spy.calls(), 0);
        assert!(stream.drain().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_skips_all_tasks() {
        let spy = Arc::new(SpyScraper::ok("spy"));
        let tasks = registry(vec![spy.clone()]);

        let dispatcher = dispatcher(
            FakeConnector::new(FakeDb::new()).failing_open(true),
            DispatchTimeouts::default(),
        );
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;

        assert!(!outcome.up);
        assert!(outcome.any_error);
        assert_eq!(spy.calls(), 0);
        assert!(stream.drain().is_empty());
    }

    #[tokio::test]
    async fn test_task_deadline_counts_as_failure() {
        let hung = Arc::new(SpyScraper::ok("hung").with_delay(Duration::from_secs(30)));
        let quick = Arc::new(SpyScraper::ok("quick"));
        let tasks = registry(vec![hung.clone(), quick.clone()]);

        let dispatcher = dispatcher(
            FakeConnector::new(FakeDb::new()),
            DispatchTimeouts {
                task: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        );
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;

        assert_eq!(outcome.failed, BTreeSet::from(["hung".to_string()]));
        assert!(outcome.durations["hung"] < Duration::from_secs(30));
        assert_eq!(durations(&stream.drain()), vec!["hung", "quick"]);
    }

    #[tokio::test]
    async fn test_panicking_task_is_isolated() {
        let panicking = Arc::new(SpyScraper::panicking("boom"));
        let fine = Arc::new(SpyScraper::ok("fine"));
        let tasks = registry(vec![panicking, fine.clone()]);

        let dispatcher = dispatcher(FakeConnector::new(FakeDb::new()), DispatchTimeouts::default());
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;

        assert_eq!(outcome.failed, BTreeSet::from(["boom".to_string()]));
        assert_eq!(fine.calls(), 1);
        assert_eq!(durations(&stream.drain()), vec!["boom", "fine"]);
    }

    #[tokio::test]
    async fn test_duration_samples_have_one_label() {
        let tasks = registry(vec![Arc::new(SpyScraper::ok("a")), Arc::new(SpyScraper::ok("b"))]);
        let dispatcher = dispatcher(FakeConnector::new(FakeDb::new()), DispatchTimeouts::default());
        let (sink, mut stream) = sink::channel();
        dispatcher.run_cycle(&tasks, &sink).await;

        for metric in stream.drain() {
            if metric.name() == "mysql_exporter_collector_duration_seconds" {
                assert_eq!(metric.desc().label_names, vec!["collector".to_string()]);
                assert!(metric.value() >= 0.0);
            }
        }
    }

    #[tokio::test]
    async fn test_panic_before_future_is_isolated() {
        let eager = Arc::new(SpyScraper::panicking_early("eager"));
        let fine = Arc::new(SpyScraper::ok("fine"));
        let tasks = registry(vec![eager.clone(), fine.clone()]);

        let dispatcher = dispatcher(FakeConnector::new(FakeDb::new()), DispatchTimeouts::default());
        let (sink, mut stream) = sink::channel();
        let outcome = dispatcher.run_cycle(&tasks, &sink).await;

        assert!(outcome.any_error);
        assert_eq!(outcome.failed, BTreeSet::from(["eager".to_string()]));
        assert!(outcome.durations.contains_key("eager"));
        assert_eq!(eager.calls(), 1);
        assert_eq!(fine.calls(), 1);
        assert_eq!(durations(&stream.drain()), vec!["eager", "fine"]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
