//! In-memory fakes for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use sqlsight_common::{Desc, ValueType};

use crate::connection::{Connector, PoolLimits};
use crate::db::{QueryExecutor, TextRow};
use crate::error::{ExporterError, ScrapeError};
use crate::registry::Scraper;
use crate::sink::SampleSink;

/// Shared call counter.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn incr(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared on/off flag.
#[derive(Debug, Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct FakeDbState {
    rows: Mutex<HashMap<String, Vec<TextRow>>>,
    failing: Mutex<HashSet<String>>,
    executed: Mutex<Vec<String>>,
    down: Switch,
}

/// Database answering canned rows per SQL text.
///
/// Unknown statements succeed with no rows.
#[derive(Debug, Clone, Default)]
pub struct FakeDb {
    state: Arc<FakeDbState>,
    latency: Duration,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, sql: &str, rows: Vec<TextRow>) -> Self {
        self.state.rows.lock().insert(sql.to_string(), rows);
        self
    }

    pub fn failing(self, sql: &str) -> Self {
        self.state.failing.lock().insert(sql.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every statement fail.
    pub fn set_down(&self, down: bool) {
        self.state.down.set(down);
    }

    /// Every statement seen so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    async fn run(&self, sql: &str) -> Result<(), ScrapeError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state.executed.lock().push(sql.to_string());

        if self.state.down.get() {
            return Err(ScrapeError::other("Connection refused"));
        }
        if self.state.failing.lock().contains(sql) {
            return Err(ScrapeError::other(format!("Query rejected: {}", sql)));
        }
        Ok(())
    }
}

impl QueryExecutor for FakeDb {
    fn fetch_rows<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<TextRow>, ScrapeError>> {
        Box::pin(async move {
            self.run(sql).await?;
            Ok(self.state.rows.lock().get(sql).cloned().unwrap_or_default())
        })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(self.run(sql))
    }
}

/// Connector handing out a [`FakeDb`].
pub struct FakeConnector {
    db: FakeDb,
    opens: Counter,
    limits_seen: Arc<Mutex<Option<PoolLimits>>>,
    open_delay: Duration,
    fail: Switch,
}

impl FakeConnector {
    pub fn new(db: FakeDb) -> Self {
        Self {
            db,
            opens: Counter::default(),
            limits_seen: Arc::new(Mutex::new(None)),
            open_delay: Duration::ZERO,
            fail: Switch::default(),
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn failing_open(self, fail: bool) -> Self {
        self.fail.set(fail);
        self
    }

    pub fn opens(&self) -> Counter {
        self.opens.clone()
    }

    pub fn limits_seen(&self) -> Arc<Mutex<Option<PoolLimits>>> {
        self.limits_seen.clone()
    }

    pub fn fail_switch(&self) -> Switch {
        self.fail.clone()
    }
}

impl Connector for FakeConnector {
    type Handle = FakeDb;

    fn open<'a>(
        &'a self,
        _dsn: &'a str,
        limits: PoolLimits,
    ) -> BoxFuture<'a, Result<Self::Handle, ExporterError>> {
        Box::pin(async move {
            self.opens.incr();
            *self.limits_seen.lock() = Some(limits);
            if !self.open_delay.is_zero() {
                tokio::time::sleep(self.open_delay).await;
            }
            if self.fail.get() {
                return Err(ExporterError::Bootstrap("Connection refused".to_string()));
            }
            Ok(self.db.clone())
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Panic,
    PanicEarly,
}

/// Scraper that records its calls and behaves as told.
pub struct SpyScraper {
    name: String,
    behavior: Behavior,
    delay: Duration,
    samples: usize,
    default_on: bool,
    desc: Arc<Desc>,
    calls: Counter,
}

impl SpyScraper {
    fn build(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            delay: Duration::ZERO,
            samples: 0,
            default_on: false,
            desc: Desc::shared(
                format!("spy_{}_samples", name),
                "Samples written by a spy.",
                ValueType::Gauge,
                &["index"],
            ),
            calls: Counter::default(),
        }
    }

    pub fn ok(name: &str) -> Self {
        Self::build(name, Behavior::Succeed)
    }

    pub fn failing(name: &str) -> Self {
        Self::build(name, Behavior::Fail)
    }

    pub fn panicking(name: &str) -> Self {
        Self::build(name, Behavior::Panic)
    }

    /// Panic in `scrape` itself, before any future is returned.
    pub fn panicking_early(name: &str) -> Self {
        Self::build(name, Behavior::PanicEarly)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Write `n` samples before finishing.
    pub fn with_samples(mut self, n: usize) -> Self {
        self.samples = n;
        self
    }

    pub fn default_enabled(mut self, on: bool) -> Self {
        self.default_on = on;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Scraper for SpyScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn help(&self) -> &str {
        "Test scraper"
    }

    fn enabled_by_default(&self) -> bool {
        self.default_on
    }

    fn scrape<'a>(
        &'a self,
        _db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        if let Behavior::PanicEarly = self.behavior {
            self.calls.incr();
            panic!("{} panicked before polling", self.name);
        }
        Box::pin(async move {
            self.calls.incr();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            for i in 0..self.samples {
                sink.emit(&self.desc, i as f64, [i.to_string()])?;
            }
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(ScrapeError::other(format!("{} failed", self.name))),
                Behavior::Panic | Behavior::PanicEarly => panic!("{} panicked", self.name),
            }
        })
    }
}
