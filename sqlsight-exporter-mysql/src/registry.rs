//! Task registry: the named, independently toggleable scrape tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::db::QueryExecutor;
use crate::error::{ExporterError, ScrapeError};
use crate::sink::SampleSink;

/// A sub-collector run once per enabled cycle.
///
/// Implementations query the target through `db` and write zero or more
/// samples to `sink`. Returning an error marks the task as failed for this
/// cycle; samples already written are kept.
pub trait Scraper: Send + Sync + 'static {
    /// Unique task name, used as config key and `collector` label.
    fn name(&self) -> &str;

    /// Short description for logs and `--help`-style listings.
    fn help(&self) -> &str;

    /// Whether the task runs when the configuration does not mention it.
    fn enabled_by_default(&self) -> bool {
        false
    }

    /// Run one scrape.
    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>>;
}

/// A registered task.
#[derive(Clone)]
pub struct TaskDescriptor {
    /// Task name (copied from the scraper).
    pub name: String,
    /// Whether the task runs.
    pub enabled: bool,
    /// The scraper bound to this task.
    pub scraper: Arc<dyn Scraper>,
}

impl std::fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Ordered set of tasks with unique names.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<TaskDescriptor>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from scrapers and a name -> enabled mapping.
    ///
    /// Scrapers missing from `toggles` use their default. Names in `toggles`
    /// that match no scraper are rejected.
    pub fn configure(
        scrapers: Vec<Arc<dyn Scraper>>,
        toggles: &BTreeMap<String, bool>,
    ) -> Result<Self, ExporterError> {
        if let Some(unknown) = toggles
            .keys()
            .find(|name| !scrapers.iter().any(|s| s.name() == name.as_str()))
        {
            return Err(ExporterError::config(format!("Unknown collector: {}", unknown)));
        }

        let mut registry = Self::new();
        for scraper in scrapers {
            let enabled = toggles
                .get(scraper.name())
                .copied()
                .unwrap_or_else(|| scraper.enabled_by_default());
            registry.register(scraper, enabled)?;
        }
        Ok(registry)
    }

    /// Add a task. Names must be unique.
    pub fn register(&mut self, scraper: Arc<dyn Scraper>, enabled: bool) -> Result<(), ExporterError> {
        let name = scraper.name().to_string();
        if self.get(&name).is_some() {
            return Err(ExporterError::config(format!("Duplicate collector: {}", name)));
        }

        self.tasks.push(TaskDescriptor {
            name,
            enabled,
            scraper,
        });
        Ok(())
    }

    /// Every registered task, enabled or not.
    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    /// Enabled tasks, in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.iter().filter(|t| t.enabled)
    }

    /// Names of the enabled tasks.
    pub fn enabled_names(&self) -> Vec<&str> {
        self.enabled().map(|t| t.name.as_str()).collect()
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
