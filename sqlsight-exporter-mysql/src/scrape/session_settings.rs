//! Apply session settings to the scrape connection.

use futures::future::BoxFuture;

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const SESSION_SETTINGS_QUERY: &str =
    "SET SESSION log_slow_filter = 'tmp_table_on_disk,filesort_on_disk'";

/// Restricts the slow log to on-disk temporary tables and sorts.
///
/// Produces no samples; only its duration and error count are visible.
/// Needs a server that knows `log_slow_filter` (Percona, MariaDB).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings;

impl Scraper for SessionSettings {
    fn name(&self) -> &str {
        super::SESSION_SETTINGS
    }

    fn help(&self) -> &str {
        "Set log_slow_filter for the exporter session"
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        _sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move { db.execute(SESSION_SETTINGS_QUERY).await })
    }
}
