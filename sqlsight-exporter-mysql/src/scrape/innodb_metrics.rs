//! Collect InnoDB counters from `information_schema.innodb_metrics`.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};
use tracing::warn;

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::{parse_status_value, sanitize_label_name, sanitize_metric_name};
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const INNODB_METRICS_QUERY: &str = "SELECT name, subsystem, type, comment, count \
    FROM information_schema.innodb_metrics \
    WHERE status = 'enabled'";

const SUBSYSTEM: &str = "info_schema";

/// Exports every enabled InnoDB metric.
///
/// The `buffer_page_io` subsystem is folded into read/written families by
/// page type, and buffer pool page counts into one family by page state.
/// Everything else becomes `innodb_metrics_<subsystem>_<name>`, typed after
/// the `type` column.
pub struct InnodbMetrics {
    namespace: String,
    page_read: Arc<Desc>,
    page_written: Arc<Desc>,
    pool_pages: Arc<Desc>,
    pool_dirty_pages: Arc<Desc>,
}

impl InnodbMetrics {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            page_read: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "innodb_metrics_buffer_page_read_total"),
                "Total number of buffer pages read total.",
                ValueType::Counter,
                &["type"],
            ),
            page_written: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "innodb_metrics_buffer_page_written_total"),
                "Total number of buffer pages written total.",
                ValueType::Counter,
                &["type"],
            ),
            pool_pages: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "innodb_metrics_buffer_pool_pages"),
                "Total number of buffer pool pages by state.",
                ValueType::Gauge,
                &["state"],
            ),
            pool_dirty_pages: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "innodb_metrics_buffer_pool_dirty_pages"),
                "Total number of dirty pages in the buffer pool.",
                ValueType::Gauge,
                &[],
            ),
        }
    }

    fn generic(&self, subsystem: &str, name: &str, kind: &str, comment: &str) -> Arc<Desc> {
        let (value_type, suffix) = match kind {
            "counter" => (ValueType::Counter, "_total"),
            "value" => (ValueType::Gauge, ""),
            _ => (ValueType::Untyped, ""),
        };
        Desc::shared(
            fq_name(
                &self.namespace,
                SUBSYSTEM,
                &format!(
                    "innodb_metrics_{}_{}{}",
                    sanitize_metric_name(subsystem),
                    sanitize_metric_name(name),
                    suffix
                ),
            ),
            comment,
            value_type,
            &[],
        )
    }

    fn emit_row(
        &self,
        sink: &SampleSink,
        name: &str,
        subsystem: &str,
        kind: &str,
        comment: &str,
        value: f64,
    ) -> Result<(), ScrapeError> {
        if subsystem == "buffer_page_io" {
            let Some((direction, page_type)) = split_page_io(name) else {
                warn!(name, "Unexpected buffer_page_io metric name");
                return Ok(());
            };
            let desc = match direction {
                "read" => &self.page_read,
                _ => &self.page_written,
            };
            sink.emit(desc, value, [sanitize_label_name(page_type)])?;
            return Ok(());
        }

        if subsystem == "buffer" {
            match name {
                // Sum of the per-state series
                "buffer_pool_pages_total" => return Ok(()),
                "buffer_pool_dirty_pages" => {
                    sink.emit_unlabeled(&self.pool_dirty_pages, value)?;
                    return Ok(());
                }
                _ => {
                    if let Some(state) = name.strip_prefix("buffer_pool_pages_") {
                        sink.emit(&self.pool_pages, value, [sanitize_label_name(state)])?;
                        return Ok(());
                    }
                }
            }
        }

        sink.emit_unlabeled(&self.generic(subsystem, name, kind, comment), value)?;
        Ok(())
    }
}

/// `buffer_page_read_index_leaf` -> `("read", "index_leaf")`.
fn split_page_io(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("buffer_page_")?;
    ["read", "written"].into_iter().find_map(|direction| {
        let page_type = rest.strip_prefix(direction)?.strip_prefix('_')?;
        (!page_type.is_empty()).then_some((direction, page_type))
    })
}

impl Scraper for InnodbMetrics {
    fn name(&self) -> &str {
        super::INNODB_METRICS
    }

    fn help(&self) -> &str {
        "Collect metrics from information_schema.innodb_metrics"
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            let rows = db.fetch_rows(INNODB_METRICS_QUERY).await?;

            for row in &rows {
                let (Some(name), Some(subsystem)) = (row.value_at(0), row.value_at(1)) else {
                    continue;
                };
                let Some(value) = row.value_at(4).and_then(parse_status_value) else {
                    continue;
                };
                let kind = row.value_at(2).unwrap_or_default();
                let comment = row.value_at(3).unwrap_or_default();

                self.emit_row(sink, name, subsystem, kind, comment, value)?;
            }

            Ok(())
        })
    }
}
