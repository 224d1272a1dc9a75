//! Collect numeric server settings from `SHOW GLOBAL VARIABLES`.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::{parse_status_value, sanitize_metric_name};
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const GLOBAL_VARIABLES_QUERY: &str = "SHOW GLOBAL VARIABLES";

const SUBSYSTEM: &str = "global_variables";

/// Exports numeric and boolean `SHOW GLOBAL VARIABLES` as gauges, plus a
/// `version_info` series carrying the server version as labels.
pub struct GlobalVariables {
    namespace: String,
    version_info: Arc<Desc>,
}

impl GlobalVariables {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            version_info: Desc::shared(
                fq_name(namespace, "version", "info"),
                "MySQL version and distribution.",
                ValueType::Gauge,
                &["version", "version_comment"],
            ),
        }
    }

    fn generic(&self, name: &str) -> Arc<Desc> {
        Desc::shared(
            fq_name(&self.namespace, SUBSYSTEM, &sanitize_metric_name(name)),
            "Generic gauge metric from SHOW GLOBAL VARIABLES.",
            ValueType::Gauge,
            &[],
        )
    }
}

impl Scraper for GlobalVariables {
    fn name(&self) -> &str {
        super::GLOBAL_VARIABLES
    }

    fn help(&self) -> &str {
        "Collect from SHOW GLOBAL VARIABLES"
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            let rows = db.fetch_rows(GLOBAL_VARIABLES_QUERY).await?;

            let mut version = None;
            let mut version_comment = None;

            for row in &rows {
                let Some((name, raw)) = super::name_value(row) else {
                    continue;
                };

                match name.to_ascii_lowercase().as_str() {
                    "version" => version = Some(raw.to_string()),
                    "version_comment" => version_comment = Some(raw.to_string()),
                    _ => {}
                }

                if let Some(value) = parse_status_value(raw) {
                    sink.emit_unlabeled(&self.generic(name), value)?;
                }
            }

            if let Some(version) = version {
                sink.emit(
                    &self.version_info,
                    1.0,
                    [version, version_comment.unwrap_or_default()],
                )?;
            }

            Ok(())
        })
    }
}
