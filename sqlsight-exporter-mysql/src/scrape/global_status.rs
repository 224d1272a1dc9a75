//! Collect server status counters from `SHOW GLOBAL STATUS`.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::{parse_status_value, sanitize_label_name, sanitize_metric_name};
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const GLOBAL_STATUS_QUERY: &str = "SHOW GLOBAL STATUS";

const SUBSYSTEM: &str = "global_status";

/// Exports `SHOW GLOBAL STATUS`.
///
/// `Com_*` and `Handler_*` counters are folded into labeled families;
/// every other numeric variable becomes its own untyped metric.
pub struct GlobalStatus {
    namespace: String,
    commands: Arc<Desc>,
    handlers: Arc<Desc>,
}

impl GlobalStatus {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            commands: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "commands_total"),
                "Total number of executed MySQL commands.",
                ValueType::Counter,
                &["command"],
            ),
            handlers: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "handlers_total"),
                "Total number of executed MySQL handlers.",
                ValueType::Counter,
                &["handler"],
            ),
        }
    }

    fn generic(&self, name: &str) -> Arc<Desc> {
        Desc::shared(
            fq_name(&self.namespace, SUBSYSTEM, &sanitize_metric_name(name)),
            "Generic metric from SHOW GLOBAL STATUS.",
            ValueType::Untyped,
            &[],
        )
    }
}

impl Scraper for GlobalStatus {
    fn name(&self) -> &str {
        super::GLOBAL_STATUS
    }

    fn help(&self) -> &str {
        "Collect from SHOW GLOBAL STATUS"
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
            let rows = db.fetch_rows(GLOBAL_STATUS_QUERY).await?;

            for row in &rows {
                let Some((name, raw)) = super::name_value(row) else {
                    continue;
                };
                let Some(value) = parse_status_value(raw) else {
                    continue;
                };

                let lower = name.to_ascii_lowercase();
                if let Some(command) = lower.strip_prefix("com_") {
                    sink.emit(&self.commands, value, [sanitize_label_name(command)])?;
                } else if let Some(handler) = lower.strip_prefix("handler_") {
                    sink.emit(&self.handlers, value, [sanitize_label_name(handler)])?;
                } else {
                    sink.emit_unlabeled(&self.generic(name), value)?;
                }
            }

            Ok(())
        })
    }
}
