//! Collect replica status from `SHOW SLAVE STATUS`.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::{parse_status_value, sanitize_metric_name};
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const SLAVE_STATUS_QUERY: &str = "SHOW SLAVE STATUS";

const SUBSYSTEM: &str = "slave_status";

/// Columns used as labels rather than exported as values.
const LABEL_COLUMNS: [&str; 3] = ["Master_Host", "Master_UUID", "Channel_Name"];

/// Exports `SHOW SLAVE STATUS`, one series per replication channel.
///
/// Every column with a numeric or Yes/No/Connecting value becomes an untyped
/// metric labeled with the source host, its UUID and the channel name.
/// Missing label columns are exported as empty strings so the label schema
/// never changes.
pub struct ReplicationState {
    namespace: String,
}

impl ReplicationState {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }

    fn desc(&self, column: &str) -> Arc<Desc> {
        Desc::shared(
            fq_name(&self.namespace, SUBSYSTEM, &sanitize_metric_name(column)),
            "Generic metric from SHOW SLAVE STATUS.",
            ValueType::Untyped,
            &["master_host", "master_uuid", "channel_name"],
        )
    }
}

impl Scraper for ReplicationState {
    fn name(&self) -> &str {
        super::REPLICATION_STATE
    }

    fn help(&self) -> &str {
        "Collect from SHOW SLAVE STATUS"
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
            let rows = db.fetch_rows(SLAVE_STATUS_QUERY).await?;

            for row in &rows {
                let labels = LABEL_COLUMNS.map(|column| row.get(column).unwrap_or_default());

                for (column, raw) in row.columns() {
                    if LABEL_COLUMNS
                        .iter()
                        .any(|label| label.eq_ignore_ascii_case(column))
                    {
                        continue;
                    }
                    let Some(value) = raw.and_then(parse_status_value) else {
                        continue;
                    };
                    sink.emit(&self.desc(column), value, labels)?;
                }
            }

            Ok(())
        })
    }
}
