//! Collect replication lag from a heartbeat table.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::parse_status_value;
use crate::registry::Scraper;
use crate::sink::SampleSink;

const SUBSYSTEM: &str = "heartbeat";

/// Query reading a pt-heartbeat style table.
pub(crate) fn heartbeat_query(database: &str, table: &str) -> String {
    format!(
        "SELECT UNIX_TIMESTAMP(ts), UNIX_TIMESTAMP(NOW(6)), server_id FROM `{}`.`{}`",
        database, table
    )
}

/// Reads the heartbeat table written by the replication source.
///
/// Comparing the stored and current timestamps gives replication delay
/// independently of `Seconds_Behind_Master`.
pub struct Heartbeat {
    query: String,
    stored: Arc<Desc>,
    now: Arc<Desc>,
}

impl Heartbeat {
    /// `database` and `table` must already be validated identifiers.
    pub fn new(namespace: &str, database: &str, table: &str) -> Self {
        Self {
            query: heartbeat_query(database, table),
            stored: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "stored_timestamp_seconds"),
                "Timestamp stored in the heartbeat table.",
                ValueType::Gauge,
                &["server_id"],
            ),
            now: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "now_timestamp_seconds"),
                "Timestamp of the current server.",
                ValueType::Gauge,
                &["server_id"],
            ),
        }
    }
}

impl Scraper for Heartbeat {
    fn name(&self) -> &str {
        super::HEARTBEAT
    }

    fn help(&self) -> &str {
        "Collect from the heartbeat table"
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            let rows = db.fetch_rows(&self.query).await?;

            for row in &rows {
                let stored = row.value_at(0).and_then(parse_status_value);
                let now = row.value_at(1).and_then(parse_status_value);
                let (Some(stored), Some(now)) = (stored, now) else {
                    return Err(ScrapeError::decode("heartbeat row without timestamps"));
                };
                let server_id = row.value_at(2).unwrap_or_default();

                sink.emit(&self.stored, stored, [server_id])?;
                sink.emit(&self.now, now, [server_id])?;
            }

            Ok(())
        })
    }
}
