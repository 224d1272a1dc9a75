//! Collect per-table I/O wait events from `performance_schema`.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::parse_status_value;
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const TABLE_IO_WAITS_QUERY: &str = "SELECT \
    OBJECT_SCHEMA, OBJECT_NAME, \
    COUNT_FETCH, COUNT_INSERT, COUNT_UPDATE, COUNT_DELETE, \
    SUM_TIMER_FETCH, SUM_TIMER_INSERT, SUM_TIMER_UPDATE, SUM_TIMER_DELETE \
    FROM performance_schema.table_io_waits_summary_by_table \
    WHERE OBJECT_SCHEMA NOT IN ('mysql', 'performance_schema')";

const SUBSYSTEM: &str = "perf_schema";

/// Operations in column order; counts start at column 2, timers follow.
const OPERATIONS: [&str; 4] = ["fetch", "insert", "update", "delete"];

/// Timer columns are in picoseconds.
const PICOSECONDS_PER_SECOND: f64 = 1e12;

/// Table I/O wait counts and time per table and operation.
pub struct TableIoWaits {
    waits: Arc<Desc>,
    seconds: Arc<Desc>,
}

impl TableIoWaits {
    pub fn new(namespace: &str) -> Self {
        Self {
            waits: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "table_io_waits_total"),
                "The total number of table I/O wait events for each table and operation.",
                ValueType::Counter,
                &["schema", "name", "operation"],
            ),
            seconds: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "table_io_waits_seconds_total"),
                "The total time of table I/O wait events for each table and operation.",
                ValueType::Counter,
                &["schema", "name", "operation"],
            ),
        }
    }
}

impl Scraper for TableIoWaits {
    fn name(&self) -> &str {
        super::TABLE_IO_WAITS
    }

    fn help(&self) -> &str {
        "Collect metrics from performance_schema.table_io_waits_summary_by_table"
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            let rows = db.fetch_rows(TABLE_IO_WAITS_QUERY).await?;

            for row in &rows {
                if row.len() < 2 + 2 * OPERATIONS.len() {
                    return Err(ScrapeError::decode(format!(
                        "table_io_waits row has {} columns",
                        row.len()
                    )));
                }
                let schema = row.value_at(0).unwrap_or_default();
                let table = row.value_at(1).unwrap_or_default();

                for (i, &operation) in OPERATIONS.iter().enumerate() {
                    let count = row.value_at(2 + i).and_then(parse_status_value).unwrap_or(0.0);
                    let timer = row
                        .value_at(2 + OPERATIONS.len() + i)
                        .and_then(parse_status_value)
                        .unwrap_or(0.0);

                    sink.emit(&self.waits, count, [schema, table, operation])?;
                    sink.emit(
                        &self.seconds,
                        timer / PICOSECONDS_PER_SECOND,
                        [schema, table, operation],
                    )?;
                }
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TextRow;
    use crate::sink;
    use crate::testing::FakeDb;

    fn row(schema: &str, table: &str, counts: [&str; 4], timers: [&str; 4]) -> TextRow {
        let mut row = TextRow::new()
            .with("OBJECT_SCHEMA", Some(schema))
            .with("OBJECT_NAME", Some(table));
        for (operation, count) in OPERATIONS.iter().zip(counts) {
            row.push(format!("COUNT_{}", operation.to_uppercase()), Some(count.to_string()));
        }
        for (operation, timer) in OPERATIONS.iter().zip(timers) {
            row.push(format!("SUM_TIMER_{}", operation.to_uppercase()), Some(timer.to_string()));
        }
        row
    }

    #[tokio::test]
    async fn test_maps_table_io_waits() {
        let db = FakeDb::new().with_rows(
            TABLE_IO_WAITS_QUERY,
            vec![row(
                "shop",
                "orders",
                ["10", "2", "3", "0"],
                ["2000000000000", "500000000000", "0", "0"],
            )],
        );
        let (sink, mut stream) = sink::channel();

        TableIoWaits::new("mysql").scrape(&db, &sink).await.unwrap();
        let metrics = stream.drain();

        assert_eq!(metrics.len(), 8);

        let fetches = metrics
            .iter()
            .find(|m| {
                m.name() == "mysql_perf_schema_table_io_waits_total" && m.label("operation") == Some("fetch")
            })
            .unwrap();
        assert_eq!(fetches.label("schema"), Some("shop"));
        assert_eq!(fetches.label("name"), Some("orders"));
        assert_eq!(fetches.value(), 10.0);

        let insert_time = metrics
            .iter()
            .find(|m| {
                m.name() == "mysql_perf_schema_table_io_waits_seconds_total"
                    && m.label("operation") == Some("insert")
            })
            .unwrap();
        assert_eq!(insert_time.value(), 0.5);
    }

    #[tokio::test]
    async fn test_short_row_is_decode_error() {
        let db = FakeDb::new().with_rows(
            TABLE_IO_WAITS_QUERY,
            vec![TextRow::new().with("OBJECT_SCHEMA", Some("shop"))],
        );
        let (sink, mut stream) = sink::channel();

        let err = TableIoWaits::new("mysql").scrape(&db, &sink).await.unwrap_err();

        assert!(matches!(err, ScrapeError::Decode(_)));
        assert!(stream.drain().is_empty());
    }
}
