//! Aggregate thread counts and time by command and state from the processlist.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::{normalize_state, parse_status_value};
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const PROCESSLIST_QUERY: &str = "SELECT \
    COALESCE(command, '') AS command, \
    COALESCE(state, '') AS state, \
    COUNT(*) AS processes, \
    COALESCE(SUM(time), 0) AS seconds \
    FROM information_schema.processlist \
    WHERE ID != connection_id() AND TIME >= 0 \
    GROUP BY command, state";

const SUBSYSTEM: &str = "info_schema";

/// Thread counts and cumulative time per command and state.
pub struct Processlist {
    threads: Arc<Desc>,
    seconds: Arc<Desc>,
}

impl Processlist {
    pub fn new(namespace: &str) -> Self {
        Self {
            threads: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "threads"),
                "The number of threads (connections) split by current state.",
                ValueType::Gauge,
                &["command", "state"],
            ),
            seconds: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "threads_seconds"),
                "The number of seconds threads (connections) have used split by current state.",
                ValueType::Gauge,
                &["command", "state"],
            ),
        }
    }
}

impl Scraper for Processlist {
    fn name(&self) -> &str {
        super::PROCESSLIST
    }

    fn help(&self) -> &str {
        "Collect current thread state counts from information_schema.processlist"
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            let rows = db.fetch_rows(PROCESSLIST_QUERY).await?;

            // States that differ only in punctuation collapse to one series
            let mut totals: BTreeMap<(String, String), (f64, f64)> = BTreeMap::new();
            for row in &rows {
                let command = normalize_state(row.value_at(0).unwrap_or_default());
                let state = normalize_state(row.value_at(1).unwrap_or_default());
                let count = row
                    .value_at(2)
                    .and_then(parse_status_value)
                    .ok_or_else(|| ScrapeError::decode("processlist row without a count"))?;
                let seconds = row.value_at(3).and_then(parse_status_value).unwrap_or(0.0);

                let entry = totals.entry((command, state)).or_default();
                entry.0 += count;
                entry.1 += seconds;
            }

            for ((command, state), (count, seconds)) in totals {
                sink.emit(&self.threads, count, [command.as_str(), state.as_str()])?;
                sink.emit(&self.seconds, seconds, [command, state])?;
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

    fn row(command: &str, state: Option<&str>, count: &str, seconds: &str) -> TextRow {
        TextRow::new()
            .with("command", Some(command))
            .with("state", state)
            .with("processes", Some(count))
            .with("seconds", Some(seconds))
    }

    #[tokio::test]
    async fn test_groups_threads() {
        let db = FakeDb::new().with_rows(
            PROCESSLIST_QUERY,
            vec![
                row("Query", Some("Sending data"), "3", "12"),
                row("Query", Some("sending-data"), "1", "2"),
                row("Sleep", None, "10", "500"),
            ],
        );
        let (sink, mut stream) = sink::channel();

        Processlist::new("mysql").scrape(&db, &sink).await.unwrap();
        let metrics = stream.drain();

        assert_eq!(metrics.len(), 4);

        let sending = metrics
            .iter()
            .find(|m| {
                m.name() == "mysql_info_schema_threads" && m.label("state") == Some("sending_data")
            })
            .unwrap();
        assert_eq!(sending.label("command"), Some("query"));
        assert_eq!(sending.value(), 4.0);

        let sleeping = metrics
            .iter()
            .find(|m| m.name() == "mysql_info_schema_threads_seconds" && m.label("command") == Some("sleep"))
            .unwrap();
        assert_eq!(sleeping.label("state"), Some("unknown"));
        assert_eq!(sleeping.value(), 500.0);
    }

    #[tokio::test]
    async fn test_malformed_row_is_an_error() {
        let db = FakeDb::new().with_rows(
            PROCESSLIST_QUERY,
            vec![TextRow::new().with("command", Some("Query"))],
        );
        let (sink, _stream) = sink::channel();

        let err = Processlist::new("mysql").scrape(&db, &sink).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Decode(_)));
    }
}
