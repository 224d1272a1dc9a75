//! Collect the current size of all registered binlog files (`SHOW BINARY LOGS`).

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlsight_common::{Desc, ValueType, fq_name};
use tracing::debug;

use crate::db::QueryExecutor;
use crate::error::ScrapeError;
use crate::mapping::parse_status_value;
use crate::registry::Scraper;
use crate::sink::SampleSink;

pub(crate) const LOG_BIN_QUERY: &str = "SHOW GLOBAL VARIABLES LIKE 'log_bin'";
pub(crate) const BINARY_LOGS_QUERY: &str = "SHOW BINARY LOGS";

const SUBSYSTEM: &str = "binlog";

/// Combined size, count and latest sequence number of the binary logs.
///
/// Emits nothing when binary logging is disabled.
pub struct BinlogSize {
    size: Arc<Desc>,
    files: Arc<Desc>,
    file_number: Arc<Desc>,
}

impl BinlogSize {
    pub fn new(namespace: &str) -> Self {
        Self {
            size: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "size_bytes"),
                "Combined size of all registered binlog files.",
                ValueType::Gauge,
                &[],
            ),
            files: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "files"),
                "Number of registered binlog files.",
                ValueType::Gauge,
                &[],
            ),
            file_number: Desc::shared(
                fq_name(namespace, SUBSYSTEM, "file_number"),
                "The last binlog file number.",
                ValueType::Gauge,
                &[],
            ),
        }
    }
}

/// Sequence number of a binlog file name, e.g. `mysql-bin.000042` -> 42.
fn file_number(log_name: &str) -> Option<f64> {
    let (_, suffix) = log_name.rsplit_once('.')?;
    suffix.parse::<u64>().ok().map(|n| n as f64)
}

impl Scraper for BinlogSize {
    fn name(&self) -> &str {
        super::BINLOG_SIZE
    }

    fn help(&self) -> &str {
        "Collect the current size of all registered binlog files"
    }

    fn scrape<'a>(
        &'a self,
        db: &'a dyn QueryExecutor,
        sink: &'a SampleSink,
    ) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            let log_bin = db.fetch_rows(LOG_BIN_QUERY).await?;
            let enabled = log_bin
                .first()
                .and_then(super::name_value)
                .and_then(|(_, value)| parse_status_value(value))
                .is_some_and(|v| v == 1.0);

            if !enabled {
                debug!("Binary logging disabled, no binlog metrics");
                return Ok(());
            }

            let logs = db.fetch_rows(BINARY_LOGS_QUERY).await?;

            let mut size = 0.0;
            let mut last_name = None;
            for row in &logs {
                let Some((name, raw_size)) = super::name_value(row) else {
                    continue;
                };
                size += parse_status_value(raw_size)
                    .ok_or_else(|| ScrapeError::decode(format!("invalid binlog size for {}", name)))?;
                last_name = Some(name);
            }

            sink.emit_unlabeled(&self.size, size)?;
            sink.emit_unlabeled(&self.files, logs.len() as f64)?;
            let number = last_name.and_then(file_number).unwrap_or(0.0);
            sink.emit_unlabeled(&self.file_number, number)?;

            Ok(())
        })
    }
}
