//! Built-in MySQL collectors.
//!
//! Each collector is a [`Scraper`] registered under a fixed task name; the
//! name is both its configuration key and its `collector` label value.

mod binlog_size;
mod global_status;
mod global_variables;
mod heartbeat;
mod innodb_metrics;
mod processlist;
mod replication_state;
mod session_settings;
mod table_io_waits;

use std::sync::Arc;

pub use binlog_size::BinlogSize;
pub use global_status::GlobalStatus;
pub use global_variables::GlobalVariables;
pub use heartbeat::Heartbeat;
pub use innodb_metrics::InnodbMetrics;
pub use processlist::Processlist;
pub use replication_state::ReplicationState;
pub use session_settings::SessionSettings;
pub use table_io_waits::TableIoWaits;

use crate::config::CollectConfig;
use crate::db::TextRow;
use crate::registry::Scraper;

pub const SESSION_SETTINGS: &str = "session_settings";
pub const GLOBAL_STATUS: &str = "global_status";
pub const GLOBAL_VARIABLES: &str = "global_variables";
pub const REPLICATION_STATE: &str = "replication_state";
pub const PROCESSLIST: &str = "processlist";
pub const BINLOG_SIZE: &str = "binlog_size";
pub const HEARTBEAT: &str = "heartbeat";
pub const INNODB_METRICS: &str = "innodb_metrics";
pub const TABLE_IO_WAITS: &str = "table_io_waits";

/// Every built-in task name, in registration order.
pub const TASK_NAMES: &[&str] = &[
    SESSION_SETTINGS,
    GLOBAL_STATUS,
    GLOBAL_VARIABLES,
    REPLICATION_STATE,
    PROCESSLIST,
    BINLOG_SIZE,
    HEARTBEAT,
    INNODB_METRICS,
    TABLE_IO_WAITS,
];

/// Instantiate every built-in collector for `namespace`.
pub fn builtin(namespace: &str, collect: &CollectConfig) -> Vec<Arc<dyn Scraper>> {
    vec![
        Arc::new(SessionSettings),
        Arc::new(GlobalStatus::new(namespace)),
        Arc::new(GlobalVariables::new(namespace)),
        Arc::new(ReplicationState::new(namespace)),
        Arc::new(Processlist::new(namespace)),
        Arc::new(BinlogSize::new(namespace)),
        Arc::new(Heartbeat::new(
            namespace,
            &collect.heartbeat.database,
            &collect.heartbeat.table,
        )),
        Arc::new(InnodbMetrics::new(namespace)),
        Arc::new(TableIoWaits::new(namespace)),
    ]
}

/// `(name, value)` from a two-column `SHOW ...` row.
fn name_value(row: &TextRow) -> Option<(&str, &str)> {
    Some((row.value_at(0)?, row.value_at(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_match_task_names() {
        let scrapers = builtin("mysql", &CollectConfig::default());
        let names: Vec<&str> = scrapers.iter().map(|s| s.name()).collect();

        assert_eq!(names, TASK_NAMES);
    }

    #[test]
    fn test_builtin_defaults() {
        let scrapers = builtin("mysql", &CollectConfig::default());
        let enabled: Vec<&str> = scrapers
            .iter()
            .filter(|s| s.enabled_by_default())
            .map(|s| s.name())
            .collect();

        assert_eq!(enabled, vec![GLOBAL_STATUS, GLOBAL_VARIABLES, REPLICATION_STATE]);
    }

    #[test]
    fn test_name_value() {
        let row = TextRow::new()
            .with("Variable_name", Some("Uptime"))
            .with("Value", Some("10"));
        assert_eq!(name_value(&row), Some(("Uptime", "10")));

        let row = TextRow::new().with("Variable_name", Some("Uptime"));
        assert_eq!(name_value(&row), None);
    }
}
