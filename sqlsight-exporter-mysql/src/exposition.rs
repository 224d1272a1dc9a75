//! Prometheus text exposition format (version 0.0.4).

use std::collections::BTreeMap;
use std::io::Write;

use sqlsight_common::Metric;

/// Content type of [`render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in the text exposition format.
///
/// Samples are grouped by metric name, names are sorted, and each family
/// gets one `# HELP` and one `# TYPE` line taken from its first sample.
/// Within a family, series keep the order they were collected in.
pub fn render(metrics: &[Metric]) -> String {
    let mut by_name: BTreeMap<&str, Vec<&Metric>> = BTreeMap::new();
    for metric in metrics {
        by_name.entry(metric.name()).or_default().push(metric);
    }

    let mut output = Vec::with_capacity(metrics.len() * 100);

    for (name, series) in by_name {
        let desc = series[0].desc();
        writeln!(output, "# HELP {} {}", name, escape_help(&desc.help)).ok();
        writeln!(output, "# TYPE {} {}", name, desc.value_type.as_str()).ok();

        for metric in series {
            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(metric),
                format_value(metric.value())
            )
            .ok();
        }
    }

    String::from_utf8(output).unwrap_or_default()
}

/// Escape a label value for Prometheus.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape help text; quotes are allowed there.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn format_labels(metric: &Metric) -> String {
    let parts: Vec<String> = metric
        .labels()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    if parts.is_empty() {
        return String::new();
    }
    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsight_common::{Desc, ValueType};

    #[test]
    fn test_render_groups_and_sorts() {
        let up = Desc::shared("mysql_up", "Whether the MySQL server is up.", ValueType::Gauge, &[]);
        let duration = Desc::shared(
            "mysql_exporter_collector_duration_seconds",
            "Collector time duration.",
            ValueType::Gauge,
            &["collector"],
        );
        let metrics = vec![
            Metric::unlabeled(up, 1.0).unwrap(),
            Metric::new(duration.clone(), 0.25, ["global_status"]).unwrap(),
            Metric::new(duration, 0.5, ["connection"]).unwrap(),
        ];

        let output = render(&metrics);

        assert_eq!(
            output,
            "# HELP mysql_exporter_collector_duration_seconds Collector time duration.\n\
             # TYPE mysql_exporter_collector_duration_seconds gauge\n\
             mysql_exporter_collector_duration_seconds{collector=\"global_status\"} 0.25\n\
             mysql_exporter_collector_duration_seconds{collector=\"connection\"} 0.5\n\
             # HELP mysql_up Whether the MySQL server is up.\n\
             # TYPE mysql_up gauge\n\
             mysql_up 1\n"
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_escape_help() {
        assert_eq!(escape_help("say \"hi\"\nnow"), "say \"hi\"\\nnow");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
