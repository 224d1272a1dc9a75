use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Value type of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Monotonically increasing.
    Counter,

    /// Can go up or down.
    Gauge,

    /// Value of unknown semantics, exported as-is.
    Untyped,
}

impl ValueType {
    /// Get the string used in `# TYPE` lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Counter => "counter",
            ValueType::Gauge => "gauge",
            ValueType::Untyped => "untyped",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable description of a metric family.
///
/// Two descriptors are equal when name, help, type and label schema match.
/// A registry relies on the label schema of a name never changing between
/// collections.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Desc {
    /// Fully-qualified metric name (e.g., "mysql_exporter_scrapes_total").
    pub fq_name: String,

    /// Help text.
    pub help: String,

    /// Value type.
    pub value_type: ValueType,

    /// Variable label names, in the order label values are supplied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub label_names: Vec<String>,
}

impl Desc {
    /// Create a new descriptor.
    pub fn new(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        value_type: ValueType,
        label_names: &[&str],
    ) -> Self {
        Self {
            fq_name: fq_name.into(),
            help: help.into(),
            value_type,
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Create a new shareable descriptor.
    pub fn shared(
        fq_name: impl Into<String>,
        help: impl Into<String>,
        value_type: ValueType,
        label_names: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self::new(fq_name, help, value_type, label_names))
    }
}

/// Join non-empty name parts with underscores.
///
/// `fq_name("mysql", "exporter", "scrapes_total")` gives
/// `mysql_exporter_scrapes_total`; empty parts are skipped.
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// A single metric sample bound to its descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    desc: Arc<Desc>,
    label_values: Vec<String>,
    value: f64,
}

impl Metric {
    /// Create a sample.
    ///
    /// Fails if the number of label values does not match the descriptor's
    /// label schema.
    pub fn new<I, S>(desc: Arc<Desc>, value: f64, label_values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();

        if label_values.len() != desc.label_names.len() {
            return Err(Error::LabelCardinality {
                metric: desc.fq_name.clone(),
                expected: desc.label_names.len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            desc,
            label_values,
            value,
        })
    }

    /// Create a sample without labels.
    pub fn unlabeled(desc: Arc<Desc>, value: f64) -> Result<Self> {
        Self::new(desc, value, std::iter::empty::<String>())
    }

    /// The descriptor of this sample.
    pub fn desc(&self) -> &Arc<Desc> {
        &self.desc
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        &self.desc.fq_name
    }

    /// The sample value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Label values in schema order.
    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Iterate over `(name, value)` label pairs.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.desc
            .label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Look up a label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}
