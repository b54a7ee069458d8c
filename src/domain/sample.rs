use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Metric type as declared on a family's `# TYPE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
            MetricKind::Untyped => "untyped",
        }
    }
}

/// Metadata shared by every sample of one metric family.
///
/// A histogram family `x` owns the `x_bucket`, `x_sum` and `x_count` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamilyInfo {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
}

/// One data point of a named metric series.
///
/// Labels are kept ordered so the same series always renders identically.
/// Samples without a family are pushed as untyped series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub family: Option<Arc<MetricFamilyInfo>>,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            value,
            family: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_family(mut self, family: Arc<MetricFamilyInfo>) -> Self {
        self.family = Some(family);
        self
    }

    /// Name of the family this sample is encoded under
    pub fn family_name(&self) -> &str {
        self.family
            .as_deref()
            .map_or(self.name.as_str(), |f| f.name.as_str())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the sample as one line of the Prometheus text exposition format.
impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.labels.is_empty() {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                .collect::<Vec<_>>()
                .join(",");
            write!(f, "{{{}}}", labels)?;
        }
        if self.value.is_nan() {
            write!(f, " NaN")
        } else if self.value.is_infinite() {
            write!(f, " {}Inf", if self.value > 0.0 { "+" } else { "-" })
        } else {
            write!(f, " {}", self.value)
        }
    }
}
