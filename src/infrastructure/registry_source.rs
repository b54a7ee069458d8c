//! `MetricsSource` backed by a Prometheus registry.
//!
//! Each gathered metric family is flattened into one sample per series, the
//! same series the text exposition format would emit. Every sample keeps a
//! shared reference to its family's name, help and type.

use crate::domain::errors::GatherError;
use crate::domain::ports::MetricsSource;
use crate::domain::sample::{MetricFamilyInfo, MetricKind, Sample};
use async_trait::async_trait;
use prometheus::Registry;
use prometheus::proto::{Metric, MetricFamily, MetricType};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub struct RegistrySource {
    registry: Registry,
    namespace: Option<String>,
}

impl RegistrySource {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            namespace: None,
        }
    }

    /// Prefix every sample name with `{namespace}_`
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn qualified(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}_{}", ns, name),
            _ => name.to_string(),
        }
    }

    fn flatten(&self, family: &MetricFamily, out: &mut Vec<Sample>) {
        let info = Arc::new(MetricFamilyInfo {
            name: self.qualified(family.get_name()),
            help: family.help().to_string(),
            kind: metric_kind(family.get_field_type()),
        });
        let name = info.name.as_str();
        let sample = |name: &str, labels: &BTreeMap<String, String>, value: f64| Sample {
            name: name.to_string(),
            labels: labels.clone(),
            value,
            family: Some(info.clone()),
        };

        for metric in family.get_metric() {
            let labels = base_labels(metric);

            match info.kind {
                MetricKind::Counter => out.push(sample(name, &labels, metric.counter.value())),
                MetricKind::Gauge => out.push(sample(name, &labels, metric.gauge.value())),
                MetricKind::Untyped => out.push(sample(name, &labels, metric.untyped.value())),
                MetricKind::Histogram => {
                    let histogram = &metric.histogram;
                    let bucket_name = format!("{}_bucket", name);
                    // The +Inf bucket is implicit in the proto, emitted below
                    for bucket in histogram
                        .bucket
                        .iter()
                        .filter(|b| b.upper_bound().is_finite())
                    {
                        let mut bucket_labels = labels.clone();
                        bucket_labels.insert("le".to_string(), bucket.upper_bound().to_string());
                        out.push(sample(
                            &bucket_name,
                            &bucket_labels,
                            bucket.cumulative_count() as f64,
                        ));
                    }
                    let mut inf_labels = labels.clone();
                    inf_labels.insert("le".to_string(), "+Inf".to_string());
                    let count = histogram.sample_count() as f64;
                    out.push(sample(&bucket_name, &inf_labels, count));
                    out.push(sample(
                        &format!("{}_sum", name),
                        &labels,
                        histogram.sample_sum(),
                    ));
                    out.push(sample(&format!("{}_count", name), &labels, count));
                }
                MetricKind::Summary => {
                    let summary = &metric.summary;
                    for quantile in &summary.quantile {
                        let mut quantile_labels = labels.clone();
                        quantile_labels
                            .insert("quantile".to_string(), quantile.quantile().to_string());
                        out.push(sample(name, &quantile_labels, quantile.value()));
                    }
                    out.push(sample(
                        &format!("{}_sum", name),
                        &labels,
                        summary.sample_sum(),
                    ));
                    out.push(sample(
                        &format!("{}_count", name),
                        &labels,
                        summary.sample_count() as f64,
                    ));
                }
            }
        }
    }
}

fn metric_kind(metric_type: MetricType) -> MetricKind {
    match metric_type {
        MetricType::COUNTER => MetricKind::Counter,
        MetricType::GAUGE => MetricKind::Gauge,
        MetricType::HISTOGRAM => MetricKind::Histogram,
        MetricType::SUMMARY => MetricKind::Summary,
        MetricType::UNTYPED => MetricKind::Untyped,
    }
}

fn base_labels(metric: &Metric) -> BTreeMap<String, String> {
    metric
        .label
        .iter()
        .map(|pair| (pair.name().to_string(), pair.value().to_string()))
        .collect()
}

#[async_trait]
impl MetricsSource for RegistrySource {
    async fn gather(&self) -> Result<Vec<Sample>, GatherError> {
        let families = self.registry.gather();

        let mut samples = Vec::new();
        for family in &families {
            self.flatten(family, &mut samples);
        }

        // A histogram's _sum/_count can collide with another registered family
        let mut seen = HashSet::with_capacity(samples.len());
        for s in &samples {
            if !seen.insert((s.name.as_str(), &s.labels)) {
                return Err(GatherError::Inconsistent {
                    reason: format!("duplicate series {}", s.name),
                });
            }
        }

        Ok(samples)
    }
}
