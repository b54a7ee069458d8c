//! Prometheus self-metrics for push jobs
//!
//! All metrics use the `gatepush_` prefix. They live in the caller's registry,
//! so when that registry is also the push source the job reports on itself.

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus metrics describing push activity
#[derive(Clone)]
pub struct PushMetrics {
    registry: Arc<Registry>,
    /// Push attempts by job and outcome
    pub push_total: CounterVec,
    /// Wall time of pushes that won the guard
    pub push_duration_seconds: HistogramVec,
}

impl PushMetrics {
    /// Create the metrics in a private registry
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create the metrics and register them in `registry`
    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let push_total = CounterVec::new(
            Opts::new("gatepush_push_total", "Push attempts by outcome"),
            &["job", "outcome"],
        )?;
        registry.register(Box::new(push_total.clone()))?;

        let push_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gatepush_push_duration_seconds",
                "Time spent gathering and sending one push",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["job"],
        )?;
        registry.register(Box::new(push_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            push_total,
            push_duration_seconds,
        })
    }

    /// Render all metrics in the registry in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_outcome(&self, job: &str, outcome: &str) {
        self.push_total.with_label_values(&[job, outcome]).inc();
    }

    /// Start timing a push; the duration is observed when the timer drops
    pub fn start_timer(&self, job: &str) -> PushTimer {
        PushTimer::new(self.push_duration_seconds.with_label_values(&[job]))
    }
}

/// RAII timer recording push duration into a histogram
pub struct PushTimer {
    start: std::time::Instant,
    histogram: prometheus::Histogram,
}

impl PushTimer {
    fn new(histogram: prometheus::Histogram) -> Self {
        Self {
            start: std::time::Instant::now(),
            histogram,
        }
    }
}

impl Drop for PushTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
