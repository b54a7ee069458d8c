//! Self-observability for push jobs
//!
//! Push outcomes and durations are recorded as Prometheus metrics. Register
//! them in the registry a job pushes from and the gateway receives them too.

pub mod metrics;

pub use metrics::{PushMetrics, PushTimer};
