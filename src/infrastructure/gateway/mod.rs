//! Delivery of samples to a Prometheus Pushgateway over HTTP.

pub mod transport;

pub use transport::{GatewayTransport, PushMethod, encode_text};
