use crate::domain::errors::{GatherError, TransportError};
use crate::domain::sample::Sample;
use async_trait::async_trait;

/// Produces the current set of samples to push.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn gather(&self) -> Result<Vec<Sample>, GatherError>;
}

/// Delivers gathered samples to the gateway.
///
/// Implementations are expected to bound their own I/O with timeouts: the
/// scheduler waits for an in-flight send before it can stop.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, samples: Vec<Sample>) -> Result<(), TransportError>;
}
