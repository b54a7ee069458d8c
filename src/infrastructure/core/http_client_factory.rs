use reqwest::Client;
use std::time::Duration;
use tracing::warn;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// Creates an HTTP client for gateway pushes.
    ///
    /// No retry middleware: a failed push is retried by the next tick, and
    /// every request is bounded by `timeout` so a hung gateway cannot block
    /// the push loop indefinitely.
    pub fn create_client(timeout: Duration) -> Client {
        Client::builder()
            .pool_max_idle_per_host(1)
            .timeout(timeout)
            .connect_timeout(timeout.min(MAX_CONNECT_TIMEOUT))
            .build()
            .unwrap_or_else(|e| {
                warn!("HttpClientFactory: Falling back to default client: {}", e);
                Client::new()
            })
    }
}
