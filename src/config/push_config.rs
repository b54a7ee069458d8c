//! Push job configuration.
//!
//! `PushEnvConfig` is the raw environment view; `PushJobConfig` is the
//! validated form a `PushJob` is built from.

use crate::domain::errors::ConfigError;
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_GATEWAY_URL: &str = "http://localhost:9091";
const DEFAULT_JOB_NAME: &str = "gatepush";
const DEFAULT_INTERVAL_MS: u64 = 15_000;
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Push settings as read from the environment
#[derive(Debug, Clone)]
pub struct PushEnvConfig {
    pub gateway_url: String,
    pub job_name: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PushEnvConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            job_name: DEFAULT_JOB_NAME.to_string(),
            interval_ms: DEFAULT_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl PushEnvConfig {
    pub fn from_env() -> Self {
        Self {
            gateway_url: env::var("PUSHGATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string()),
            job_name: env::var("PUSH_JOB_NAME").unwrap_or_else(|_| DEFAULT_JOB_NAME.to_string()),
            interval_ms: env::var("PUSH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_INTERVAL_MS),
            timeout_ms: env::var("PUSH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn job_config(&self) -> Result<PushJobConfig, ConfigError> {
        PushJobConfig::new(
            self.job_name.clone(),
            &self.gateway_url,
            Duration::from_millis(self.interval_ms),
        )
    }
}

/// Validated identity and cadence of a push job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushJobConfig {
    job_name: String,
    endpoint: Url,
    interval: Duration,
}

impl PushJobConfig {
    /// # Arguments
    /// * `job_name` - Name the gateway groups pushed series under, without '/'
    /// * `endpoint` - Absolute http(s) URL of the gateway
    /// * `interval` - Time between scheduled pushes, must be non-zero
    pub fn new(
        job_name: impl Into<String>,
        endpoint: &str,
        interval: Duration,
    ) -> Result<Self, ConfigError> {
        let job_name = job_name.into();
        if job_name.trim().is_empty() {
            return Err(ConfigError::EmptyJobName);
        }
        // The gateway routes on the decoded URL path
        if job_name.contains('/') {
            return Err(ConfigError::InvalidJobName {
                job_name,
                reason: "must not contain '/'".to_string(),
            });
        }

        let endpoint = Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        Ok(Self {
            job_name,
            endpoint,
            interval,
        })
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
