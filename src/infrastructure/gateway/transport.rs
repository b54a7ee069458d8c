use crate::config::PushJobConfig;
use crate::domain::errors::{ConfigError, TransportError};
use crate::domain::ports::Transport;
use crate::domain::sample::{MetricFamilyInfo, Sample};
use crate::infrastructure::core::HttpClientFactory;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// How a push treats series already stored under the job's group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMethod {
    /// POST: replaces only metrics with the same names as the pushed ones
    #[default]
    Add,
    /// PUT: replaces every metric in the group
    Replace,
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Render samples in the Prometheus text exposition format.
///
/// Samples are grouped per family in order of first appearance, as the
/// format requires. Families with metadata get `# HELP` and `# TYPE` lines;
/// bare samples are left untyped.
pub fn encode_text(samples: &[Sample]) -> String {
    let mut groups: Vec<(Option<&MetricFamilyInfo>, Vec<&Sample>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for sample in samples {
        let slot = *index.entry(sample.family_name()).or_insert_with(|| {
            groups.push((sample.family.as_deref(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(sample);
    }

    let mut body = String::new();
    for (family, members) in groups {
        if let Some(family) = family {
            body.push_str(&format!(
                "# HELP {} {}\n# TYPE {} {}\n",
                family.name,
                escape_help(&family.help),
                family.name,
                family.kind.as_str()
            ));
        }
        for sample in members {
            body.push_str(&sample.to_string());
            body.push('\n');
        }
    }
    body
}

/// Pushes samples to `{endpoint}/metrics/job/{job}`
pub struct GatewayTransport {
    client: Client,
    push_url: Url,
    method: PushMethod,
}

impl GatewayTransport {
    pub fn new(config: &PushJobConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let mut push_url = config.endpoint().clone();
        push_url
            .path_segments_mut()
            .map_err(|_| ConfigError::InvalidEndpoint {
                endpoint: config.endpoint().to_string(),
                reason: "cannot be used as a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(&["metrics", "job", config.job_name()]);

        Ok(Self {
            client: HttpClientFactory::create_client(timeout),
            push_url,
            method: PushMethod::default(),
        })
    }

    pub fn with_method(mut self, method: PushMethod) -> Self {
        self.method = method;
        self
    }

    pub fn push_url(&self) -> &Url {
        &self.push_url
    }
}

#[async_trait]
impl Transport for GatewayTransport {
    async fn send(&self, samples: Vec<Sample>) -> Result<(), TransportError> {
        let body = encode_text(&samples);

        let request = match self.method {
            PushMethod::Add => self.client.post(self.push_url.clone()),
            PushMethod::Replace => self.client.put(self.push_url.clone()),
        };

        let response = request
            .header(CONTENT_TYPE, TEXT_FORMAT)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Network {
                endpoint: self.push_url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected {
                endpoint: self.push_url.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        debug!(
            "GatewayTransport: Pushed {} samples to {} ({})",
            samples.len(),
            self.push_url,
            status
        );
        Ok(())
    }
}
