//! gatepush - headless metrics pusher
//!
//! Registers process metrics in a Prometheus registry and pushes them to a
//! Pushgateway on a fixed interval until Ctrl+C.
//!
//! # Usage
//! ```sh
//! PUSHGATEWAY_URL=http://localhost:9091 PUSH_INTERVAL_MS=5000 cargo run --bin gatepush
//! ```
//!
//! # Environment Variables
//! - `PUSHGATEWAY_URL` - Gateway base URL (default: http://localhost:9091)
//! - `PUSH_JOB_NAME` - Job name series are grouped under (default: gatepush)
//! - `PUSH_INTERVAL_MS` - Interval between pushes (default: 15000)
//! - `PUSH_TIMEOUT_MS` - Per-request timeout (default: 10000)

use anyhow::{Context, Result};
use gatepush::application::push::PushJob;
use gatepush::config::PushEnvConfig;
use gatepush::infrastructure::observability::PushMetrics;
use gatepush::infrastructure::{GatewayTransport, RegistrySource};
use prometheus::{Gauge, Opts, Registry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("gatepush {} starting...", env!("CARGO_PKG_VERSION"));

    let env_config = PushEnvConfig::from_env();
    let job_config = env_config
        .job_config()
        .context("Invalid push configuration")?;

    let registry = Registry::new();
    let uptime = Gauge::with_opts(Opts::new(
        "process_uptime_seconds",
        "Seconds since the pusher started",
    ))?;
    registry.register(Box::new(uptime.clone()))?;
    let metrics = PushMetrics::with_registry(registry.clone())?;

    let transport = GatewayTransport::new(&job_config, env_config.timeout())
        .context("Invalid gateway endpoint")?;
    info!("Pushing to {}", transport.push_url());

    let mut job = PushJob::with_metrics(
        job_config,
        Arc::new(RegistrySource::new(registry)),
        Arc::new(transport),
        metrics,
    );
    job.start()?;

    let started = Instant::now();
    let mut refresh = tokio::time::interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = refresh.tick() => {
                uptime.set(started.elapsed().as_secs_f64());
            }
        }
    }

    info!("Shutdown signal received. Stopping push job...");
    job.stop().await;

    // One last push so the gateway holds the final values
    let outcome = job.push_now().await;
    info!("Final push: {:?}", outcome);

    match serde_json::to_string(&job.stats()) {
        Ok(json) => println!("PUSH_STATS_JSON:{}", json),
        Err(e) => tracing::warn!("Failed to serialize push stats: {}", e),
    }

    Ok(())
}
