use crate::application::push::single_flight::SingleFlightGuard;
use crate::application::push::stats::{PushStats, PushStatsSnapshot};
use crate::config::PushJobConfig;
use crate::domain::errors::{PushError, SchedulerError};
use crate::domain::ports::{MetricsSource, Transport};
use crate::infrastructure::observability::PushMetrics;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle of a push job's background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Result of one guarded push attempt
#[derive(Debug)]
pub enum PushOutcome {
    Pushed { samples: usize },
    /// Another push held the guard; nothing was gathered or sent
    Skipped,
    Failed(PushError),
}

impl PushOutcome {
    fn label(&self) -> &'static str {
        match self {
            PushOutcome::Pushed { .. } => "pushed",
            PushOutcome::Skipped => "skipped",
            PushOutcome::Failed(PushError::Panicked { .. }) => "panicked",
            PushOutcome::Failed(_) => "failed",
        }
    }
}

/// State shared between the job owner, push handles and the background loop
struct PushCore {
    config: PushJobConfig,
    source: Arc<dyn MetricsSource>,
    transport: Arc<dyn Transport>,
    guard: SingleFlightGuard,
    stats: PushStats,
    metrics: Option<PushMetrics>,
}

impl PushCore {
    async fn push(&self) -> PushOutcome {
        let outcome = match self.guard.permit() {
            Some(_permit) => {
                self.stats.record_attempt();
                let _timer = self
                    .metrics
                    .as_ref()
                    .map(|m| m.start_timer(self.config.job_name()));

                match AssertUnwindSafe(self.gather_and_send())
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(samples)) => {
                        self.stats.record_pushed();
                        debug!(
                            "PushJob [{}]: Pushed {} samples to {}",
                            self.config.job_name(),
                            samples,
                            self.config.endpoint()
                        );
                        PushOutcome::Pushed { samples }
                    }
                    Ok(Err(e)) => {
                        self.stats.record_failed();
                        warn!(
                            "PushJob [{}]: Could not push to gateway {}: {}",
                            self.config.job_name(),
                            self.config.endpoint(),
                            e
                        );
                        PushOutcome::Failed(e)
                    }
                    Err(payload) => {
                        self.stats.record_panicked();
                        let message = panic_message(payload.as_ref());
                        error!(
                            "PushJob [{}]: Push to gateway {} panicked: {}",
                            self.config.job_name(),
                            self.config.endpoint(),
                            message
                        );
                        PushOutcome::Failed(PushError::Panicked { message })
                    }
                }
            }
            None => {
                self.stats.record_skipped();
                debug!(
                    "PushJob [{}]: Previous push still in flight, skipping",
                    self.config.job_name()
                );
                PushOutcome::Skipped
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.inc_outcome(self.config.job_name(), outcome.label());
        }
        outcome
    }

    async fn gather_and_send(&self) -> Result<usize, PushError> {
        let samples = self.source.gather().await?;
        let count = samples.len();
        self.transport.send(samples).await?;
        Ok(count)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn run_loop(core: Arc<PushCore>, mut stop_rx: oneshot::Receiver<()>) {
    let period = core.config.interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            // Ok means stop() was called, Err means the PushJob was dropped
            _ = &mut stop_rx => break,

            _ = ticker.tick() => {
                core.push().await;
            }
        }
    }

    debug!(
        "PushJob [{}]: Push loop exited",
        core.config.job_name()
    );
}

struct Worker {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Periodically pushes gathered samples to a gateway.
///
/// At most one push runs at a time across the timer and any manual
/// triggers; an attempt that finds a push in flight is skipped. Push
/// failures, including panics, are logged and never reach the caller.
///
/// Dropping a running job signals its loop to exit at the next wait
/// without waiting for it; call [`PushJob::stop`] for a confirmed shutdown.
pub struct PushJob {
    core: Arc<PushCore>,
    state: SchedulerState,
    worker: Option<Worker>,
}

impl PushJob {
    pub fn new(
        config: PushJobConfig,
        source: Arc<dyn MetricsSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::build(config, source, transport, None)
    }

    /// Like [`PushJob::new`], also recording outcomes and durations in `metrics`
    pub fn with_metrics(
        config: PushJobConfig,
        source: Arc<dyn MetricsSource>,
        transport: Arc<dyn Transport>,
        metrics: PushMetrics,
    ) -> Self {
        Self::build(config, source, transport, Some(metrics))
    }

    fn build(
        config: PushJobConfig,
        source: Arc<dyn MetricsSource>,
        transport: Arc<dyn Transport>,
        metrics: Option<PushMetrics>,
    ) -> Self {
        Self {
            core: Arc::new(PushCore {
                config,
                source,
                transport,
                guard: SingleFlightGuard::new(),
                stats: PushStats::default(),
                metrics,
            }),
            state: SchedulerState::Idle,
            worker: None,
        }
    }

    /// Launch the background push loop.
    ///
    /// No-op while Running or Stopping. A Stopped job can be started again.
    /// Fails only when called outside a Tokio runtime.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        match self.state {
            SchedulerState::Running | SchedulerState::Stopping => {
                debug!(
                    "PushJob [{}]: start() ignored, job is {:?}",
                    self.job_name(),
                    self.state
                );
                return Ok(());
            }
            SchedulerState::Idle | SchedulerState::Stopped => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| SchedulerError::RuntimeUnavailable)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = runtime.spawn(run_loop(self.core.clone(), stop_rx));
        self.worker = Some(Worker {
            stop_tx: Some(stop_tx),
            handle,
        });
        self.state = SchedulerState::Running;

        info!(
            "PushJob [{}]: Started (gateway: {}, interval: {:?})",
            self.job_name(),
            self.endpoint(),
            self.interval()
        );
        Ok(())
    }

    /// Stop the background loop and wait until it has exited.
    ///
    /// An in-flight push is allowed to finish first; there is no timeout on
    /// that wait. No-op unless Running. If a previous `stop()` was cancelled
    /// while waiting, calling it again resumes the wait.
    pub async fn stop(&mut self) {
        if !matches!(
            self.state,
            SchedulerState::Running | SchedulerState::Stopping
        ) {
            return;
        }
        self.state = SchedulerState::Stopping;
        info!("PushJob [{}]: Stopping", self.job_name());

        if let Some(worker) = self.worker.as_mut() {
            if let Some(stop_tx) = worker.stop_tx.take() {
                // The receiver is only gone if the loop already exited
                let _ = stop_tx.send(());
            }
            if let Err(e) = (&mut worker.handle).await {
                error!(
                    "PushJob [{}]: Push loop terminated abnormally: {}",
                    self.core.config.job_name(),
                    e
                );
            }
        }

        self.worker = None;
        self.state = SchedulerState::Stopped;
        info!("PushJob [{}]: Stopped", self.job_name());
    }

    /// Run one guarded push now, independent of the timer
    pub async fn push_now(&self) -> PushOutcome {
        self.core.push().await
    }

    /// Cloneable handle for triggering pushes from other tasks
    pub fn handle(&self) -> PushHandle {
        PushHandle {
            core: self.core.clone(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> PushStatsSnapshot {
        self.core.stats.snapshot()
    }

    pub fn job_name(&self) -> &str {
        self.core.config.job_name()
    }

    pub fn endpoint(&self) -> &url::Url {
        self.core.config.endpoint()
    }

    pub fn interval(&self) -> Duration {
        self.core.config.interval()
    }
}

/// Manual trigger for a [`PushJob`], shareable across tasks.
///
/// Pushes through a handle go through the same single-flight guard as the
/// job's timer.
#[derive(Clone)]
pub struct PushHandle {
    core: Arc<PushCore>,
}

impl PushHandle {
    pub async fn push_now(&self) -> PushOutcome {
        self.core.push().await
    }

    pub fn stats(&self) -> PushStatsSnapshot {
        self.core.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{GatherError, TransportError};
    use crate::domain::sample::Sample;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        gathers: AtomicUsize,
    }

    #[async_trait]
    impl MetricsSource for CountingSource {
        async fn gather(&self) -> Result<Vec<Sample>, GatherError> {
            let n = self.gathers.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(vec![Sample::new("ticks_total", n as f64)])
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl MetricsSource for BrokenSource {
        async fn gather(&self) -> Result<Vec<Sample>, GatherError> {
            Err(GatherError::Inconsistent {
                reason: "duplicate metric ticks_total".to_string(),
            })
        }
    }

    /// Tracks how many sends overlap
    #[derive(Default)]
    struct SlowTransport {
        delay: Duration,
        sends: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _samples: Vec<Sample>) -> Result<(), TransportError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingTransport {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _samples: Vec<Sample>) -> Result<(), TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Network {
                endpoint: "http://gw:9091".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        async fn send(&self, _samples: Vec<Sample>) -> Result<(), TransportError> {
            panic!("encoder blew up");
        }
    }

    fn config(interval: Duration) -> PushJobConfig {
        PushJobConfig::new("test_job", "http://gw:9091", interval).expect("valid config")
    }

    #[tokio::test]
    async fn test_new_job_is_idle() {
        let job = PushJob::new(
            config(Duration::from_secs(1)),
            Arc::new(CountingSource::default()),
            Arc::new(SlowTransport::default()),
        );

        assert_eq!(job.state(), SchedulerState::Idle);
        assert_eq!(job.stats(), PushStatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_push_now_gathers_and_sends() {
        let source = Arc::new(CountingSource::default());
        let transport = Arc::new(SlowTransport::default());
        let job = PushJob::new(config(Duration::from_secs(60)), source.clone(), transport.clone());

        let outcome = job.push_now().await;

        assert!(matches!(outcome, PushOutcome::Pushed { samples: 1 }));
        assert_eq!(source.gathers.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
        assert!(!job.core.guard.is_held());
    }

    #[tokio::test]
    async fn test_held_guard_skips_without_side_effects() {
        let source = Arc::new(CountingSource::default());
        let transport = Arc::new(SlowTransport::default());
        let job = PushJob::new(config(Duration::from_secs(60)), source.clone(), transport.clone());

        let permit = job.core.guard.permit().expect("guard should be free");

        assert!(matches!(job.push_now().await, PushOutcome::Skipped));
        assert!(job.core.guard.is_held(), "a skipped push must leave the guard held");
        assert!(matches!(job.push_now().await, PushOutcome::Skipped));

        assert_eq!(source.gathers.load(Ordering::SeqCst), 0);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
        assert_eq!(job.stats().skipped, 2);
        assert_eq!(job.stats().attempts, 0);

        drop(permit);
        assert!(matches!(job.push_now().await, PushOutcome::Pushed { .. }));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gather_error_is_isolated() {
        let transport = Arc::new(SlowTransport::default());
        let job = PushJob::new(
            config(Duration::from_secs(60)),
            Arc::new(BrokenSource),
            transport.clone(),
        );

        let outcome = job.push_now().await;

        assert!(matches!(
            outcome,
            PushOutcome::Failed(PushError::Gather(GatherError::Inconsistent { .. }))
        ));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
        assert!(!job.core.guard.is_held());
    }

    #[tokio::test]
    async fn test_panicking_transport_releases_guard() {
        let job = PushJob::new(
            config(Duration::from_secs(60)),
            Arc::new(CountingSource::default()),
            Arc::new(PanickingTransport),
        );

        let outcome = job.push_now().await;

        match outcome {
            PushOutcome::Failed(PushError::Panicked { message }) => {
                assert!(message.contains("encoder blew up"));
            }
            other => panic!("expected panic outcome, got {:?}", other),
        }
        assert!(job.core.guard.try_acquire(), "guard must be free after a panic");
        job.core.guard.release();
        assert_eq!(job.stats().panicked, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pushes_are_single_flight() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let job = PushJob::new(
            config(Duration::from_secs(60)),
            Arc::new(CountingSource::default()),
            transport.clone(),
        );

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let handle = job.handle();
                tokio::spawn(async move { handle.push_now().await })
            })
            .collect();

        let mut pushed = 0;
        let mut skipped = 0;
        for task in tasks {
            match task.await.expect("push task panicked") {
                PushOutcome::Pushed { .. } => pushed += 1,
                PushOutcome::Skipped => skipped += 1,
                PushOutcome::Failed(e) => panic!("unexpected failure: {}", e),
            }
        }

        assert!(pushed >= 1);
        assert!(skipped >= 1, "expected overlapping attempts to be turned away");
        assert_eq!(pushed + skipped, 16);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sends.load(Ordering::SeqCst), pushed);
        assert_eq!(job.handle().stats().skipped, skipped as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_transport_keeps_scheduler_running() {
        let source = Arc::new(CountingSource::default());
        let transport = Arc::new(FailingTransport::default());
        let mut job = PushJob::new(
            config(Duration::from_millis(100)),
            source.clone(),
            transport.clone(),
        );

        job.start().expect("start inside runtime");
        tokio::time::sleep(Duration::from_millis(550)).await;

        assert_eq!(job.state(), SchedulerState::Running);
        assert_eq!(source.gathers.load(Ordering::SeqCst), 5);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 5);
        assert_eq!(job.stats().failed, 5);

        job.stop().await;
        assert_eq!(job.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_push_waits_one_interval() {
        let source = Arc::new(CountingSource::default());
        let mut job = PushJob::new(
            config(Duration::from_millis(100)),
            source.clone(),
            Arc::new(SlowTransport::default()),
        );

        job.start().expect("start inside runtime");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.gathers.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.gathers.load(Ordering::SeqCst), 1);

        job.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let mut job = PushJob::new(
            config(Duration::from_secs(60)),
            Arc::new(CountingSource::default()),
            Arc::new(SlowTransport::default()),
        );

        job.start().expect("first start");
        job.start().expect("second start is a no-op");
        assert_eq!(job.state(), SchedulerState::Running);

        job.stop().await;
        assert_eq!(job.state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut job = PushJob::new(
            config(Duration::from_secs(60)),
            Arc::new(CountingSource::default()),
            Arc::new(SlowTransport::default()),
        );

        job.stop().await;
        assert_eq!(job.state(), SchedulerState::Idle);

        job.start().expect("start");
        job.stop().await;
        job.stop().await;
        assert_eq!(job.state(), SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let source = Arc::new(CountingSource::default());
        let mut job = PushJob::new(
            config(Duration::from_millis(100)),
            source.clone(),
            Arc::new(SlowTransport::default()),
        );

        job.start().expect("start");
        tokio::time::sleep(Duration::from_millis(150)).await;
        job.stop().await;
        assert_eq!(source.gathers.load(Ordering::SeqCst), 1);

        job.start().expect("restart");
        assert_eq!(job.state(), SchedulerState::Running);
        tokio::time::sleep(Duration::from_millis(150)).await;
        job.stop().await;
        assert_eq!(source.gathers.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_push() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let mut job = PushJob::new(
            config(Duration::from_millis(100)),
            Arc::new(CountingSource::default()),
            transport.clone(),
        );

        job.start().expect("start");
        // First tick fires at 100ms, its send runs until 400ms
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 1);

        job.stop().await;

        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_stop_can_be_resumed() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(300),
            ..Default::default()
        });
        let mut job = PushJob::new(
            config(Duration::from_millis(100)),
            Arc::new(CountingSource::default()),
            transport.clone(),
        );

        job.start().expect("start");
        tokio::time::sleep(Duration::from_millis(150)).await;

        let interrupted = tokio::time::timeout(Duration::from_millis(50), job.stop()).await;
        assert!(interrupted.is_err(), "stop should still be waiting on the push");
        assert_eq!(job.state(), SchedulerState::Stopping);

        job.start().expect("start while stopping is a no-op");
        assert_eq!(job.state(), SchedulerState::Stopping);

        job.stop().await;
        assert_eq!(job.state(), SchedulerState::Stopped);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let mut job = PushJob::new(
            config(Duration::from_secs(1)),
            Arc::new(CountingSource::default()),
            Arc::new(SlowTransport::default()),
        );

        assert!(matches!(
            job.start(),
            Err(SchedulerError::RuntimeUnavailable)
        ));
        assert_eq!(job.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_outcomes_recorded_in_metrics() {
        let metrics = PushMetrics::new().expect("Failed to create metrics");
        let job = PushJob::with_metrics(
            config(Duration::from_secs(60)),
            Arc::new(CountingSource::default()),
            Arc::new(FailingTransport::default()),
            metrics.clone(),
        );

        job.push_now().await;

        let output = metrics.render();
        assert!(output.contains("gatepush_push_total{job=\"test_job\",outcome=\"failed\"} 1"));
        assert!(output.contains("gatepush_push_duration_seconds_count{job=\"test_job\"} 1"));
    }
}
