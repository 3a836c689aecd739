// Background collection worker.
// Each tick runs every collector on the blocking pool and publishes its samples
// only when the whole update succeeded.

use crate::collector::{Collector, MetricEvent, NAMESPACE};
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

/// node_scrape_collector_{duration_seconds,success}{collector}.
#[derive(Clone)]
pub struct ScrapeMetrics {
    duration: GaugeVec,
    success: GaugeVec,
}

impl ScrapeMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let duration = GaugeVec::new(
            Opts::new("collector_duration_seconds", "Duration of a collector scrape.")
                .namespace(NAMESPACE)
                .subsystem("scrape"),
            &["collector"],
        )?;
        let success = GaugeVec::new(
            Opts::new(
                "collector_success",
                "Whether a collector succeeded on its last scrape.",
            )
            .namespace(NAMESPACE)
            .subsystem("scrape"),
            &["collector"],
        )?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(success.clone()))?;
        Ok(Self { duration, success })
    }

    fn observe(&self, collector: &str, elapsed: Duration, ok: bool) {
        self.duration
            .with_label_values(&[collector])
            .set(elapsed.as_secs_f64());
        self.success
            .with_label_values(&[collector])
            .set(if ok { 1.0 } else { 0.0 });
    }
}

/// Outcome of one pass over all collectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub samples: usize,
}

pub struct WorkerDeps {
    pub collectors: Vec<Arc<dyn Collector>>,
    pub scrape_metrics: ScrapeMetrics,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

pub struct WorkerConfig {
    pub sample_interval_ms: u64,
    /// How often to log collection stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Run every collector once. A failed collector keeps the values it published last time.
pub async fn run_cycle(
    collectors: &[Arc<dyn Collector>],
    scrape_metrics: &ScrapeMetrics,
) -> CycleSummary {
    let mut summary = CycleSummary::default();
    for collector in collectors {
        let name = collector.name();
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel::<MetricEvent>();
        let task = {
            let collector = collector.clone();
            tokio::task::spawn_blocking(move || collector.update(&tx))
        };
        let result = match task.await {
            Ok(r) => r.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::anyhow!("collector task join: {}", e)),
        };

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let elapsed = started.elapsed();

        match result {
            Ok(_) => {
                collector.publish(&events);
                scrape_metrics.observe(name, elapsed, true);
                summary.succeeded += 1;
                summary.samples += events.len();
                tracing::debug!(
                    collector = name,
                    samples = events.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Collector succeeded"
                );
            }
            Err(e) => {
                scrape_metrics.observe(name, elapsed, false);
                summary.failed += 1;
                tracing::warn!(
                    error = %e,
                    collector = name,
                    operation = "update",
                    "Collector failed; keeping previous samples"
                );
            }
        }
    }
    summary
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        collectors,
        scrape_metrics,
        mut shutdown_rx,
    } = deps;
    let WorkerConfig {
        sample_interval_ms,
        stats_log_interval_secs,
    } = config;

    let worker_span = tracing::span!(tracing::Level::DEBUG, "worker", sample_interval_ms);
    tokio::spawn(
        async move {
            let mut tick = interval(Duration::from_millis(sample_interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
            stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut cycles_total: u64 = 0;
            let mut failures_total: u64 = 0;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let summary = run_cycle(&collectors, &scrape_metrics).await;
                        cycles_total += 1;
                        failures_total += summary.failed as u64;
                    }
                    _ = stats_log_tick.tick() => {
                        tracing::info!(
                            collectors = collectors.len(),
                            cycles_total,
                            failures_total,
                            "collection stats"
                        );
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Worker shutting down");
                        break;
                    }
                }
            }
        }
        .instrument(worker_span),
    )
}
