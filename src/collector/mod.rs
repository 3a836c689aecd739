// Collector registry and the metric events collectors emit.

pub mod netdev;

use crate::config::AppConfig;
use crate::netdev::NetDevError;
use prometheus::{GaugeVec, Opts, Registry};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;

pub const NAMESPACE: &str = "node";

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Source(#[from] NetDevError),
    #[error("invalid value {value:?}: {source}")]
    InvalidValue {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("metric registration failed: {0}")]
    Registry(#[from] prometheus::Error),
    #[error("metric channel closed")]
    ChannelClosed,
    #[error("metric description cache lock poisoned")]
    Poisoned,
}

/// A gauge family registered once and reused for every sample of that name.
pub struct MetricDesc {
    fq_name: String,
    gauge: GaugeVec,
    /// Label sets currently exported under this name.
    published: Mutex<HashSet<Vec<String>>>,
}

impl MetricDesc {
    pub fn register(
        registry: &Registry,
        opts: Opts,
        label_names: &[&str],
    ) -> prometheus::Result<Self> {
        let fq_name = opts.fq_name();
        let gauge = GaugeVec::new(opts, label_names)?;
        registry.register(Box::new(gauge.clone()))?;
        Ok(Self {
            fq_name,
            gauge,
            published: Mutex::new(HashSet::new()),
        })
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    /// Record `current` as the exported label sets and remove the ones it no longer holds.
    /// The new samples must already be set.
    fn retain_only(&self, current: HashSet<Vec<String>>) {
        // A plain set stays consistent even if a holder panicked.
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for stale in published.difference(&current) {
            let labels: Vec<&str> = stale.iter().map(String::as_str).collect();
            if let Err(e) = self.gauge.remove_label_values(labels.as_slice()) {
                tracing::debug!(error = %e, metric = %self.fq_name, "stale label set already gone");
            }
        }
        *published = current;
    }
}

/// One labeled sample on its way to the registry.
#[derive(Clone)]
pub struct MetricEvent {
    pub desc: Arc<MetricDesc>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricEvent {
    pub fn apply(&self) {
        let labels: Vec<&str> = self.label_values.iter().map(String::as_str).collect();
        self.desc
            .gauge
            .with_label_values(labels.as_slice())
            .set(self.value);
    }
}

pub trait Collector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Read current stats and send one event per sample. Returns how many were sent.
    fn update(&self, tx: &UnboundedSender<MetricEvent>) -> Result<usize, CollectError>;

    /// Export the samples of a successful update. Label sets an earlier update
    /// exported but this one did not report are removed after the new values are set.
    fn publish(&self, events: &[MetricEvent]);
}

/// Set every sample in `events`, then drop label sets of `descs` that `events`
/// did not report. A concurrent gather sees old or new values, never a missing series.
pub fn publish_samples<'a>(
    descs: impl IntoIterator<Item = &'a Arc<MetricDesc>>,
    events: &[MetricEvent],
) {
    events.iter().for_each(MetricEvent::apply);

    let mut current: HashMap<&str, HashSet<Vec<String>>> = HashMap::new();
    for event in events {
        current
            .entry(event.desc.fq_name())
            .or_default()
            .insert(event.label_values.clone());
    }
    for desc in descs {
        desc.retain_only(current.remove(desc.fq_name()).unwrap_or_default());
    }
}

pub type Factory = fn(&AppConfig, &Registry) -> anyhow::Result<Box<dyn Collector>>;

/// Every collector this binary knows how to build, by config name.
pub fn factories() -> BTreeMap<&'static str, Factory> {
    let mut factories: BTreeMap<&'static str, Factory> = BTreeMap::new();
    factories.insert("netdev", netdev::NetDevCollector::from_config);
    factories
}

/// Build the collectors listed in `collectors.enabled`, in order.
pub fn build_enabled(
    config: &AppConfig,
    registry: &Registry,
) -> anyhow::Result<Vec<Arc<dyn Collector>>> {
    let factories = factories();
    config
        .collectors
        .enabled
        .iter()
        .map(|name| {
            let factory = factories
                .get(name.as_str())
                .ok_or_else(|| anyhow::anyhow!("unknown collector: {}", name))?;
            let collector = factory(config, registry)?;
            tracing::info!(collector = %name, "Collector enabled");
            Ok(Arc::from(collector))
        })
        .collect()
}
