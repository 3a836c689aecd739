// netdev collector: turns DeviceStats into node_network_<counter>{device} gauges.

use super::{CollectError, Collector, MetricDesc, MetricEvent, NAMESPACE, publish_samples};
use crate::config::AppConfig;
use crate::netdev::{self, StatsSource};
use prometheus::{Opts, Registry};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

pub const SUBSYSTEM: &str = "network";

/// A non-default exclusion pattern the build's source cannot apply.
fn unapplied_pattern(ignored: Option<&Regex>) -> Option<&Regex> {
    ignored.filter(|p| !netdev::APPLIES_DEVICE_FILTER && p.as_str() != "^$")
}

pub struct NetDevCollector {
    source: Box<dyn StatsSource>,
    registry: Registry,
    metric_descs: Mutex<HashMap<String, Arc<MetricDesc>>>,
}

impl NetDevCollector {
    pub fn new(source: Box<dyn StatsSource>, registry: Registry) -> Self {
        Self {
            source,
            registry,
            metric_descs: Mutex::new(HashMap::new()),
        }
    }

    /// Factory entry: platform default source, configured exclusion pattern.
    pub fn from_config(
        config: &AppConfig,
        registry: &Registry,
    ) -> anyhow::Result<Box<dyn Collector>> {
        let ignored = config.netdev.ignored_devices_regex()?;
        if let Some(pattern) = unapplied_pattern(ignored.as_ref()) {
            tracing::info!(
                collector = "netdev",
                ignored_devices = %pattern,
                "netdev.ignored_devices has no effect with getifaddrs; every interface is reported"
            );
        }
        let source = netdev::default_source(&config.netdev.proc_path, ignored);
        Ok(Box::new(Self::new(source, registry.clone())))
    }

    fn desc_for(
        &self,
        descs: &mut HashMap<String, Arc<MetricDesc>>,
        key: &str,
    ) -> Result<Arc<MetricDesc>, CollectError> {
        if let Some(desc) = descs.get(key) {
            return Ok(desc.clone());
        }
        let opts = Opts::new(key, format!("{} from {}.", key, self.source.origin()))
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM);
        let desc = Arc::new(MetricDesc::register(&self.registry, opts, &["device"])?);
        descs.insert(key.to_string(), desc.clone());
        Ok(desc)
    }
}

impl Collector for NetDevCollector {
    fn name(&self) -> &'static str {
        "netdev"
    }

    fn update(&self, tx: &UnboundedSender<MetricEvent>) -> Result<usize, CollectError> {
        let net_dev = self.source.collect()?;
        let mut descs = self
            .metric_descs
            .lock()
            .map_err(|_| CollectError::Poisoned)?;

        let mut sent = 0;
        for (dev, dev_stats) in &net_dev {
            for (key, value) in dev_stats {
                let desc = self.desc_for(&mut descs, key)?;
                let v: f64 = value.parse().map_err(|source| CollectError::InvalidValue {
                    value: value.clone(),
                    source,
                })?;
                tx.send(MetricEvent {
                    desc,
                    label_values: vec![dev.clone()],
                    value: v,
                })
                .map_err(|_| CollectError::ChannelClosed)?;
                sent += 1;
            }
        }
        tracing::debug!(
            collector = "netdev",
            devices = net_dev.len(),
            samples = sent,
            "netdev update"
        );
        Ok(sent)
    }

    fn publish(&self, events: &[MetricEvent]) {
        match self.metric_descs.lock() {
            Ok(descs) => publish_samples(descs.values(), events),
            Err(_) => {
                events.iter().for_each(MetricEvent::apply);
                tracing::warn!(
                    collector = "netdev",
                    operation = "publish",
                    "metric description cache lock poisoned; vanished devices stay exported"
                );
            }
        }
    }
}
