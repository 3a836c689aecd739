// Shared test helpers

#![allow(dead_code)]

use netdev_exporter::netdev::{DeviceStats, NetDevError, StatsSource};
use prometheus::Registry;
use std::sync::{Arc, Mutex};

/// Build DeviceStats from `(device, [(counter, value)])` pairs.
pub fn device_stats(devices: &[(&str, &[(&str, &str)])]) -> DeviceStats {
    devices
        .iter()
        .map(|(dev, counters)| {
            let counters = counters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            (dev.to_string(), counters)
        })
        .collect()
}

/// Text exposition of everything in `registry`.
pub fn encode(registry: &Registry) -> String {
    prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap()
}

/// Returns whatever stats it currently holds; swap them through `handle()`.
pub struct FixedSource {
    stats: Arc<Mutex<DeviceStats>>,
}

impl FixedSource {
    pub fn new(stats: DeviceStats) -> Self {
        Self {
            stats: Arc::new(Mutex::new(stats)),
        }
    }

    pub fn handle(&self) -> FixedSourceHandle {
        FixedSourceHandle(self.stats.clone())
    }
}

impl StatsSource for FixedSource {
    fn collect(&self) -> Result<DeviceStats, NetDevError> {
        Ok(self.stats.lock().unwrap().clone())
    }

    fn origin(&self) -> &str {
        "test-source"
    }
}

pub struct FixedSourceHandle(Arc<Mutex<DeviceStats>>);

impl FixedSourceHandle {
    pub fn replace(&self, stats: DeviceStats) {
        *self.0.lock().unwrap() = stats;
    }
}

/// Always reports a malformed header.
pub struct FailingSource;

impl StatsSource for FailingSource {
    fn collect(&self) -> Result<DeviceStats, NetDevError> {
        Err(NetDevError::MalformedFormat {
            origin: "test-source".into(),
            kind: "header line",
            line: "garbage".into(),
        })
    }

    fn origin(&self) -> &str {
        "test-source"
    }
}
