// Per-interface traffic counters read from the OS (/proc/net/dev or getifaddrs).
// Nothing in here logs; callers decide what to do with errors.

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub mod ifaddrs;
pub mod procfs;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
compile_error!("netdev-exporter currently only supports Linux, macOS and FreeBSD");

use std::collections::HashMap;

/// Counter name (`receive_bytes`, `transmit_drop`, ...) -> raw decimal text.
pub type CounterSet = HashMap<String, String>;

/// Device name -> counters read for it in one sample.
pub type DeviceStats = HashMap<String, CounterSet>;

/// Counters every source is expected to report. The text parser may add more,
/// depending on what the kernel header lists.
pub const FIXED_COUNTERS: [&str; 10] = [
    "receive_packets",
    "transmit_packets",
    "receive_errs",
    "transmit_errs",
    "receive_bytes",
    "transmit_bytes",
    "receive_multicast",
    "transmit_multicast",
    "receive_drop",
    "transmit_drop",
];

#[derive(Debug, thiserror::Error)]
pub enum NetDevError {
    #[error("{origin} unavailable: {source}")]
    SourceUnavailable {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {kind} in {origin}: {line}")]
    MalformedFormat {
        origin: String,
        kind: &'static str,
        line: String,
    },
}

/// A place per-device counters can be read from.
///
/// Every call reads current system state and returns a fresh map; implementations
/// keep no state between calls and never return a partially built result.
pub trait StatsSource: Send + Sync {
    fn collect(&self) -> Result<DeviceStats, NetDevError>;

    /// Where the counters come from, used in metric help text.
    fn origin(&self) -> &str;
}

/// Whether `default_source` honours the exclusion pattern on this build target.
pub const APPLIES_DEVICE_FILTER: bool = cfg!(target_os = "linux");

/// Source used on this build target.
#[cfg(target_os = "linux")]
pub fn default_source(
    path: &str,
    ignored_devices: Option<regex::Regex>,
) -> Box<dyn StatsSource> {
    Box::new(procfs::ProcNetDev::new(path, ignored_devices))
}

/// Source used on this build target. getifaddrs has no device filter.
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub fn default_source(
    _path: &str,
    _ignored_devices: Option<regex::Regex>,
) -> Box<dyn StatsSource> {
    Box::new(ifaddrs::IfAddrsSource)
}
