use crate::netdev::procfs::PROC_NET_DEV;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub collectors: CollectorsConfig,
    #[serde(default)]
    pub netdev: NetDevConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub sample_interval_ms: u64,
    /// How often to log collection stats at INFO level.
    pub stats_log_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default = "default_enabled_collectors")]
    pub enabled: Vec<String>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_collectors(),
        }
    }
}

fn default_enabled_collectors() -> Vec<String> {
    vec!["netdev".into()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetDevConfig {
    /// Regexp of net devices to ignore. Empty disables filtering.
    #[serde(default = "default_ignored_devices")]
    pub ignored_devices: String,
    /// Only read on Linux.
    #[serde(default = "default_proc_path")]
    pub proc_path: String,
}

impl Default for NetDevConfig {
    fn default() -> Self {
        Self {
            ignored_devices: default_ignored_devices(),
            proc_path: default_proc_path(),
        }
    }
}

fn default_ignored_devices() -> String {
    "^$".into()
}

fn default_proc_path() -> String {
    PROC_NET_DEV.into()
}

impl NetDevConfig {
    pub fn ignored_devices_regex(&self) -> anyhow::Result<Option<Regex>> {
        if self.ignored_devices.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.ignored_devices)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("netdev.ignored_devices is not a valid regex: {}", e))
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.monitoring.sample_interval_ms > 0,
            "monitoring.sample_interval_ms must be > 0, got {}",
            self.monitoring.sample_interval_ms
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        anyhow::ensure!(
            !self.collectors.enabled.is_empty(),
            "collectors.enabled must list at least one collector"
        );
        let known = crate::collector::factories();
        for name in &self.collectors.enabled {
            anyhow::ensure!(
                known.contains_key(name.as_str()),
                "collectors.enabled: unknown collector {:?}",
                name
            );
        }
        anyhow::ensure!(
            !self.netdev.proc_path.is_empty(),
            "netdev.proc_path must be non-empty"
        );
        self.netdev.ignored_devices_regex()?;
        Ok(())
    }
}
