//! Configuration system for the domain server.
//!
//! Resolution order: defaults → config file → environment variables.
//! Command-line flags are applied on top by the daemon.
//!
//! Config file location:
//!   1. $DOMAIN_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/domain-server/config.toml
//!   3. ~/.config/domain-server/config.toml

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::assignment::ASSIGNMENT_SERVER_PORT;
use crate::wire::DOMAIN_LISTEN_PORT;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub network: NetworkConfig,
    pub assignment: AssignmentConfig,
    pub liveness: LivenessConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port for node check-ins.
    pub udp_port: u16,
    /// TCP port for the plain-text status page.
    pub status_port: u16,
    /// This host's address as nodes see it. None = auto-detect.
    pub host_address: Option<Ipv4Addr>,
    /// Local-testing mode: never rewrite co-located public addresses.
    pub local_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Where provisioning requests are sent.
    pub server: SocketAddr,
    /// Pool tag forwarded in every assignment. None = any pool.
    pub pool: Option<String>,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Nodes silent for longer than this are removed.
    pub timeout_ms: u64,
    /// How often the reaper scans the registry.
    pub check_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Stats collector address. None = emit to the log only.
    pub stats_host: Option<SocketAddr>,
    pub interval_ms: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            udp_port: DOMAIN_LISTEN_PORT,
            status_port: 8080,
            host_address: None,
            local_mode: false,
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from((Ipv4Addr::LOCALHOST, ASSIGNMENT_SERVER_PORT)),
            pool: None,
            interval_ms: 1_000,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            check_interval_ms: 2_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            stats_host: None,
            interval_ms: 5_000,
        }
    }
}

/// Timer periods are never shorter than this; a zero period cannot tick.
const MIN_PERIOD_MS: u64 = 1;

fn period(ms: u64) -> Duration {
    Duration::from_millis(ms.max(MIN_PERIOD_MS))
}

impl AssignmentConfig {
    pub fn interval(&self) -> Duration {
        period(self.interval_ms)
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        period(self.check_interval_ms)
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        period(self.interval_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("domain-server")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DomainConfig {
    /// Load config: file → env vars, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path. A missing file yields the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            DomainConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("assignment.interval_ms", self.assignment.interval_ms),
            ("liveness.check_interval_ms", self.liveness.check_interval_ms),
            ("metrics.interval_ms", self.metrics.interval_ms),
        ];
        match periods.into_iter().find(|(_, ms)| *ms == 0) {
            Some((key, _)) => Err(ConfigError::ZeroInterval(key)),
            None => Ok(()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DOMAIN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DomainConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply DOMAIN_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(p) = var("DOMAIN_NETWORK__UDP_PORT").and_then(|v| v.parse().ok()) {
            self.network.udp_port = p;
        }
        if let Some(p) = var("DOMAIN_NETWORK__STATUS_PORT").and_then(|v| v.parse().ok()) {
            self.network.status_port = p;
        }
        if let Some(ip) = var("DOMAIN_NETWORK__HOST_ADDRESS").and_then(|v| v.parse().ok()) {
            self.network.host_address = Some(ip);
        }
        if let Some(v) = var("DOMAIN_NETWORK__LOCAL_MODE") {
            self.network.local_mode = v == "true" || v == "1";
        }
        if let Some(addr) = var("DOMAIN_ASSIGNMENT__SERVER").and_then(|v| v.parse().ok()) {
            self.assignment.server = addr;
        }
        if let Some(pool) = var("DOMAIN_ASSIGNMENT__POOL") {
            self.assignment.pool = Some(pool);
        }
        if let Some(ms) = var("DOMAIN_ASSIGNMENT__INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.assignment.interval_ms = ms;
        }
        if let Some(ms) = var("DOMAIN_LIVENESS__TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.liveness.timeout_ms = ms;
        }
        if let Some(ms) = var("DOMAIN_LIVENESS__CHECK_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.liveness.check_interval_ms = ms;
        }
        if let Some(addr) = var("DOMAIN_METRICS__STATS_HOST").and_then(|v| v.parse().ok()) {
            self.metrics.stats_host = Some(addr);
        }
        if let Some(ms) = var("DOMAIN_METRICS__INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.metrics.interval_ms = ms;
        }
    }
}
