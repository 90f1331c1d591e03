//! Configuration for the panel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use pyrsia_reconcile::DEFAULT_RECONCILE_INTERVAL;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Panel runtime configuration.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Interval between periodic refreshes.
    pub refresh_interval: Duration,

    /// Timeout for requests to the node.
    pub request_timeout: Duration,

    /// Overrides the per-user directory holding the state file.
    pub state_dir: Option<PathBuf>,

    /// Docker executable.
    pub docker_bin: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Node address applied at startup, before any command runs.
    pub node_address: Option<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_RECONCILE_INTERVAL,
            request_timeout: Duration::from_secs(10),
            state_dir: None,
            docker_bin: "docker".to_string(),
            log_level: "warn".to_string(),
            log_format: LogFormat::Text,
            node_address: None,
        }
    }
}

impl PanelConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let refresh_interval = lookup("PYRSIA_PANEL_REFRESH_INTERVAL")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.refresh_interval);
        if refresh_interval.is_zero() {
            bail!("PYRSIA_PANEL_REFRESH_INTERVAL must be at least 1 second");
        }

        let request_timeout = lookup("PYRSIA_PANEL_REQUEST_TIMEOUT")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let state_dir = lookup("PYRSIA_PANEL_STATE_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let docker_bin = lookup("PYRSIA_PANEL_DOCKER")
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.docker_bin);

        let log_level = lookup("PYRSIA_PANEL_LOG_LEVEL").unwrap_or(defaults.log_level);

        let log_format = match lookup("PYRSIA_PANEL_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => bail!("Unknown log format '{other}' (expected text or json)"),
        };

        let node_address = lookup("PYRSIA_PANEL_NODE_ADDRESS").filter(|s| !s.trim().is_empty());

        Ok(Self {
            refresh_interval,
            request_timeout,
            state_dir,
            docker_bin,
            log_level,
            log_format,
            node_address,
        })
    }
}
