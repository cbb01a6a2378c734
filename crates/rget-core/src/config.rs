use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::Backoff;

/// Backoff parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Baseline retry delay in milliseconds; also the jitter range.
    pub min_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 3_000,
        }
    }
}

/// Transfer configuration loaded from `~/.config/rget/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Bytes per range job.
    pub range_size: u64,
    /// Per-endpoint liveness probe timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Per-range-request timeout in seconds. Kept short: a hung call should
    /// fail fast into the retry path rather than stall a pool slot.
    pub request_timeout_secs: u64,
    /// Skip TLS certificate verification (self-signed edge endpoints).
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional backoff tuning; built-in defaults when missing.
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,
    /// Optional per-range attempt cap. `None` retries forever, matching the
    /// assumption that endpoint failures are transient; set a cap to turn a
    /// permanently stuck range into a terminal transfer error.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            range_size: 1 << 20,
            probe_timeout_secs: 3,
            request_timeout_secs: 3,
            accept_invalid_certs: false,
            backoff: None,
            max_attempts: None,
        }
    }
}

impl FetchConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff policy from the optional `[backoff]` section, or defaults.
    pub fn backoff(&self) -> Backoff {
        let cfg = self.backoff.clone().unwrap_or_default();
        Backoff {
            min_delay: Duration::from_millis(cfg.min_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: FetchConfig = toml::from_str(&data)?;
    Ok(cfg)
}
