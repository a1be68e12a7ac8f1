//! Ambient operator configuration (`config.yaml`).
//!
//! A missing or unparsable config file fails open: every caller gets the
//! all-defaults [`Config`] rather than an error, since none of these
//! settings are required for correct (if unconfigured) operation.

use std::{fs, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_GPU_LEASE_TIMEOUT, DEFAULT_HEALTH_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
};
use crate::runtime;

/// Fleet update policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Re-resolve the version lock at update time and accept whatever it
    /// (or the service's default image) currently names.
    #[default]
    Rolling,
    /// Only update when the version lock names a reference different from
    /// what's already pinned; otherwise the service is left alone.
    Pinned,
}

/// `updates:` block.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpdatesConfig {
    /// Fleet update policy.
    pub mode: UpdateMode,
}

/// `gpu_lock:` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpuLockConfig {
    /// Override for the stale-lock reclamation timeout, in seconds.
    pub lease_timeout_secs: u64,
}

impl Default for GpuLockConfig {
    fn default() -> Self {
        Self {
            lease_timeout_secs: DEFAULT_GPU_LEASE_TIMEOUT.as_secs(),
        }
    }
}

impl GpuLockConfig {
    /// Resolved lease timeout as a [`Duration`].
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs.max(1))
    }
}

/// `health:` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// Number of retries before declaring a probe red.
    pub max_retries: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HEALTH_TIMEOUT.as_secs(),
            max_retries: 3,
        }
    }
}

impl HealthConfig {
    /// Resolved timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// `suspend:` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuspendConfig {
    /// Idle timeout, in seconds, before a suspend action is invoked.
    pub idle_timeout_secs: u64,
    /// When `true`, log the suspend decision but never actually invoke it.
    pub dry_run: bool,
}

impl Default for SuspendConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            dry_run: false,
        }
    }
}

impl SuspendConfig {
    /// Resolved idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

/// `secrets:` block.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecretsConfig {
    /// Override for the directory holding encrypted secret blobs.
    pub dir: Option<String>,
    /// Override for the path to the bootstrap passphrase file.
    pub passphrase_path: Option<String>,
}

/// Top-level operator configuration, loaded from `config.yaml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Fleet update policy.
    pub updates: UpdatesConfig,
    /// GPU lock overrides.
    pub gpu_lock: GpuLockConfig,
    /// Health probe overrides.
    pub health: HealthConfig,
    /// Auto-suspend overrides.
    pub suspend: SuspendConfig,
    /// Secret store overrides.
    pub secrets: SecretsConfig,
}

impl Config {
    /// Loads `config.yaml` from the configured config directory, returning
    /// an all-defaults [`Config`] if the file is missing, unreadable, or
    /// fails to parse. Parse failures are logged at `warn` rather than
    /// propagated: ambient config is never load-bearing.
    pub fn load() -> Self {
        let path = runtime::config_dir().join(CONFIG_FILE_NAME);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to read {}: {err}", path.display());
                }
                return Self::default();
            }
        };
        match serde_yaml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                warn!("failed to parse {}: {err}, using defaults", path.display());
                Self::default()
            }
        }
    }
}
