//! Idle-triggered auto-suspend controller.

use std::{
    io,
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    constants::{
        IDLE_CPU_THRESHOLD_PERCENT, IDLE_GPU_THRESHOLD_PERCENT, SUSPEND_STATE_FILE_NAME,
    },
    probe::{CpuProbe, GpuProbe},
    runtime,
    state_dir,
};

/// Errors raised by the auto-suspend controller.
#[derive(Debug, Error)]
pub enum SuspendError {
    /// Sampling CPU or GPU utilization failed.
    #[error(transparent)]
    Probe(#[from] crate::probe::ProbeError),

    /// Reading or writing the suspend state file failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The configured suspend command could not be executed.
    #[error("failed to invoke suspend command '{command}': {source}")]
    SuspendCommandFailed {
        /// The command that failed.
        command: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Persisted auto-suspend controller state: `last_active_timestamp` is
/// seconds since the Unix epoch, updated every time the host is observed
/// non-idle. It is deliberately not reset by invoking suspend itself, only
/// a non-idle sample moves it forward, so a host that stays idle keeps
/// re-triggering suspend on every check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendState {
    /// Whether the controller is enabled.
    pub enabled: bool,
    /// Seconds since the Unix epoch the host was last observed non-idle.
    pub last_active_timestamp: u64,
}

impl Default for SuspendState {
    fn default() -> Self {
        Self {
            enabled: true,
            last_active_timestamp: now_unix(),
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn state_path() -> PathBuf {
    runtime::state_dir().join(SUSPEND_STATE_FILE_NAME)
}

fn load_state() -> SuspendState {
    match std::fs::read(state_path()) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => SuspendState::default(),
    }
}

fn save_state(state: &SuspendState) -> Result<(), SuspendError> {
    state_dir::atomic_write_json(&state_path(), state, state_dir::OWNER_ONLY_FILE_MODE)?;
    Ok(())
}

/// Drives the idle-detection decision and (optionally) invokes the host
/// suspend command.
pub struct SuspendController<'a> {
    idle_timeout: Duration,
    dry_run: bool,
    gpu_probe: &'a dyn GpuProbe,
}

impl<'a> SuspendController<'a> {
    /// Builds a controller with the given idle timeout, dry-run flag, and
    /// GPU utilization source.
    pub fn new(idle_timeout: Duration, dry_run: bool, gpu_probe: &'a dyn GpuProbe) -> Self {
        Self {
            idle_timeout,
            dry_run,
            gpu_probe,
        }
    }

    /// Enables the controller, resetting the last-active timestamp to now.
    pub fn enable(&self) -> Result<(), SuspendError> {
        save_state(&SuspendState {
            enabled: true,
            last_active_timestamp: now_unix(),
        })
    }

    /// Disables the controller; [`check_and_suspend`](Self::check_and_suspend)
    /// becomes a no-op until re-enabled.
    pub fn disable(&self) -> Result<(), SuspendError> {
        let mut state = load_state();
        state.enabled = false;
        save_state(&state)
    }

    /// Samples CPU/GPU utilization, updates the idle-tracking state, and
    /// invokes `systemctl suspend` once the host has been continuously idle
    /// for `idle_timeout`. Returns `true` iff suspend was (or, in dry-run
    /// mode, would have been) invoked.
    ///
    /// A GPU reading of exactly `-1.0` means the probe is unavailable (spec
    /// §4.11); idleness then falls back to the CPU reading alone rather
    /// than treating the sentinel as "fully idle GPU".
    pub fn check_and_suspend(&self) -> Result<bool, SuspendError> {
        let mut state = load_state();
        if !state.enabled {
            return Ok(false);
        }

        let cpu_pct = CpuProbe::new().utilization_percent()?;
        let gpu_pct = self.gpu_probe.utilization_percent()?;
        let gpu_idle = gpu_pct < 0.0 || gpu_pct < IDLE_GPU_THRESHOLD_PERCENT;
        let is_idle = cpu_pct < IDLE_CPU_THRESHOLD_PERCENT && gpu_idle;

        if !is_idle {
            state.last_active_timestamp = now_unix();
            save_state(&state)?;
            return Ok(false);
        }

        let idle_for = Duration::from_secs(now_unix().saturating_sub(state.last_active_timestamp));

        if idle_for < self.idle_timeout {
            return Ok(false);
        }

        if self.dry_run {
            info!("auto-suspend: idle for {:?}, dry-run, not suspending", idle_for);
            return Ok(true);
        }

        invoke_suspend()?;
        Ok(true)
    }
}

fn invoke_suspend() -> Result<(), SuspendError> {
    let started = SystemTime::now();
    let status = std::process::Command::new("systemctl")
        .arg("suspend")
        .status()
        .map_err(|source| SuspendError::SuspendCommandFailed {
            command: "systemctl suspend".to_string(),
            source,
        })?;
    if !status.success() {
        warn!("systemctl suspend exited with {status}");
    } else {
        info!(
            "host suspended after {:?}",
            started.elapsed().unwrap_or_default()
        );
    }
    Ok(())
}
