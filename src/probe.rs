//! Host utilization probes feeding the auto-suspend controller.

use std::{fs, io, time::Duration};

use thiserror::Error;

use crate::constants::CPU_SAMPLE_WINDOW;

/// Errors raised while sampling host utilization.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// `/proc/stat` could not be read.
    #[error("failed to read /proc/stat: {0}")]
    Io(#[from] io::Error),

    /// `/proc/stat`'s `cpu` summary line was missing or malformed.
    #[error("malformed /proc/stat cpu line: '{0}'")]
    MalformedStat(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq + self.steal
    }

    fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

fn read_cpu_line() -> Result<CpuTimes, ProbeError> {
    let contents = fs::read_to_string("/proc/stat")?;
    let line = contents
        .lines()
        .find(|line| line.starts_with("cpu "))
        .ok_or_else(|| ProbeError::MalformedStat(contents.lines().next().unwrap_or("").to_string()))?;

    let fields: Vec<u64> = line
        .split_ascii_whitespace()
        .skip(1)
        .filter_map(|field| field.parse().ok())
        .collect();

    if fields.len() < 8 {
        return Err(ProbeError::MalformedStat(line.to_string()));
    }

    Ok(CpuTimes {
        user: fields[0],
        nice: fields[1],
        system: fields[2],
        idle: fields[3],
        iowait: fields[4],
        irq: fields[5],
        softirq: fields[6],
        steal: fields[7],
    })
}

/// Samples CPU utilization by reading `/proc/stat` twice across a window.
pub struct CpuProbe {
    sample_window: Duration,
}

impl CpuProbe {
    /// Builds a probe using the default sample window.
    pub fn new() -> Self {
        Self::with_window(CPU_SAMPLE_WINDOW)
    }

    /// Builds a probe with an explicit sample window, mainly for tests.
    pub fn with_window(sample_window: Duration) -> Self {
        Self { sample_window }
    }

    /// Returns CPU utilization as a percentage in `[0.0, 100.0]`, averaged
    /// over the configured sample window.
    pub fn utilization_percent(&self) -> Result<f64, ProbeError> {
        let before = read_cpu_line()?;
        std::thread::sleep(self.sample_window);
        let after = read_cpu_line()?;

        let total_delta = after.total().saturating_sub(before.total());
        if total_delta == 0 {
            return Ok(0.0);
        }
        let idle_delta = after.idle_total().saturating_sub(before.idle_total());
        let active_delta = total_delta.saturating_sub(idle_delta);

        Ok((active_delta as f64 / total_delta as f64) * 100.0)
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// A GPU utilization source. Abstracted behind a trait so the suspend
/// controller can run on hosts without an NVIDIA GPU or `nvidia-smi`
/// installed: this crate never bundles GPU driver interaction of its own.
pub trait GpuProbe {
    /// Returns GPU utilization as a percentage in `[0.0, 100.0]`.
    fn utilization_percent(&self) -> Result<f64, ProbeError>;
}

/// A [`GpuProbe`] that always reports `0.0`, used when no GPU is present or
/// `nvidia-smi` is unavailable; idle decisions then rely solely on CPU.
pub struct NullGpuProbe;

impl GpuProbe for NullGpuProbe {
    fn utilization_percent(&self) -> Result<f64, ProbeError> {
        Ok(0.0)
    }
}

/// Result of a GPU smoke-test health check: whether the host's GPU is
/// reachable at all, distinct from its utilization.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuHealthCheck {
    /// `true` if the probe could reach the GPU (or none is expected).
    pub ok: bool,
    /// Human-readable detail, surfaced in the fleet report.
    pub message: String,
}

/// A GPU reachability smoke test, separate from utilization sampling so a
/// GPU-less host is not penalized by [`check_all_healthy`](crate::report::check_all_healthy).
pub trait GpuHealthProbe {
    /// Performs the smoke test and returns its outcome.
    fn check(&self) -> GpuHealthCheck;
}

impl GpuHealthProbe for NullGpuProbe {
    fn check(&self) -> GpuHealthCheck {
        GpuHealthCheck {
            ok: true,
            message: "no GPU probe configured, skipped".to_string(),
        }
    }
}

/// Shells out to `nvidia-smi` to sample GPU utilization.
pub struct NvidiaSmiGpuProbe;

impl GpuProbe for NvidiaSmiGpuProbe {
    /// Returns `-1.0` when `nvidia-smi` is unavailable or fails, the
    /// sentinel reserved for "utilization could not be sampled" (distinct
    /// from a genuine `0.0` idle reading).
    fn utilization_percent(&self) -> Result<f64, ProbeError> {
        let output = std::process::Command::new("nvidia-smi")
            .args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
            .output();

        let Ok(output) = output else {
            return Ok(-1.0);
        };
        if !output.status.success() {
            return Ok(-1.0);
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let first_line = text.lines().next().unwrap_or("").trim();
        Ok(first_line.parse().unwrap_or(-1.0))
    }
}

impl GpuHealthProbe for NvidiaSmiGpuProbe {
    fn check(&self) -> GpuHealthCheck {
        let output = std::process::Command::new("nvidia-smi").arg("-L").output();
        match output {
            Ok(out) if out.status.success() => GpuHealthCheck {
                ok: true,
                message: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            },
            Ok(out) => GpuHealthCheck {
                ok: false,
                message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            },
            Err(err) => GpuHealthCheck {
                ok: false,
                message: err.to_string(),
            },
        }
    }
}
