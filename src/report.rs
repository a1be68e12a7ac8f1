//! Aggregate fleet status reporting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    container::Runtime,
    error::AistackError,
    gpu_lock::GpuLockManager,
    manager::FleetManager,
    probe::{GpuHealthCheck, GpuHealthProbe, NvidiaSmiGpuProbe},
    service::{ServiceSpec, ServiceState},
};

/// A full point-in-time snapshot of fleet health.
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    /// UTC timestamp the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Per-service status entries, in fleet order.
    pub services: Vec<ServiceReportEntry>,
    /// Current GPU lock holder, or `"none"`.
    pub gpu_lock_holder: String,
    /// GPU smoke-test reachability result.
    pub gpu: GpuReportEntry,
    /// `true` iff every service is [`ServiceState::Running`].
    pub all_healthy: bool,
}

/// Serializable mirror of [`GpuHealthCheck`].
#[derive(Debug, Clone, Serialize)]
pub struct GpuReportEntry {
    /// `true` if the GPU smoke test passed (or none was expected).
    pub ok: bool,
    /// Human-readable detail from the smoke test.
    pub message: String,
}

impl From<GpuHealthCheck> for GpuReportEntry {
    fn from(check: GpuHealthCheck) -> Self {
        Self {
            ok: check.ok,
            message: check.message,
        }
    }
}

/// One service's entry within a [`FleetReport`]: `{name, health, message}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReportEntry {
    /// Service name.
    pub name: String,
    /// Observed lifecycle state, rendered as its snake_case name.
    pub state: String,
    /// Tri-state health (`green`/`yellow`/`red`): `red` whenever the
    /// status query itself failed.
    pub health: String,
    /// Human-readable detail: the captured error for a failed query,
    /// otherwise a short description of the observed state.
    pub message: String,
}

/// Builds a full [`FleetReport`] by querying every registered service and
/// the GPU lock manager.
pub fn generate_report(
    specs: &HashMap<String, ServiceSpec>,
    runtime: &Runtime,
) -> Result<FleetReport, AistackError> {
    let manager = FleetManager::new(runtime, specs.clone());
    let statuses = manager.status_all()?;

    let all_healthy = statuses.iter().all(|s| s.state == ServiceState::Running);

    let gpu_lock = GpuLockManager::with_lease_timeout(
        crate::constants::GPU_LOCK_HOLDERS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        crate::config::Config::load().gpu_lock.lease_timeout(),
    );
    let gpu_status = gpu_lock.get_status()?;
    let gpu_health: GpuReportEntry = NvidiaSmiGpuProbe.check().into();

    Ok(FleetReport {
        generated_at: Utc::now(),
        services: statuses
            .into_iter()
            .map(|s| {
                let message = s
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("service is {}", s.state));
                ServiceReportEntry {
                    name: s.name,
                    state: s.state.to_string(),
                    health: s.health.to_string(),
                    message,
                }
            })
            .collect(),
        gpu_lock_holder: gpu_status.holder,
        gpu: gpu_health,
        all_healthy,
    })
}

/// Returns `true` iff every registered service is currently
/// [`ServiceState::Running`] and the GPU smoke test passes.
pub fn check_all_healthy(
    specs: &HashMap<String, ServiceSpec>,
    runtime: &Runtime,
) -> Result<bool, AistackError> {
    let manager = FleetManager::new(runtime, specs.clone());
    let statuses = manager.status_all()?;
    let all_services_running = statuses.iter().all(|s| s.state == ServiceState::Running);
    Ok(all_services_running && NvidiaSmiGpuProbe.check().ok)
}
