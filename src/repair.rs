//! Recovery operations: restart-in-place, fleet-wide repair, and full purge.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::Config,
    constants::{FLEET_UPDATE_ORDER, GPU_LOCK_HOLDERS, PURGE_PRESERVED_ENTRIES, REPAIR_SETTLE_INTERVAL, UNINSTALL_LOG_FILE_NAME},
    container::Runtime,
    error::AistackError,
    gpu_lock::GpuLockManager,
    manager::{hooks_for, materialize_spec},
    runtime,
    service::{Service, ServiceSpec, ServiceState},
    state_dir,
};

fn recognised_gpu_holders() -> Vec<String> {
    GPU_LOCK_HOLDERS.iter().map(|s| s.to_string()).collect()
}

/// Outcome of repairing a single service.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    /// Name of the repaired service.
    pub service: String,
    /// State observed after the repair attempt.
    pub state: String,
    /// `true` if a restart was actually performed.
    pub restarted: bool,
    /// `true` if the service is healthy (green) after the attempt.
    pub success: bool,
    /// Reason the repair was skipped without restarting, if any.
    pub skipped_reason: Option<String>,
}

/// Restarts a single service in place: stop (log-and-continue), remove the
/// container (log-and-continue), start (fatal), settle, then
/// re-probe health. A service already green is left untouched.
///
/// Stop/remove failures are advisory because a missing or already-stopped
/// container is exactly the state repair is trying to reach; a failed
/// start is fatal because without it there is nothing left to settle or
/// re-probe.
pub fn repair_service(spec: &ServiceSpec, runtime: &Runtime) -> Result<RepairOutcome, AistackError> {
    let materialized = materialize_spec(spec);
    let probe = Service::new(materialized.clone(), runtime);
    let current_state = probe.status()?;

    if current_state == ServiceState::Running {
        return Ok(RepairOutcome {
            service: spec.name.clone(),
            state: current_state.to_string(),
            restarted: false,
            success: true,
            skipped_reason: Some("already healthy".to_string()),
        });
    }

    if let Err(err) = runtime.stop(&materialized.name) {
        warn!("repair: stop of '{}' failed (continuing): {err}", materialized.name);
    }
    if let Err(err) = runtime.remove_container(&materialized.name) {
        warn!("repair: remove of '{}' failed (continuing): {err}", materialized.name);
    }

    let (pre_start, post_stop) = hooks_for(runtime, &materialized.name, &materialized.image_ref);
    let service = Service::with_hooks(materialized, runtime, pre_start, post_stop);
    service.start()?;
    crate::container::settle(REPAIR_SETTLE_INTERVAL);

    let state = service.status()?;
    let success = state == ServiceState::Running;
    info!("repaired '{}', now {state} (success={success})", spec.name);
    Ok(RepairOutcome {
        service: spec.name.clone(),
        state: state.to_string(),
        restarted: true,
        success,
        skipped_reason: None,
    })
}

/// Restarts every registered service in fleet order, collecting a per-service
/// outcome even when individual restarts fail.
pub fn repair_all(
    specs: &HashMap<String, ServiceSpec>,
    runtime: &Runtime,
) -> Vec<Result<RepairOutcome, AistackError>> {
    FLEET_UPDATE_ORDER
        .iter()
        .filter_map(|name| specs.get(*name))
        .map(|spec| repair_service(spec, runtime))
        .collect()
}

/// Entry in the uninstall log written by [`purge_all`].
#[derive(Debug, Clone, Serialize)]
struct UninstallLogEntry {
    service: String,
    removed: bool,
    detail: Option<String>,
}

/// Tears down every registered service and wipes GPU-lock/suspend state.
///
/// The state directory is always enumerated and cleared; when
/// `remove_configs` is `false`, entries in [`PURGE_PRESERVED_ENTRIES`] are
/// left behind so a subsequent `InstallProfile` can reuse them. The config
/// directory is only removed wholesale when `remove_configs` is `true` and
/// it still equals its safe default location; a relocated config directory
/// is left in place with a warning either way.
pub fn purge_all(
    specs: &HashMap<String, ServiceSpec>,
    runtime: &Runtime,
    remove_configs: bool,
) -> Result<(), AistackError> {
    let mut entries = Vec::new();
    for name in FLEET_UPDATE_ORDER {
        let Some(spec) = specs.get(*name) else {
            continue;
        };
        let service = Service::new(spec.clone(), runtime);
        match service.remove(false) {
            Ok(()) => entries.push(UninstallLogEntry {
                service: spec.name.clone(),
                removed: true,
                detail: None,
            }),
            Err(err) => {
                warn!("purge: failed to remove '{}': {err}", spec.name);
                entries.push(UninstallLogEntry {
                    service: spec.name.clone(),
                    removed: false,
                    detail: Some(err.to_string()),
                });
            }
        }
    }

    if let Err(err) = runtime.remove_network(crate::constants::SHARED_NETWORK_NAME) {
        warn!("purge: failed to remove shared network (continuing): {err}");
    }

    let gpu_lock = GpuLockManager::with_lease_timeout(recognised_gpu_holders(), Config::load().gpu_lock.lease_timeout());
    gpu_lock.force_unlock()?;

    // Record the uninstall log before wiping the state directory, since the
    // log itself lives there.
    let state_dir = runtime::state_dir();
    let log_path = state_dir.join(UNINSTALL_LOG_FILE_NAME);
    state_dir::atomic_write_json(&log_path, &entries, state_dir::OWNER_GROUP_READ_FILE_MODE)?;

    if let Ok(read_dir) = std::fs::read_dir(&state_dir) {
        for entry in read_dir.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == UNINSTALL_LOG_FILE_NAME {
                continue;
            }
            if !remove_configs && PURGE_PRESERVED_ENTRIES.contains(&name.as_ref()) {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    if remove_configs {
        let config_dir = runtime::config_dir();
        if config_dir == std::path::PathBuf::from(crate::constants::DEFAULT_CONFIG_DIR) {
            if config_dir.is_dir() {
                let _ = std::fs::remove_dir_all(&config_dir);
            }
        } else {
            warn!(
                "purge: config directory '{}' is not the safe default, leaving it in place",
                config_dir.display()
            );
        }
    }

    info!("purge complete (remove_configs={remove_configs})");
    Ok(())
}

/// Result of [`verify_clean`]: whether the host is fully torn down, and
/// what's left if it isn't.
#[derive(Debug, Clone, Serialize)]
pub struct CleanlinessReport {
    /// `true` iff no managed container runs, no managed volume exists, and
    /// the state directory is empty.
    pub clean: bool,
    /// Human-readable names of whatever was found left over.
    pub leftovers: Vec<String>,
}

/// Checks that no managed container runs, no managed volume exists, and the
/// state directory is empty: the post-purge invariant an operator expects.
/// Every violation found is collected rather than short-circuiting on the
/// first one, so the report is actionable.
pub fn verify_clean(
    specs: &HashMap<String, ServiceSpec>,
    runtime: &Runtime,
) -> Result<CleanlinessReport, AistackError> {
    let mut leftovers = Vec::new();

    for name in FLEET_UPDATE_ORDER {
        let Some(spec) = specs.get(*name) else {
            continue;
        };
        if runtime.is_running(&spec.name)? {
            leftovers.push(format!("container '{}' still running", spec.name));
        }
        for volume in &spec.volumes {
            if runtime.volume_exists(volume)? {
                leftovers.push(format!("volume '{volume}' still exists"));
            }
        }
    }

    let gpu_lock = GpuLockManager::with_lease_timeout(recognised_gpu_holders(), Config::load().gpu_lock.lease_timeout());
    if gpu_lock.is_locked()? {
        leftovers.push("gpu lock still held".to_string());
    }

    let state_dir = runtime::state_dir();
    if let Ok(read_dir) = std::fs::read_dir(&state_dir) {
        for entry in read_dir.flatten() {
            leftovers.push(format!("state directory entry '{}'", entry.file_name().to_string_lossy()));
        }
    }

    Ok(CleanlinessReport {
        clean: leftovers.is_empty(),
        leftovers,
    })
}
