//! Fleet-wide registry and orchestration across the well-known services.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::{
    config::Config,
    constants::{gpu_lock_holders, service_names, FLEET_UPDATE_ORDER, GPU_LOCK_HOLDERS},
    container::Runtime,
    gpu_lock::GpuLockManager,
    service::{Hook, Service, ServiceSpec, ServiceState},
    ui_binding,
    update::{enforce_image_policy, HealthStatusRecord, UpdatePlan, Updater},
    version_lock,
};

fn recognised_gpu_holders() -> Vec<String> {
    GPU_LOCK_HOLDERS.iter().map(|s| s.to_string()).collect()
}

/// The GPU lock holder name a service acquires as, if any. Only the
/// front-end and alternate runtime ever contend for the GPU.
fn gpu_holder_for(service_name: &str) -> Option<&'static str> {
    match service_name {
        service_names::FRONTEND => Some(gpu_lock_holders::OPENWEBUI),
        service_names::ALT_RUNTIME => Some(gpu_lock_holders::LOCALAI),
        _ => None,
    }
}

/// Builds the pre-start/post-stop hooks for a service: the image policy is
/// enforced before every start, and the GPU-contending services acquire the
/// lock before starting and release it after stopping. The LLM runtime
/// never touches the GPU lock.
pub(crate) fn hooks_for(runtime: &Runtime, service_name: &str, image_ref: &str) -> (Option<Hook>, Option<Hook>) {
    let name_for_policy = service_name.to_string();
    let image_ref = image_ref.to_string();
    let runtime_for_policy = runtime.clone();
    let policy_hook: Hook = Box::new(move || {
        enforce_image_policy(&runtime_for_policy, &name_for_policy, &image_ref).map_err(|err| err.to_string())
    });

    let Some(holder) = gpu_holder_for(service_name) else {
        return (Some(policy_hook), None);
    };

    let lease_timeout = Config::load().gpu_lock.lease_timeout();
    let holder = holder.to_string();
    let holder_for_pre = holder.clone();
    let lease_timeout_for_pre = lease_timeout;
    let pre_start: Hook = Box::new(move || {
        policy_hook()?;
        let lock = GpuLockManager::with_lease_timeout(recognised_gpu_holders(), lease_timeout_for_pre);
        lock.acquire(&holder_for_pre).map_err(|err| err.to_string())
    });

    let post_stop: Hook = Box::new(move || {
        let lock = GpuLockManager::with_lease_timeout(recognised_gpu_holders(), lease_timeout);
        lock.release(&holder).map_err(|err| err.to_string())
    });

    (Some(pre_start), Some(post_stop))
}

/// Derives the frontend's backend-URL env var fresh from the persisted UI
/// binding at materialization time, leaving every other service's spec
/// untouched.
pub(crate) fn materialize_spec(spec: &ServiceSpec) -> ServiceSpec {
    if spec.name != service_names::FRONTEND {
        return spec.clone();
    }
    let binding = ui_binding::load();
    let mut materialized = spec.clone();
    materialized.env.retain(|(key, _)| key != "BACKEND_URL");
    materialized.env.push(("BACKEND_URL".to_string(), binding.url));
    materialized
}

/// Aggregate status for one service, used by `StatusAll`/reporting.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Observed lifecycle state. `Degraded` when the status query itself
    /// failed: a per-service failure is reported, not fatal.
    pub state: ServiceState,
    /// Raw tri-state health backing `state`, or `Red` when the query
    /// itself failed rather than observing an unhealthy service.
    pub health: crate::health::HealthStatus,
    /// Detail of the status-query failure, if any.
    pub error: Option<String>,
}

/// Outcome of one service's update within `UpdateAllServices`.
#[derive(Debug)]
pub enum FleetUpdateOutcome {
    /// The update completed and the new version is live.
    Completed(UpdatePlan),
    /// The pulled image was already running; no restart or health probe
    /// occurred.
    Unchanged(UpdatePlan),
    /// The update failed health checks and was rolled back successfully.
    ///
    /// Classified by pattern-matching [`crate::constants::ROLLED_BACK_SENTINEL`]
    /// against the plan's status.
    RolledBack(UpdatePlan),
    /// The update, or its rollback, failed outright.
    Failed {
        /// Name of the service whose update failed.
        service: String,
        /// Human-readable failure detail.
        detail: String,
    },
}

/// Owns the registry of well-known services and drives fleet-wide operations.
pub struct FleetManager<'a> {
    runtime: &'a Runtime,
    specs: HashMap<String, ServiceSpec>,
}

impl<'a> FleetManager<'a> {
    /// Builds a manager over the given set of service specs (one entry per
    /// well-known service name).
    pub fn new(runtime: &'a Runtime, specs: HashMap<String, ServiceSpec>) -> Self {
        Self { runtime, specs }
    }

    fn spec(&self, service_name: &str) -> Option<&ServiceSpec> {
        self.specs.get(service_name)
    }

    /// Returns the registered spec for `service_name`, if any.
    pub fn spec_for(&self, service_name: &str) -> Option<&ServiceSpec> {
        self.spec(service_name)
    }

    /// Installs the named profile: `standard-gpu` installs every registered
    /// service, `minimal` installs only the LLM runtime. Any other name is
    /// a precondition error. Hooks (image policy, GPU lock
    /// acquire, UI-binding derivation) are wired exactly as they are for
    /// [`start_service`](Self::start_service), since `Install` ends in a
    /// `Start`.
    pub fn install_profile(&self, profile: &str) -> Result<(), crate::error::AistackError> {
        let members: &[&str] = match profile {
            crate::constants::install_profiles::STANDARD_GPU => FLEET_UPDATE_ORDER,
            crate::constants::install_profiles::MINIMAL => {
                &[crate::constants::service_names::LLM_RUNTIME]
            }
            other => {
                return Err(crate::error::AistackError::Precondition(format!(
                    "unknown install profile '{other}'"
                )));
            }
        };
        for name in FLEET_UPDATE_ORDER {
            if !members.contains(name) {
                continue;
            }
            let Some(spec) = self.spec(name) else {
                continue;
            };
            let materialized = materialize_spec(spec);
            let (pre_start, post_stop) = hooks_for(self.runtime, &materialized.name, &materialized.image_ref);
            Service::with_hooks(materialized, self.runtime, pre_start, post_stop).install()?;
        }
        Ok(())
    }

    /// Returns the current status of every registered service, best-effort:
    /// a service whose status query fails is reported as `Degraded` with
    /// the failure detail attached, rather than aborting the rest of the
    /// fleet's report.
    pub fn status_all(&self) -> Result<Vec<ServiceStatus>, crate::error::AistackError> {
        let mut results = Vec::new();
        for name in FLEET_UPDATE_ORDER {
            let Some(spec) = self.spec(name) else {
                continue;
            };
            let service = Service::new(spec.clone(), self.runtime);
            match service.status_with_health() {
                Ok((state, health)) => results.push(ServiceStatus {
                    name: spec.name.clone(),
                    state,
                    health,
                    error: None,
                }),
                Err(err) => {
                    warn!("status query failed for '{name}': {err}");
                    results.push(ServiceStatus {
                        name: spec.name.clone(),
                        state: ServiceState::Degraded,
                        health: crate::health::HealthStatus::Red,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        Ok(results)
    }

    /// Starts a single registered service with its hooks wired (image
    /// policy, GPU lock acquire, UI-binding materialization).
    pub fn start_service(&self, name: &str) -> Result<(), crate::error::AistackError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| crate::error::AistackError::Precondition(format!("unknown service '{name}'")))?;
        let materialized = materialize_spec(spec);
        let (pre_start, post_stop) = hooks_for(self.runtime, &materialized.name, &materialized.image_ref);
        Service::with_hooks(materialized, self.runtime, pre_start, post_stop).start()?;
        Ok(())
    }

    /// Stops a single registered service with its hooks wired (GPU lock release).
    pub fn stop_service(&self, name: &str) -> Result<(), crate::error::AistackError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| crate::error::AistackError::Precondition(format!("unknown service '{name}'")))?;
        let materialized = materialize_spec(spec);
        let (pre_start, post_stop) = hooks_for(self.runtime, &materialized.name, &materialized.image_ref);
        Service::with_hooks(materialized, self.runtime, pre_start, post_stop).stop()?;
        Ok(())
    }

    /// Starts every registered service in [`FLEET_UPDATE_ORDER`] with hooks wired.
    pub fn start_all(&self) -> Result<(), crate::error::AistackError> {
        for name in FLEET_UPDATE_ORDER {
            if self.spec(name).is_some() {
                self.start_service(name)?;
            }
        }
        Ok(())
    }

    /// Stops every registered service in [`FLEET_UPDATE_ORDER`] with hooks wired.
    pub fn stop_all(&self) -> Result<(), crate::error::AistackError> {
        for name in FLEET_UPDATE_ORDER {
            if self.spec(name).is_some() {
                self.stop_service(name)?;
            }
        }
        Ok(())
    }

    /// Updates every registered service in [`FLEET_UPDATE_ORDER`], honoring
    /// the configured update policy: `pinned` mode refuses the whole
    /// operation outright with a clear message; `rolling` re-resolves every
    /// service's reference through the version lock at update time.
    /// A missing/invalid config fails open to `rolling`.
    pub fn update_all_services(
        &self,
        config: &Config,
    ) -> Result<Vec<FleetUpdateOutcome>, crate::error::AistackError> {
        let mode = config.updates.mode;
        if mode == crate::config::UpdateMode::Pinned {
            return Err(crate::error::AistackError::Precondition(
                "fleet-wide update refused: update policy is 'pinned'".to_string(),
            ));
        }
        info!("updating fleet in mode {mode:?}, order: {FLEET_UPDATE_ORDER:?}");

        let mut outcomes = Vec::new();
        for name in FLEET_UPDATE_ORDER {
            let Some(spec) = self.spec(*name) else {
                continue;
            };

            let resolved = match version_lock::resolve(name, &spec.image_ref) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!("version-lock resolution failed for '{name}': {err}");
                    outcomes.push(FleetUpdateOutcome::Failed {
                        service: name.to_string(),
                        detail: err.to_string(),
                    });
                    continue;
                }
            };

            let updater = Updater::new(self.runtime);
            match updater.update(spec, &resolved) {
                Ok(plan) if plan.health_after_swap == Some(HealthStatusRecord::Unchanged) => {
                    outcomes.push(FleetUpdateOutcome::Unchanged(plan));
                }
                Ok(plan) if plan.status == crate::update::UpdateStatus::Completed => {
                    outcomes.push(FleetUpdateOutcome::Completed(plan));
                }
                Ok(plan) => {
                    outcomes.push(FleetUpdateOutcome::RolledBack(plan));
                }
                Err(err) => {
                    outcomes.push(FleetUpdateOutcome::Failed {
                        service: name.to_string(),
                        detail: err.to_string(),
                    });
                }
            }
        }
        Ok(outcomes)
    }
}
