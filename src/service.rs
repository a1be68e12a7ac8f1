//! A single managed service entity and its lifecycle hooks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{config::Config, container::Runtime, constants::SHARED_NETWORK_NAME, health::HealthProber};

/// A pre-start or post-stop lifecycle hook: an effectful, argument-less
/// action that succeeds or reports a human-readable failure. Hooks are
/// effectful callables, not shell commands, so they can acquire the GPU
/// lock, enforce the image policy, or touch on-disk state directly.
pub type Hook = Box<dyn Fn() -> Result<(), String>>;

/// Errors raised during a service lifecycle operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The runtime adapter failed.
    #[error(transparent)]
    Container(#[from] crate::container::ContainerError),

    /// The health prober could not be constructed (e.g. bad health URL).
    #[error(transparent)]
    Health(#[from] crate::health::HealthError),

    /// A required pre-start hook exited non-zero, aborting the start.
    #[error("pre-start hook for '{service}' failed: {detail}")]
    PreStartHookFailed {
        /// Service the hook belongs to.
        service: String,
        /// Captured failure detail.
        detail: String,
    },
}

/// Static definition of a managed service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Stable service name, also used as the container name.
    pub name: String,
    /// Image reference to run (already resolved through the version lock).
    pub image_ref: String,
    /// URL polled by the health prober.
    pub health_url: String,
    /// Environment variables passed to the container.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Host:container port mappings.
    #[serde(default)]
    pub ports: Vec<(u16, u16)>,
    /// Persistent-data volume names owned by this service. Kept across
    /// updates and repairs; only dropped by `Remove(keep_data=false)`.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// Lifecycle state of a managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceState {
    /// Never installed, or fully removed.
    NotInstalled,
    /// Installed but not running.
    Stopped,
    /// Running and not yet health-checked.
    Starting,
    /// Running and passing health checks.
    Running,
    /// Running but failing health checks.
    Degraded,
}

/// A running or installed service, bound to a resolved [`ServiceSpec`] and
/// its (optional) lifecycle hooks.
pub struct Service<'a> {
    spec: ServiceSpec,
    runtime: &'a Runtime,
    pre_start_hook: Option<Hook>,
    post_stop_hook: Option<Hook>,
}

impl<'a> Service<'a> {
    /// Binds a service entity to its static spec and the resolved container
    /// runtime, with no lifecycle hooks.
    pub fn new(spec: ServiceSpec, runtime: &'a Runtime) -> Self {
        Self {
            spec,
            runtime,
            pre_start_hook: None,
            post_stop_hook: None,
        }
    }

    /// Binds a service entity together with its pre-start/post-stop hooks:
    /// GPU lock acquire/release, image-policy enforcement, registry-stub
    /// creation are all composed this way per service.
    pub fn with_hooks(
        spec: ServiceSpec,
        runtime: &'a Runtime,
        pre_start_hook: Option<Hook>,
        post_stop_hook: Option<Hook>,
    ) -> Self {
        Self {
            spec,
            runtime,
            pre_start_hook,
            post_stop_hook,
        }
    }

    /// Service name, used as the on-disk and container identity.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Installs the service: ensures the shared network and every declared
    /// volume exist, then starts it. Idempotent.
    pub fn install(&self) -> Result<(), ServiceError> {
        self.runtime.ensure_network(SHARED_NETWORK_NAME)?;
        for volume in &self.spec.volumes {
            self.runtime.create_volume(volume)?;
        }
        self.start()?;
        info!("installed service '{}'", self.spec.name);
        Ok(())
    }

    /// Starts the service, running the pre-start hook first if one is bound.
    ///
    /// The pre-start hook failing is fatal: it aborts before the container
    /// is run, since a precondition the operator asked to gate on did not
    /// hold.
    pub fn start(&self) -> Result<(), ServiceError> {
        if let Some(hook) = &self.pre_start_hook {
            hook().map_err(|detail| ServiceError::PreStartHookFailed {
                service: self.spec.name.clone(),
                detail,
            })?;
        }
        self.runtime.run_detached(
            &self.spec.name,
            &self.spec.image_ref,
            SHARED_NETWORK_NAME,
            &self.spec.env,
            &self.spec.ports,
        )?;
        info!("started service '{}'", self.spec.name);
        Ok(())
    }

    /// Stops the service, running the post-stop hook afterward if one is bound.
    ///
    /// Unlike the pre-start hook, a failing post-stop hook is advisory only:
    /// the container has already been torn down and there is nothing left
    /// to roll back, so the failure is logged and swallowed rather than
    /// propagated. A stopped container matters more than a released GPU
    /// lock.
    pub fn stop(&self) -> Result<(), ServiceError> {
        self.runtime.stop_and_remove(&self.spec.name)?;
        if let Some(hook) = &self.post_stop_hook {
            if let Err(detail) = hook() {
                warn!("post-stop hook for '{}' failed (ignored): {detail}", self.spec.name);
            }
        }
        info!("stopped service '{}'", self.spec.name);
        Ok(())
    }

    /// Returns the current lifecycle state by combining container and
    /// health-check observation.
    pub fn status(&self) -> Result<ServiceState, ServiceError> {
        Ok(self.status_with_health()?.0)
    }

    /// Returns `{state, health}`: the lifecycle state collapsed from
    /// container + health observation, alongside the raw tri-state health
    /// that produced it. A stopped container is reported `red` without
    /// touching the network.
    pub fn status_with_health(&self) -> Result<(ServiceState, crate::health::HealthStatus), ServiceError> {
        if !self.runtime.is_running(&self.spec.name)? {
            return Ok((ServiceState::Stopped, crate::health::HealthStatus::Red));
        }
        let prober = self.health_prober()?;
        let health = prober.check();
        let state = match health {
            crate::health::HealthStatus::Green => ServiceState::Running,
            _ => ServiceState::Degraded,
        };
        Ok((state, health))
    }

    /// Removes the service: stops the container (errors logged, not fatal),
    /// then, unless `keep_data` is set, removes every declared volume,
    /// collecting a warning per volume that fails rather than aborting the
    /// rest.
    pub fn remove(&self, keep_data: bool) -> Result<(), ServiceError> {
        if let Err(err) = self.stop() {
            warn!("remove: stop of '{}' failed (continuing): {err}", self.spec.name);
        }
        if !keep_data {
            for volume in &self.spec.volumes {
                if let Err(err) = self.runtime.remove_volume(volume) {
                    warn!("remove: volume '{volume}' for '{}' failed: {err}", self.spec.name);
                }
            }
        }
        info!("removed service '{}' (keep_data={keep_data})", self.spec.name);
        Ok(())
    }

    /// Returns the last `tail_lines` of the service's container logs.
    pub fn logs(&self, tail_lines: u32) -> Result<String, ServiceError> {
        Ok(self.runtime.logs(&self.spec.name, tail_lines)?)
    }

    /// Blocks for `settle` then re-checks health, used by the update
    /// planner immediately after swapping a container.
    pub fn settle_and_check(&self, settle: Duration) -> Result<ServiceState, ServiceError> {
        std::thread::sleep(settle);
        self.status()
    }

    /// Probes the tri-state health result directly, without collapsing
    /// `Yellow`/`Red` into a single `Degraded` [`ServiceState`] the way
    /// [`status`](Self::status) does. The update planner needs the real
    /// tri-state to record an accurate `health_after_swap`.
    pub fn probe_health(&self) -> Result<crate::health::HealthStatus, ServiceError> {
        let prober = self.health_prober()?;
        Ok(prober.check())
    }

    /// Blocks for `settle`, then returns the tri-state health result,
    /// retrying against the configured health policy: `Red` if the
    /// container isn't running at all, otherwise whatever the prober
    /// observes after its retry budget is spent.
    pub fn settle_and_probe_health(
        &self,
        settle: Duration,
    ) -> Result<crate::health::HealthStatus, ServiceError> {
        std::thread::sleep(settle);
        if !self.runtime.is_running(&self.spec.name)? {
            return Ok(crate::health::HealthStatus::Red);
        }
        let config = Config::load();
        let prober = self.health_prober()?;
        Ok(prober.check_with_retries(
            config.health.max_retries.max(1),
            crate::constants::HEALTH_RETRY_DELAY,
        ))
    }

    fn health_prober(&self) -> Result<HealthProber, ServiceError> {
        let timeout = Config::load().health.timeout();
        Ok(HealthProber::with_timeout(
            &self.spec.health_url,
            timeout,
            crate::constants::DEFAULT_EXPECTED_STATUS,
        )?)
    }
}
