//! Single-service update planner with automatic rollback.
//!
//! The state machine (`pending` -> `completed`/`rolled_back`/`failed`) is
//! modeled on Fuchsia's system-updater PREPARE/STAGE/REBOOT/FINALIZE
//! sequence, re-expressed synchronously: each step here blocks until it
//! either succeeds or the plan is marked failed/rolled back.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    constants::{ROLLED_BACK_SENTINEL, UPDATE_PLAN_SUFFIX, UPDATE_SETTLE_INTERVAL},
    container::Runtime,
    health::HealthStatus,
    runtime,
    service::{Service, ServiceSpec},
    state_dir, version_lock,
};

/// Errors raised by the update planner.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The runtime adapter failed during pull/swap/rollback.
    #[error(transparent)]
    Container(#[from] crate::container::ContainerError),

    /// The service lifecycle layer failed.
    #[error(transparent)]
    Service(#[from] crate::service::ServiceError),

    /// The new image did not pass health checks, and rollback itself failed.
    ///
    /// This is the only variant that leaves the host in a genuinely broken
    /// state (neither the old nor the new version running); every other
    /// failure path is resolved by [`Update::status`] settling to
    /// `rolled_back` or `failed`.
    #[error("update for '{service}' failed health check and rollback also failed: {rollback_error}")]
    RollbackFailed {
        /// Service whose update could not be rolled back.
        service: String,
        /// The error observed while rolling back.
        rollback_error: String,
    },

    /// The proposed image reference failed the update policy gate.
    #[error("image policy rejected '{image_ref}' for '{service}': {reason}")]
    PolicyRejected {
        /// Service the update targeted.
        service: String,
        /// Rejected image reference.
        image_ref: String,
        /// Human-readable rejection reason.
        reason: String,
    },

    /// No persisted update plan exists for the named service.
    #[error("no update plan on disk for '{0}'")]
    NoPlan(String),

    /// The persisted plan file could not be read or parsed.
    #[error("failed to read update plan for '{service}': {source}")]
    PlanIo {
        /// Service the plan belongs to.
        service: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Writing the persisted plan failed.
    #[error("failed to persist update plan: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome recorded on a completed [`UpdatePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// The plan has been created but the swap has not yet run.
    Pending,
    /// The new image passed health checks and is now live.
    Completed,
    /// The new image failed health checks; the old image was restored.
    RolledBack,
    /// The update could not be completed or rolled back cleanly.
    Failed,
}

/// Record of a single update attempt, persisted for `Rollback`/reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlan {
    /// Name of the service being updated.
    pub service_name: String,
    /// Image ID running before the update began.
    pub old_image_id: String,
    /// Image reference requested for the update.
    pub new_image: String,
    /// Image ID resolved after pulling `new_image`.
    pub new_image_id: String,
    /// Exact reference used for the pull (may differ from `new_image` via
    /// a version-lock rewrite).
    pub pull_reference: String,
    /// UTC timestamp the update began.
    pub started_at: DateTime<Utc>,
    /// UTC timestamp the update reached a terminal status, if any.
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal (or pending) status of the plan.
    pub status: UpdateStatus,
    /// Health status observed immediately after the swap, whichever way it
    /// resolved. One field is enough: a rollback's outcome is always
    /// re-derived from `status`, not from a second "health after rollback"
    /// field.
    pub health_after_swap: Option<HealthStatusRecord>,
}

/// Serializable mirror of [`HealthStatus`], extended with `unchanged` for
/// the no-op case where the pulled image ID matched the running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatusRecord {
    /// Mirrors [`HealthStatus::Green`].
    Green,
    /// Mirrors [`HealthStatus::Yellow`].
    Yellow,
    /// Mirrors [`HealthStatus::Red`].
    Red,
    /// The pulled image resolved to the same ID already running; no swap
    /// occurred and health was never re-probed.
    Unchanged,
}

impl From<HealthStatus> for HealthStatusRecord {
    fn from(value: HealthStatus) -> Self {
        match value {
            HealthStatus::Green => Self::Green,
            HealthStatus::Yellow => Self::Yellow,
            HealthStatus::Red => Self::Red,
        }
    }
}

/// Path the persisted plan for `service` lives at: `<state_dir>/<service>_update_plan.json`.
fn plan_path(service: &str) -> PathBuf {
    runtime::state_dir().join(format!("{service}{UPDATE_PLAN_SUFFIX}"))
}

/// Persists `plan` as the authoritative record of the last update attempt
/// for its service: the sole authority for rollback eligibility and outcome
/// classification.
fn save_plan(plan: &UpdatePlan) -> Result<(), UpdateError> {
    state_dir::atomic_write_json(
        &plan_path(&plan.service_name),
        plan,
        state_dir::OWNER_ONLY_FILE_MODE,
    )?;
    Ok(())
}

/// Loads the last persisted plan for `service`, if any.
fn load_plan(service: &str) -> Result<UpdatePlan, UpdateError> {
    let path = plan_path(service);
    if !path.exists() {
        return Err(UpdateError::NoPlan(service.to_string()));
    }
    let bytes = std::fs::read(&path).map_err(|source| UpdateError::PlanIo {
        service: service.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|err| UpdateError::PlanIo {
        service: service.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
    })
}

/// Rejects image references that are obviously unsafe to deploy: empty, or
/// untagged (no `:tag` and no digest). This enforces the minimum any fleet
/// should require, and is checked up front by [`Updater::update`] before
/// anything is pulled.
pub fn validate_image_reference(service: &str, image_ref: &str) -> Result<(), UpdateError> {
    if image_ref.trim().is_empty() {
        return Err(UpdateError::PolicyRejected {
            service: service.to_string(),
            image_ref: image_ref.to_string(),
            reason: "image reference is empty".to_string(),
        });
    }
    let has_tag_or_digest = image_ref.contains('@') || image_ref.rsplit('/').next().map(|s| s.contains(':')).unwrap_or(false);
    if !has_tag_or_digest {
        return Err(UpdateError::PolicyRejected {
            service: service.to_string(),
            image_ref: image_ref.to_string(),
            reason: "image reference has no tag or digest".to_string(),
        });
    }
    Ok(())
}

/// `EnforceImagePolicy`: run before every service start. Resolves
/// `service`'s reference through the version lock and, when the resolved
/// pull and tag references differ (a digest or tag pin is in effect), pulls
/// the pinned `pull_ref` and retags it locally onto `tag_ref` so the
/// compose-level reference the service actually runs keeps working without
/// the pin leaking into its spec.
pub fn enforce_image_policy(
    runtime: &Runtime,
    service: &str,
    default_image: &str,
) -> Result<(), UpdateError> {
    let resolved = version_lock::resolve(service, default_image).map_err(|err| {
        UpdateError::PolicyRejected {
            service: service.to_string(),
            image_ref: default_image.to_string(),
            reason: err.to_string(),
        }
    })?;
    if resolved.pull_ref != resolved.tag_ref {
        runtime.pull(&resolved.pull_ref)?;
        runtime.tag_image(&resolved.pull_ref, &resolved.tag_ref)?;
        info!(
            "enforced image policy for '{service}': pulled '{}', tagged as '{}'",
            resolved.pull_ref, resolved.tag_ref
        );
    }
    Ok(())
}

/// Drives the update-then-verify-then-rollback protocol for one service.
pub struct Updater<'a> {
    runtime: &'a Runtime,
}

impl<'a> Updater<'a> {
    /// Binds the updater to a resolved container runtime.
    pub fn new(runtime: &'a Runtime) -> Self {
        Self { runtime }
    }

    /// Executes the update protocol. `resolved` is the version-lock
    /// resolution for this service: in rolling mode `pull_ref == tag_ref`
    /// and the swap is a plain pull-then-restart under the same reference;
    /// in pinned mode the pinned digest/tag is pulled and retagged onto the
    /// floating `tag_ref` the service actually runs, so the container's
    /// reference never changes across an update.
    ///
    /// 1. resolve pull/tag references and snapshot the running image ID,
    ///    persisting a `pending` plan before anything else happens,
    /// 2. pull `pull_ref`, retagging onto `tag_ref` if they differ; any
    ///    failure here finalizes the plan `failed` and returns,
    /// 3. if the image ID didn't change, finalize as a no-op,
    /// 4. stop (log-and-continue) and restart the service under `tag_ref`;
    ///    a start failure finalizes the plan `failed` and returns,
    /// 5. settle, then probe health,
    /// 6. on non-green health, roll back to the old image,
    /// 7. persist and return the resulting plan.
    pub fn update(
        &self,
        spec: &ServiceSpec,
        resolved: &version_lock::ResolvedImage,
    ) -> Result<UpdatePlan, UpdateError> {
        validate_image_reference(&spec.name, &resolved.tag_ref)?;

        let started_at = Utc::now();
        let old_image_id = self.runtime.image_id(&resolved.tag_ref).unwrap_or_default();

        let mut plan = UpdatePlan {
            service_name: spec.name.clone(),
            old_image_id: old_image_id.clone(),
            new_image: resolved.tag_ref.clone(),
            new_image_id: String::new(),
            pull_reference: resolved.pull_ref.clone(),
            started_at,
            completed_at: None,
            status: UpdateStatus::Pending,
            health_after_swap: None,
        };
        save_plan(&plan)?;

        macro_rules! fail {
            ($err:expr) => {{
                let err = $err;
                plan.status = UpdateStatus::Failed;
                plan.completed_at = Some(Utc::now());
                let _ = save_plan(&plan);
                return Err(err.into());
            }};
        }

        if let Err(err) = self.runtime.pull(&resolved.pull_ref) {
            fail!(err);
        }
        if resolved.pull_ref != resolved.tag_ref {
            if let Err(err) = self.runtime.tag_image(&resolved.pull_ref, &resolved.tag_ref) {
                fail!(err);
            }
        }
        let new_image_id = match self.runtime.image_id(&resolved.tag_ref) {
            Ok(id) => id,
            Err(err) => fail!(err),
        };
        plan.new_image_id = new_image_id.clone();

        if !old_image_id.is_empty() && new_image_id == old_image_id {
            plan.completed_at = Some(Utc::now());
            plan.status = UpdateStatus::Completed;
            plan.health_after_swap = Some(HealthStatusRecord::Unchanged);
            info!("update of '{}' is a no-op, already at {}", spec.name, old_image_id);
            save_plan(&plan)?;
            return Ok(plan);
        }

        let mut running_spec = spec.clone();
        running_spec.image_ref = resolved.tag_ref.clone();
        let service = Service::new(running_spec.clone(), self.runtime);

        if let Err(err) = service.stop() {
            warn!("update: stop of '{}' failed (continuing): {err}", running_spec.name);
        }
        if let Err(err) = service.start() {
            fail!(err);
        }

        let health_for_record = match service.settle_and_probe_health(UPDATE_SETTLE_INTERVAL) {
            Ok(health) => health,
            Err(err) => fail!(err),
        };
        plan.health_after_swap = Some(health_for_record.into());

        if health_for_record == HealthStatus::Green {
            plan.status = UpdateStatus::Completed;
            plan.completed_at = Some(Utc::now());
            info!("update of '{}' to '{}' completed", spec.name, resolved.tag_ref);
            save_plan(&plan)?;
            return Ok(plan);
        }

        warn!(
            "update of '{}' to '{}' failed health check ({:?}), rolling back",
            spec.name, resolved.tag_ref, health_for_record
        );
        match self.rollback(&running_spec, &resolved.tag_ref, &old_image_id) {
            Ok(()) => {
                plan.status = UpdateStatus::RolledBack;
                plan.completed_at = Some(Utc::now());
                error!("{ROLLED_BACK_SENTINEL}: {}", spec.name);
                save_plan(&plan)?;
                Ok(plan)
            }
            Err(err) => {
                plan.status = UpdateStatus::Failed;
                plan.completed_at = Some(Utc::now());
                let _ = save_plan(&plan);
                Err(UpdateError::RollbackFailed {
                    service: spec.name.clone(),
                    rollback_error: err.to_string(),
                })
            }
        }
    }

    /// Manually re-applies the rollback of the last persisted plan for
    /// `spec.name`, retagging `old_image_id` onto the plan's `new_image`
    /// (its `tag_ref`) and restarting. Used by the standalone `rollback`
    /// CLI verb, as distinct from the automatic rollback triggered inline
    /// by [`update`](Self::update).
    pub fn rollback_last(&self, spec: &ServiceSpec) -> Result<UpdatePlan, UpdateError> {
        let mut plan = load_plan(&spec.name)?;

        let mut running_spec = spec.clone();
        running_spec.image_ref = plan.new_image.clone();

        self.rollback(&running_spec, &plan.new_image, &plan.old_image_id)
            .map_err(|err| UpdateError::RollbackFailed {
                service: spec.name.clone(),
                rollback_error: err.to_string(),
            })?;

        plan.status = UpdateStatus::RolledBack;
        plan.completed_at = Some(Utc::now());
        save_plan(&plan)?;
        Ok(plan)
    }

    /// `Rollback(plan)`: requires a previous image ID to exist, stops the
    /// service (log-and-continue), retags `old_image_id` onto
    /// `tag_ref`, restarts, settles, and re-probes health. Succeeds iff the
    /// restored service comes back green.
    pub fn rollback(
        &self,
        running_spec: &ServiceSpec,
        tag_ref: &str,
        old_image_id: &str,
    ) -> Result<(), UpdateError> {
        if old_image_id.is_empty() {
            return Err(UpdateError::PolicyRejected {
                service: running_spec.name.clone(),
                image_ref: tag_ref.to_string(),
                reason: "nothing to roll back to: no previous image ID on record".to_string(),
            });
        }

        let service = Service::new(running_spec.clone(), self.runtime);
        if let Err(err) = service.stop() {
            warn!("rollback: stop of '{}' failed (continuing): {err}", running_spec.name);
        }

        self.runtime.tag_image(old_image_id, tag_ref)?;
        service.start()?;

        let health = service.settle_and_probe_health(UPDATE_SETTLE_INTERVAL)?;
        if health == HealthStatus::Green {
            Ok(())
        } else {
            Err(UpdateError::RollbackFailed {
                service: running_spec.name.clone(),
                rollback_error: format!("rollback restart did not pass health check ({health:?})"),
            })
        }
    }
}
