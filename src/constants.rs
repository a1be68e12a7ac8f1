//! Constants and default timing values shared across the control plane.
//!
//! Centralizes magic numbers so the individual components (gpu lock, update
//! planner, auto-suspend controller) stay readable.

use std::time::Duration;

// ============================================================================
// File system constants
// ============================================================================

/// Name of the GPU lock file stored in the state directory.
pub const GPU_LOCK_FILE_NAME: &str = "gpu_lock.json";

/// Name of the UI binding file stored in the state directory.
pub const UI_BINDING_FILE_NAME: &str = "ui_binding.json";

/// Name of the auto-suspend state file stored in the state directory.
pub const SUSPEND_STATE_FILE_NAME: &str = "suspend_state.json";

/// Name of the uninstall log artifact written by `PurgeAll`.
pub const UNINSTALL_LOG_FILE_NAME: &str = "uninstall_log.json";

/// Suffix applied to an update plan file: `<service>{SUFFIX}`.
pub const UPDATE_PLAN_SUFFIX: &str = "_update_plan.json";

/// Name of the secret index file stored in the secrets directory.
pub const SECRETS_INDEX_FILE_NAME: &str = "secrets_index.json";

/// Extension appended to an encrypted secret blob: `<name>{EXT}`.
pub const SECRET_FILE_EXT: &str = ".enc";

/// Default operator state directory.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/aistack";

/// Default operator config directory.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/aistack";

/// Default name of the version-lock file inside the config directory.
pub const VERSIONS_LOCK_FILE_NAME: &str = "versions.lock";

/// Default name of the ambient operator config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Config-directory-relative entries preserved by `PurgeAll(remove_configs=false)`.
pub const PURGE_PRESERVED_ENTRIES: &[&str] = &["config.yaml", "wol_config.json"];

// ============================================================================
// GPU lock timing
// ============================================================================

/// Default lease timeout before a GPU lock is considered stale and reclaimable.
pub const DEFAULT_GPU_LEASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// Health probe timing
// ============================================================================

/// Default HTTP timeout for a single health check.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default expected HTTP status code for a healthy response.
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;

/// Delay between retry attempts in [`crate::health::HealthProber::check_with_retries`].
pub const HEALTH_RETRY_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Update planner timing
// ============================================================================

/// Fixed settle interval after a (re)start before probing health.
pub const UPDATE_SETTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Sentinel error text returned when an update was rolled back successfully.
///
/// The fleet manager pattern-matches this exact string to classify the
/// outcome of `UpdateAllServices()`.
pub const ROLLED_BACK_SENTINEL: &str =
    "update failed health check, rolled back to previous version";

// ============================================================================
// Auto-suspend controller timing
// ============================================================================

/// Default idle timeout before a suspend action is invoked.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// CPU utilization threshold (percent) below which the host is considered idle.
pub const IDLE_CPU_THRESHOLD_PERCENT: f64 = 10.0;

/// GPU utilization threshold (percent) below which the host is considered idle.
pub const IDLE_GPU_THRESHOLD_PERCENT: f64 = 5.0;

/// Window over which `/proc/stat` deltas are sampled for CPU utilization.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

// ============================================================================
// Wake-on-LAN relay
// ============================================================================

/// Total byte length of a magic packet (6 sync bytes + 16 MAC repetitions).
pub const MAGIC_PACKET_LEN: usize = 102;

/// Number of times the target MAC address is repeated in a magic packet.
pub const MAGIC_PACKET_MAC_REPEATS: usize = 16;

/// Standard UDP ports a magic packet is sent to.
pub const WOL_PORTS: &[u16] = &[7, 9];

/// Read timeout applied to the relay's HTTP listener per request.
pub const WOL_READ_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Fleet ordering
// ============================================================================

/// Well-known service names, also used as on-disk artifact name stems.
pub mod service_names {
    /// The primary LLM runtime service (e.g. an Ollama-compatible backend).
    pub const LLM_RUNTIME: &str = "llm-runtime";
    /// The web front-end service.
    pub const FRONTEND: &str = "frontend";
    /// The alternate inference runtime service.
    pub const ALT_RUNTIME: &str = "alt-runtime";
}

/// Fixed fleet-update order: compute backends before the UI.
pub const FLEET_UPDATE_ORDER: &[&str] = &[
    service_names::ALT_RUNTIME,
    service_names::LLM_RUNTIME,
    service_names::FRONTEND,
];

/// Name of the shared docker/podman network created for the fleet.
pub const SHARED_NETWORK_NAME: &str = "aistack-net";

/// GPU mutex holder names, distinct from service names. Only the front-end
/// and alternate runtime ever contend for the GPU, never the LLM runtime.
pub mod gpu_lock_holders {
    /// Holder name used by the front-end service.
    pub const OPENWEBUI: &str = "openwebui";
    /// Holder name used by the alternate inference runtime.
    pub const LOCALAI: &str = "localai";
}

/// Every recognised GPU lock holder, passed to [`crate::gpu_lock::GpuLockManager::new`].
pub const GPU_LOCK_HOLDERS: &[&str] = &[gpu_lock_holders::OPENWEBUI, gpu_lock_holders::LOCALAI];

/// Settle interval after a repair restart before re-probing health.
pub const REPAIR_SETTLE_INTERVAL: Duration = Duration::from_secs(5);

/// Install-profile names recognised by `FleetManager::install_profile`.
pub mod install_profiles {
    /// Installs every registered service.
    pub const STANDARD_GPU: &str = "standard-gpu";
    /// Installs only the LLM runtime.
    pub const MINIMAL: &str = "minimal";
}
