//! Resolution of state/config directories from the process environment.
//!
//! Mirrors the teacher's `OnceLock<RwLock<RuntimeContext>>` singleton shape,
//! generalized from systemg's user/system split to this crate's
//! `AISTACK_STATE_DIR`/`AISTACK_CONFIG_DIR`/`AISTACK_RUNTIME` overrides.

use std::{
    env,
    path::PathBuf,
    sync::{OnceLock, RwLock},
};

use crate::constants::{DEFAULT_CONFIG_DIR, DEFAULT_STATE_DIR};

/// Which container CLI to shell out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Force `docker`.
    Docker,
    /// Force `podman`.
    Podman,
    /// Probe `docker` first, then `podman`.
    Auto,
}

impl std::str::FromStr for RuntimeKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            "auto" | "" => Ok(Self::Auto),
            other => Err(format!("unknown AISTACK_RUNTIME value '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    state_dir: PathBuf,
    config_dir: PathBuf,
    runtime_kind: RuntimeKind,
    versions_lock_override: Option<PathBuf>,
}

static CONTEXT: OnceLock<RwLock<RuntimeContext>> = OnceLock::new();

fn context_lock() -> &'static RwLock<RuntimeContext> {
    CONTEXT.get_or_init(|| RwLock::new(RuntimeContext::from_env()))
}

impl RuntimeContext {
    fn from_env() -> Self {
        let state_dir = env::var_os("AISTACK_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        let config_dir = env::var_os("AISTACK_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR));
        let runtime_kind = env::var("AISTACK_RUNTIME")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(RuntimeKind::Auto);
        let versions_lock_override = env::var_os("AISTACK_VERSIONS_LOCK").map(PathBuf::from);

        Self {
            state_dir,
            config_dir,
            runtime_kind,
            versions_lock_override,
        }
    }
}

/// Re-reads the environment and replaces the global runtime context.
///
/// Intended for tests that set `AISTACK_STATE_DIR`/`AISTACK_CONFIG_DIR` and
/// need the singleton to pick up the change; production code resolves the
/// context once lazily on first access.
pub fn refresh_from_env() {
    let mut guard = context_lock().write().expect("runtime context poisoned");
    *guard = RuntimeContext::from_env();
}

/// Returns the root directory for on-disk state (locks, plans, bindings, ...).
pub fn state_dir() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .state_dir
        .clone()
}

/// Returns the directory searched for operator configuration files.
pub fn config_dir() -> PathBuf {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .config_dir
        .clone()
}

/// Returns the configured container-runtime selection policy.
pub fn runtime_kind() -> RuntimeKind {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .runtime_kind
}

/// Returns the `AISTACK_VERSIONS_LOCK` override path, if set.
pub fn versions_lock_override() -> Option<PathBuf> {
    context_lock()
        .read()
        .expect("runtime context poisoned")
        .versions_lock_override
        .clone()
}
