//! Crate-wide error types.
use thiserror::Error;

/// Aggregate error type returned by the fleet manager and CLI layer.
#[derive(Debug, Error)]
pub enum AistackError {
    /// Error from the runtime adapter (docker/podman shell-out).
    #[error(transparent)]
    Container(#[from] crate::container::ContainerError),

    /// Error from the GPU lock manager.
    #[error(transparent)]
    GpuLock(#[from] crate::gpu_lock::GpuLockError),

    /// Error from the version-lock resolver.
    #[error(transparent)]
    VersionLock(#[from] crate::version_lock::VersionLockError),

    /// Error from the update planner.
    #[error(transparent)]
    Update(#[from] crate::update::UpdateError),

    /// Error from a service entity lifecycle operation.
    #[error(transparent)]
    Service(#[from] crate::service::ServiceError),

    /// Error from the secret store.
    #[error(transparent)]
    Secrets(#[from] crate::secrets::SecretError),

    /// Error from diagnostic manifest collection.
    #[error(transparent)]
    Diagnostics(#[from] crate::diagnostics::DiagnosticsError),

    /// Error from the Wake-on-LAN relay.
    #[error(transparent)]
    Wol(#[from] crate::wol::WolError),

    /// Error from the auto-suspend controller.
    #[error(transparent)]
    Suspend(#[from] crate::suspend::SuspendError),

    /// Generic I/O failure not otherwise categorized.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Precondition violated by operator input (bad profile, unknown service, ...).
    #[error("{0}")]
    Precondition(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AistackError>;
