//! Host-side control plane for a small GPU-accelerated inference fleet.

#![warn(unused_crate_dependencies)]
// Test-only dependencies, declared here so `unused_crate_dependencies` doesn't
// flag them for the library target.
#[cfg(test)]
use assert_cmd as _;
// OpenSSL is only needed for static linking on Linux (transitively pulled in
// by reqwest's default TLS backend).
#[cfg(target_os = "linux")]
use openssl_sys as _;
#[cfg(test)]
use predicates as _;
#[cfg(test)]
use tempfile as _;

/// CLI parsing.
pub mod cli;

/// Ambient operator configuration (`config.yaml`, update-mode policy).
pub mod config;

/// Shared constants and timing defaults.
pub mod constants;

/// Runtime-adapter capability: shells out to `docker`/`podman`.
pub mod container;

/// Diagnostic manifest collection and secret redaction.
pub mod diagnostics;

/// Crate-wide error types.
pub mod error;

/// GPU mutex lease manager.
pub mod gpu_lock;

/// Health probing (tri-state HTTP checks).
pub mod health;

/// Structured JSON log contract.
pub mod logging;

/// Fleet manager: service registry, install profiles, fleet-wide update/repair/purge.
pub mod manager;

/// CPU/GPU activity probes consumed by the auto-suspend controller.
pub mod probe;

/// Container-level repair and destructive purge operations.
pub mod repair;

/// Aggregate health reporting.
pub mod report;

/// State and config directory resolution.
pub mod runtime;

/// Encrypted secret store.
pub mod secrets;

/// Per-service lifecycle entity.
pub mod service;

/// Shared filesystem helpers: atomic writes, directory permissions.
pub mod state_dir;

/// Idle-activity auto-suspend controller.
pub mod suspend;

/// Front-end-to-backend UI binding.
pub mod ui_binding;

/// Test helpers shared across unit and integration tests.
#[doc(hidden)]
pub mod test_utils;

/// Update planner: image diffing, health-gated swap, rollback.
pub mod update;

/// Version-lock resolver (pinned vs rolling image policy).
pub mod version_lock;

/// Wake-on-LAN relay.
pub mod wol;
