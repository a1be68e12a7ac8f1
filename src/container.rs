//! Docker/Podman runtime adapter.
//!
//! Shells out to the `docker` or `podman` CLI with blocking
//! `std::process::Command`, matching the teacher's daemon process-management
//! style rather than an async client library: the control plane's
//! concurrency model is single-threaded and synchronous throughout.

use std::{
    process::{Command, Output, Stdio},
    time::Duration,
};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::runtime::{self, RuntimeKind};

/// Errors raised while driving the container runtime CLI.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Neither `docker` nor `podman` could be located on `PATH`.
    #[error("no container runtime found on PATH (tried docker, podman)")]
    NoRuntimeAvailable,

    /// The configured runtime binary could not be executed at all.
    #[error("failed to execute '{binary}': {source}")]
    Spawn {
        /// Binary that failed to spawn.
        binary: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The runtime CLI ran but exited non-zero.
    #[error("'{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        /// Human-readable rendering of the attempted command.
        command: String,
        /// Process exit status, or "signal" if killed.
        status: String,
        /// Captured stderr, tail-trimmed for readability.
        stderr: String,
    },

    /// Output from the runtime CLI could not be decoded as UTF-8.
    #[error("runtime produced non-UTF-8 output: {0}")]
    InvalidOutput(#[from] std::string::FromUtf8Error),
}

/// The binary name for a concrete (resolved) runtime kind.
fn binary_name(kind: RuntimeKind) -> &'static [&'static str] {
    match kind {
        RuntimeKind::Docker => &["docker"],
        RuntimeKind::Podman => &["podman"],
        RuntimeKind::Auto => &["docker", "podman"],
    }
}

fn on_path(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Thin blocking wrapper over the resolved container runtime CLI.
#[derive(Clone)]
pub struct Runtime {
    binary: String,
}

impl Runtime {
    /// Resolves the runtime to use per the configured [`RuntimeKind`],
    /// probing `docker` then `podman` in `Auto` mode.
    pub fn resolve() -> Result<Self, ContainerError> {
        let candidates = binary_name(runtime::runtime_kind());
        for candidate in candidates {
            if on_path(candidate) {
                debug!("resolved container runtime: {candidate}");
                return Ok(Self {
                    binary: candidate.to_string(),
                });
            }
        }
        Err(ContainerError::NoRuntimeAvailable)
    }

    fn run(&self, args: &[&str]) -> Result<Output, ContainerError> {
        trace!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ContainerError::Spawn {
                binary: self.binary.clone(),
                source,
            })
    }

    fn run_checked(&self, args: &[&str]) -> Result<String, ContainerError> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(ContainerError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                status: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), 20),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }

    /// Ensures the shared fleet network exists, creating it if absent.
    pub fn ensure_network(&self, name: &str) -> Result<(), ContainerError> {
        let exists = self
            .run(&["network", "inspect", name])
            .map(|out| out.status.success())
            .unwrap_or(false);
        if exists {
            return Ok(());
        }
        self.run_checked(&["network", "create", name])?;
        Ok(())
    }

    /// Removes the shared fleet network. Missing networks are a no-op.
    pub fn remove_network(&self, name: &str) -> Result<(), ContainerError> {
        let rm = self.run(&["network", "rm", name])?;
        if !rm.status.success() {
            warn!(
                "remove of network '{name}' failed or network absent: {}",
                tail(&String::from_utf8_lossy(&rm.stderr), 5)
            );
        }
        Ok(())
    }

    /// Re-tags `source` (an image ID or reference) as `target`, so
    /// compose-level references that point at `target` pick up `source`
    /// without the caller re-pulling anything.
    pub fn tag_image(&self, source: &str, target: &str) -> Result<(), ContainerError> {
        self.run_checked(&["tag", source, target])?;
        Ok(())
    }

    /// `true` if a named volume currently exists.
    pub fn volume_exists(&self, name: &str) -> Result<bool, ContainerError> {
        Ok(self
            .run(&["volume", "inspect", name])
            .map(|out| out.status.success())
            .unwrap_or(false))
    }

    /// Ensures a named persistent volume exists, creating it if absent.
    pub fn create_volume(&self, name: &str) -> Result<(), ContainerError> {
        if self.volume_exists(name)? {
            return Ok(());
        }
        self.run_checked(&["volume", "create", name])?;
        Ok(())
    }

    /// Removes a named volume. Missing volumes are a no-op; in-use volumes
    /// report a warning rather than failing the caller, matching the
    /// log-and-continue policy `Remove`/`PurgeAll` apply per-volume.
    pub fn remove_volume(&self, name: &str) -> Result<(), ContainerError> {
        let rm = self.run(&["volume", "rm", name])?;
        if !rm.status.success() {
            warn!(
                "remove of volume '{name}' failed or volume absent: {}",
                tail(&String::from_utf8_lossy(&rm.stderr), 5)
            );
        }
        Ok(())
    }

    /// Pulls `image_ref`, returning the resolved image ID.
    pub fn pull(&self, image_ref: &str) -> Result<String, ContainerError> {
        self.run_checked(&["pull", image_ref])?;
        self.image_id(image_ref)
    }

    /// Resolves an image reference to its content ID.
    pub fn image_id(&self, image_ref: &str) -> Result<String, ContainerError> {
        let out = self.run_checked(&["inspect", "--format", "{{.Id}}", image_ref])?;
        Ok(out.trim().to_string())
    }

    /// Runs a detached container named `container_name` from `image_ref`.
    ///
    /// `env` entries are passed as `-e KEY=VALUE`, `ports` as `-p HOST:CONTAINER`.
    pub fn run_detached(
        &self,
        container_name: &str,
        image_ref: &str,
        network: &str,
        env: &[(String, String)],
        ports: &[(u16, u16)],
    ) -> Result<String, ContainerError> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            container_name.into(),
            "--network".into(),
            network.into(),
            "--restart".into(),
            "unless-stopped".into(),
        ];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for (host, container) in ports {
            args.push("-p".into());
            args.push(format!("{host}:{container}"));
        }
        args.push(image_ref.into());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.run_checked(&arg_refs)?;
        Ok(out.trim().to_string())
    }

    /// Stops a running container by name. Logs and does not fail if the
    /// container is already stopped or absent.
    pub fn stop(&self, container_name: &str) -> Result<(), ContainerError> {
        let stop = self.run(&["stop", container_name])?;
        if !stop.status.success() {
            warn!(
                "stop of '{container_name}' failed or container absent: {}",
                tail(&String::from_utf8_lossy(&stop.stderr), 5)
            );
        }
        Ok(())
    }

    /// Force-removes a container by name. Logs and does not fail if the
    /// container is already absent.
    pub fn remove_container(&self, container_name: &str) -> Result<(), ContainerError> {
        let rm = self.run(&["rm", "-f", container_name])?;
        if !rm.status.success() {
            warn!(
                "remove of '{container_name}' failed or container absent: {}",
                tail(&String::from_utf8_lossy(&rm.stderr), 5)
            );
        }
        Ok(())
    }

    /// Stops and removes a container by name. Missing containers are a no-op.
    pub fn stop_and_remove(&self, container_name: &str) -> Result<(), ContainerError> {
        self.stop(container_name)?;
        self.remove_container(container_name)
    }

    /// Returns `true` if a container with the given name is currently running.
    pub fn is_running(&self, container_name: &str) -> Result<bool, ContainerError> {
        let out = self.run_checked(&[
            "inspect",
            "--format",
            "{{.State.Running}}",
            container_name,
        ]);
        match out {
            Ok(value) => Ok(value.trim() == "true"),
            Err(ContainerError::CommandFailed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns the last `tail_lines` lines of container logs.
    pub fn logs(&self, container_name: &str, tail_lines: u32) -> Result<String, ContainerError> {
        self.run_checked(&["logs", "--tail", &tail_lines.to_string(), container_name])
    }

    /// Returns the tail of stderr captured from the container's most recent
    /// run, used to enrich failure diagnostics.
    pub fn stderr_tail(&self, container_name: &str, lines: u32) -> String {
        self.run(&["logs", "--tail", &lines.to_string(), container_name])
            .map(|out| tail(&String::from_utf8_lossy(&out.stderr), lines as usize))
            .unwrap_or_default()
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    if all.len() <= lines {
        all.join("\n")
    } else {
        all[all.len() - lines..].join("\n")
    }
}

/// Minimal sleep helper shared by callers that settle after a container op.
pub fn settle(duration: Duration) {
    std::thread::sleep(duration);
}
