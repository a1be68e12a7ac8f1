//! File-backed GPU mutex with stale-lock reclamation.

use std::{
    fs::{self, File},
    io,
    path::PathBuf,
    time::Duration,
};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{constants::GPU_LOCK_FILE_NAME, runtime, state_dir};

/// Errors raised by the GPU lock manager.
#[derive(Debug, Error)]
pub enum GpuLockError {
    /// `Acquire` was called with a holder name outside the recognised set.
    #[error("unknown GPU lock holder '{0}'")]
    UnknownHolder(String),

    /// The lock is currently held by a different, non-stale holder.
    #[error("GPU lock held by '{holder}' for {elapsed_secs}s")]
    HeldByOther {
        /// The current holder.
        holder: String,
        /// Elapsed seconds since the holder acquired the lock.
        elapsed_secs: u64,
    },

    /// `Release` was called by a holder that does not own the lock.
    #[error("GPU lock is held by '{actual}', not '{requested}'")]
    WrongHolder {
        /// The holder making the release request.
        requested: String,
        /// The holder actually recorded in the lock file.
        actual: String,
    },

    /// Underlying I/O failure.
    #[error("GPU lock I/O error: {0}")]
    Io(#[from] io::Error),

    /// The lock file contained invalid JSON.
    #[error("GPU lock file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// On-disk representation of the GPU lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuLockState {
    /// Current holder, or `"none"` when unlocked.
    pub holder: String,
    /// UTC timestamp the lock was acquired, zero when unlocked.
    pub since_ts: DateTime<Utc>,
}

impl GpuLockState {
    fn unlocked() -> Self {
        Self {
            holder: "none".to_string(),
            since_ts: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn is_unlocked(&self) -> bool {
        self.holder == "none"
    }
}

/// Manages the singleton GPU lock file for the host.
pub struct GpuLockManager {
    path: PathBuf,
    recognised_holders: Vec<String>,
    lease_timeout: Duration,
}

impl GpuLockManager {
    /// Creates a manager bound to the default state directory, recognising
    /// the given set of holder names.
    pub fn new(recognised_holders: Vec<String>) -> Self {
        Self::with_lease_timeout(
            recognised_holders,
            crate::constants::DEFAULT_GPU_LEASE_TIMEOUT,
        )
    }

    /// Creates a manager with an explicit lease timeout (used by tests and
    /// by operators overriding the default via ambient config).
    pub fn with_lease_timeout(recognised_holders: Vec<String>, lease_timeout: Duration) -> Self {
        Self {
            path: runtime::state_dir().join(GPU_LOCK_FILE_NAME),
            recognised_holders,
            lease_timeout,
        }
    }

    /// Returns the path used for tests/inspection.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read(&self) -> Result<GpuLockState, GpuLockError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(GpuLockState::unlocked()),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, state: &GpuLockState) -> Result<(), GpuLockError> {
        state_dir::atomic_write_json(&self.path, state, state_dir::OWNER_ONLY_FILE_MODE)?;
        Ok(())
    }

    /// Acquires an advisory file lock around the read-modify-write cycle.
    ///
    /// This closes the two-writers-both-succeed race that would otherwise be
    /// tolerated at the atomic-rename layer; two processes racing `Acquire`
    /// now serialize through the kernel's `flock` instead of both observing
    /// "no lock" and both renaming a winner.
    fn with_guard<T>(&self, f: impl FnOnce(&Self) -> Result<T, GpuLockError>) -> Result<T, GpuLockError> {
        if let Some(parent) = self.path.parent() {
            state_dir::ensure_state_directory(parent)?;
        }
        let guard_path = self.path.with_extension("json.guard");
        let guard_file = File::create(&guard_path)?;
        guard_file.lock_exclusive()?;
        let result = f(self);
        let _ = fs2::FileExt::unlock(&guard_file);
        result
    }

    fn elapsed_secs(since: DateTime<Utc>) -> u64 {
        (Utc::now() - since).num_seconds().max(0) as u64
    }

    fn is_stale(&self, state: &GpuLockState) -> bool {
        !state.is_unlocked() && Self::elapsed_secs(state.since_ts) >= self.lease_timeout.as_secs()
    }

    /// Attempts to acquire the lock for `holder`.
    ///
    /// Idempotent: re-acquiring while already the holder succeeds silently.
    /// A lock held by someone else fails unless it is stale, in which case
    /// it is forcibly reclaimed with a warn-level log.
    pub fn acquire(&self, holder: &str) -> Result<(), GpuLockError> {
        if !self.recognised_holders.iter().any(|h| h == holder) {
            return Err(GpuLockError::UnknownHolder(holder.to_string()));
        }

        self.with_guard(|me| {
            let current = me.read()?;

            if current.is_unlocked() {
                return me.write(&GpuLockState {
                    holder: holder.to_string(),
                    since_ts: Utc::now(),
                });
            }

            if current.holder == holder {
                return Ok(());
            }

            if me.is_stale(&current) {
                warn!(
                    "reclaiming stale GPU lock held by '{}' since {}",
                    current.holder, current.since_ts
                );
                return me.write(&GpuLockState {
                    holder: holder.to_string(),
                    since_ts: Utc::now(),
                });
            }

            Err(GpuLockError::HeldByOther {
                holder: current.holder.clone(),
                elapsed_secs: Self::elapsed_secs(current.since_ts),
            })
        })
    }

    /// Releases the lock on behalf of `holder`.
    ///
    /// Succeeds silently if no lock exists; fails if held by a different
    /// holder.
    pub fn release(&self, holder: &str) -> Result<(), GpuLockError> {
        self.with_guard(|me| {
            let current = me.read()?;
            if current.is_unlocked() {
                return Ok(());
            }
            if current.holder != holder {
                return Err(GpuLockError::WrongHolder {
                    requested: holder.to_string(),
                    actual: current.holder,
                });
            }
            fs::remove_file(&me.path).or_else(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(err)
                }
            })?;
            Ok(())
        })
    }

    /// Unconditionally removes the lock, regardless of holder.
    pub fn force_unlock(&self) -> Result<(), GpuLockError> {
        self.with_guard(|me| {
            let current = me.read()?;
            if current.is_unlocked() {
                return Ok(());
            }
            warn!("force-unlocking GPU lock held by '{}'", current.holder);
            fs::remove_file(&me.path).or_else(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(err)
                }
            })
        })
    }

    /// Returns the current lock state, or `{holder: "none"}` when unlocked.
    pub fn get_status(&self) -> Result<GpuLockState, GpuLockError> {
        self.read()
    }

    /// Returns `true` iff a lock exists and is not stale.
    pub fn is_locked(&self) -> Result<bool, GpuLockError> {
        let current = self.read()?;
        Ok(!current.is_unlocked() && !self.is_stale(&current))
    }
}
