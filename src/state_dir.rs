//! Shared filesystem helpers: directory creation and atomic writes.
//!
//! Every file the core writes goes through [`atomic_write_file`], a
//! write-temp-then-rename sequence rooted in the destination's own
//! directory. Lock files, secret files, and the passphrase file get
//! owner-only mode; directories get owner+group at most.

use std::{
    fs,
    io::{self, Write},
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::Path,
};

/// Default mode for files that must be readable/writable by their owner only.
pub const OWNER_ONLY_FILE_MODE: u32 = 0o600;

/// Default mode for files that may be read by the owning group as well
/// (e.g. the uninstall log).
pub const OWNER_GROUP_READ_FILE_MODE: u32 = 0o640;

/// Default mode for directories: owner+group may read/list/enter.
pub const STATE_DIR_MODE: u32 = 0o750;

/// Creates `path` (and any missing parents) with [`STATE_DIR_MODE`] if it
/// does not already exist. Existing directories are left untouched.
pub fn ensure_state_directory(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(STATE_DIR_MODE))?;
    Ok(())
}

/// Writes `bytes` to `path` atomically: the content lands in `path.tmp`
/// first, is synced, then renamed over `path`. The temp file is removed on
/// any failure so a crash never leaves a stray `.tmp` sibling behind.
pub fn atomic_write_file(path: &Path, bytes: &[u8], mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_state_directory(parent)?;
    }

    let tmp_path = tmp_sibling(path);
    let result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        // Mode is also reapplied explicitly: `create` only applies `mode` when
        // the file doesn't already exist, which a stale `.tmp` could violate.
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode))?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Convenience wrapper for writing a serde-serializable value as indented
/// JSON via [`atomic_write_file`].
pub fn atomic_write_json<T: serde::Serialize>(
    path: &Path,
    value: &T,
    mode: u32,
) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    atomic_write_file(path, &bytes, mode)
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    match path.parent() {
        Some(parent) => parent.join(name),
        None => std::path::PathBuf::from(name),
    }
}
