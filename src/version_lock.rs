//! Version-lock file resolver.
//!
//! Grammar: one `<service>:<image-ref>` pair per line, blank lines and
//! `#`-prefixed comments ignored. No crate pulls its weight for a grammar
//! this small; hand-parsed like the teacher's own small-format files.

use std::{
    env,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::{constants::VERSIONS_LOCK_FILE_NAME, runtime};

/// Errors raised while resolving a service's pinned image reference.
#[derive(Debug, Error)]
pub enum VersionLockError {
    /// A line in the lock file was not `<service>:<image-ref>`.
    #[error("malformed version-lock line {line_no} in {path}: '{line}'")]
    MalformedLine {
        /// File the line came from.
        path: PathBuf,
        /// 1-based line number.
        line_no: usize,
        /// The offending line, verbatim.
        line: String,
    },

    /// Underlying I/O failure reading a lock file.
    #[error("failed to read version-lock file {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// The resolved pull/tag pair for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// Reference used to `pull`/`run` the image.
    pub pull_ref: String,
    /// Reference recorded for display/reporting purposes (usually equal to
    /// `pull_ref`, but kept distinct in case a registry mirror rewrites it).
    pub tag_ref: String,
}

fn parse(path: &Path, contents: &str) -> Result<Vec<(String, String)>, VersionLockError> {
    let mut pins = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((service, image_ref)) = line.split_once(':') else {
            return Err(VersionLockError::MalformedLine {
                path: path.to_path_buf(),
                line_no: idx + 1,
                line: raw_line.to_string(),
            });
        };
        let service = service.trim();
        let image_ref = image_ref.trim();
        if service.is_empty() || image_ref.is_empty() {
            return Err(VersionLockError::MalformedLine {
                path: path.to_path_buf(),
                line_no: idx + 1,
                line: raw_line.to_string(),
            });
        }
        pins.push((service.to_string(), image_ref.to_string()));
    }
    Ok(pins)
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(overridden) = runtime::versions_lock_override() {
        candidates.push(overridden);
    }
    candidates.push(runtime::config_dir().join(VERSIONS_LOCK_FILE_NAME));
    if let Ok(exe) = env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            candidates.push(exe_dir.join(VERSIONS_LOCK_FILE_NAME));
        }
    }
    if let Ok(cwd) = env::current_dir() {
        candidates.push(cwd.join(VERSIONS_LOCK_FILE_NAME));
    }
    candidates
}

/// Resolves `service`'s pinned image, falling back to `default_image` when
/// no lock file is found or the service has no entry in it.
///
/// Lookup order: `AISTACK_VERSIONS_LOCK` override, then the
/// config directory, then beside the running executable, then the current
/// working directory. The first *existing* file wins; a missing file at a
/// higher-priority location falls through rather than erroring.
pub fn resolve(service: &str, default_image: &str) -> Result<ResolvedImage, VersionLockError> {
    for path in candidate_paths() {
        if !path.is_file() {
            continue;
        }
        let contents = fs::read_to_string(&path).map_err(|source| VersionLockError::Io {
            path: path.clone(),
            source,
        })?;
        let pins = parse(&path, &contents)?;
        if let Some((_, image_ref)) = pins.iter().find(|(name, _)| name == service) {
            debug!("resolved '{service}' to '{image_ref}' via {}", path.display());
            // Whether the pin carries a digest or a floating tag, the
            // compose-level reference stays the default/floating one:
            // we pull the pinned ref and retag it locally as `tag_ref`
            // so every other reference to the image keeps working.
            return Ok(ResolvedImage {
                pull_ref: image_ref.clone(),
                tag_ref: default_image.to_string(),
            });
        }
        // Lock file exists but doesn't pin this service: stop searching
        // further locations, the found file is authoritative.
        break;
    }

    Ok(ResolvedImage {
        pull_ref: default_image.to_string(),
        tag_ref: default_image.to_string(),
    })
}
