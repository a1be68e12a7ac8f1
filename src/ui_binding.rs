//! Front-end-to-backend UI binding: which inference backend the web
//! front-end currently points at, and at what URL.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{constants::UI_BINDING_FILE_NAME, runtime, state_dir};

/// The inference backend the front-end can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The primary LLM runtime (an Ollama-compatible backend).
    Ollama,
    /// The alternate inference runtime.
    Localai,
}

/// Persisted binding between the front-end and its active backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiBinding {
    /// Backend the front-end is currently configured to talk to.
    pub active_backend: Backend,
    /// URL of that backend, passed to the front-end container as an env var.
    pub url: String,
}

impl Default for UiBinding {
    fn default() -> Self {
        Self {
            active_backend: Backend::Ollama,
            url: "http://127.0.0.1:11434".to_string(),
        }
    }
}

fn binding_path() -> PathBuf {
    runtime::state_dir().join(UI_BINDING_FILE_NAME)
}

/// Loads the current UI binding, defaulting to Ollama at its canonical URL
/// if the file is missing or cannot be parsed.
pub fn load() -> UiBinding {
    match std::fs::read(binding_path()) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => UiBinding::default(),
    }
}

/// Persists `binding` to the state directory.
pub fn save(binding: &UiBinding) -> std::io::Result<()> {
    state_dir::atomic_write_json(&binding_path(), binding, state_dir::OWNER_ONLY_FILE_MODE)
}
