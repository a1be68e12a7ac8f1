//! Coverage of the version-lock candidate-path lookup order and its
//! authoritative-first-match semantics.

use aistack::{
    runtime,
    test_utils::env_lock,
    version_lock::{self, VersionLockError},
};

fn with_config_dir<T>(f: impl FnOnce(&std::path::Path) -> T) -> T {
    let _guard = env_lock();
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var("AISTACK_CONFIG_DIR", dir.path());
        std::env::remove_var("AISTACK_VERSIONS_LOCK");
    }
    runtime::refresh_from_env();
    let result = f(dir.path());
    unsafe {
        std::env::remove_var("AISTACK_CONFIG_DIR");
        std::env::remove_var("AISTACK_VERSIONS_LOCK");
    }
    runtime::refresh_from_env();
    result
}

#[test]
fn resolves_a_pinned_image_from_the_config_directory_lock_file() {
    with_config_dir(|dir| {
        std::fs::write(dir.join("versions.lock"), "llm-runtime:ollama/ollama:0.4.0\n").unwrap();
        let resolved = version_lock::resolve("llm-runtime", "ollama/ollama:0.3.0").unwrap();
        assert_eq!(resolved.pull_ref, "ollama/ollama:0.4.0");
        // The compose-level reference stays the default/floating one; only
        // the pull reference follows the pin.
        assert_eq!(resolved.tag_ref, "ollama/ollama:0.3.0");
    });
}

#[test]
fn falls_back_to_the_default_image_when_the_lock_file_omits_the_service() {
    with_config_dir(|dir| {
        std::fs::write(
            dir.join("versions.lock"),
            "frontend:ghcr.io/open-webui/open-webui:0.2.0\n",
        )
        .unwrap();
        let resolved = version_lock::resolve("llm-runtime", "ollama/ollama:0.3.0").unwrap();
        assert_eq!(resolved.pull_ref, "ollama/ollama:0.3.0");
    });
}

#[test]
fn an_explicit_override_path_wins_over_the_config_directory() {
    with_config_dir(|dir| {
        std::fs::write(dir.join("versions.lock"), "llm-runtime:ollama/ollama:0.4.0\n").unwrap();

        let override_dir = tempfile::tempdir().unwrap();
        let override_path = override_dir.path().join("custom.lock");
        std::fs::write(&override_path, "llm-runtime:ollama/ollama:9.9.9\n").unwrap();
        unsafe {
            std::env::set_var("AISTACK_VERSIONS_LOCK", &override_path);
        }
        runtime::refresh_from_env();

        let resolved = version_lock::resolve("llm-runtime", "ollama/ollama:0.3.0").unwrap();
        assert_eq!(resolved.pull_ref, "ollama/ollama:9.9.9");
    });
}

#[test]
fn a_malformed_line_is_reported_with_its_line_number() {
    with_config_dir(|dir| {
        std::fs::write(
            dir.join("versions.lock"),
            "llm-runtime:ollama/ollama:0.4.0\nnotapair\n",
        )
        .unwrap();
        let err = version_lock::resolve("llm-runtime", "ollama/ollama:0.3.0").unwrap_err();
        assert!(matches!(err, VersionLockError::MalformedLine { line_no: 2, .. }));
    });
}
