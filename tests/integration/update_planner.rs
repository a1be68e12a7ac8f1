//! End-to-end coverage of the update-then-verify-then-rollback protocol
//! against the fake container runtime.

#[path = "support.rs"]
#[allow(dead_code)]
mod support;

use aistack::{
    container::Runtime,
    runtime,
    service::ServiceSpec,
    test_utils::env_lock,
    update::{validate_image_reference, HealthStatusRecord, UpdateError, UpdateStatus, Updater},
    version_lock::ResolvedImage,
};

fn spec(name: &str, image: &str, health_addr: std::net::SocketAddr) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        image_ref: image.to_string(),
        health_url: support::health_url(health_addr),
        env: vec![],
        ports: vec![],
        volumes: vec![],
    }
}

fn floating(image: &str) -> ResolvedImage {
    ResolvedImage {
        pull_ref: image.to_string(),
        tag_ref: image.to_string(),
    }
}

fn with_runtime<T>(f: impl FnOnce(&Runtime) -> T) -> T {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());
    let state_dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var("AISTACK_STATE_DIR", state_dir.path());
    }
    runtime::refresh_from_env();

    let runtime_handle = Runtime::resolve().unwrap();
    let result = f(&runtime_handle);

    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
    result
}

#[test]
fn a_healthy_swap_completes() {
    with_runtime(|runtime_handle| {
        let health_addr = support::spawn_fake_health_server(200);
        let old = spec("update-completes", "example/update:1.0.0", health_addr);
        let updater = Updater::new(runtime_handle);

        let plan = updater.update(&old, &floating("example/update:2.0.0")).unwrap();
        assert_eq!(plan.status, UpdateStatus::Completed);
        assert_ne!(plan.old_image_id, plan.new_image_id);
    });
}

#[test]
fn a_failing_health_check_triggers_automatic_rollback() {
    with_runtime(|runtime_handle| {
        let health_addr = support::spawn_fake_health_server(500);
        let old = spec("update-rolls-back", "example/update:1.0.0", health_addr);
        let updater = Updater::new(runtime_handle);

        let plan = updater.update(&old, &floating("example/update:2.0.0")).unwrap();
        assert_eq!(plan.status, UpdateStatus::RolledBack);
        assert_eq!(plan.health_after_swap, Some(HealthStatusRecord::Yellow));
    });
}

#[test]
fn a_pinned_update_pulls_and_retags_onto_the_floating_reference() {
    with_runtime(|runtime_handle| {
        let health_addr = support::spawn_fake_health_server(200);
        let old = spec("update-pinned", "example/update:1.0.0", health_addr);
        let updater = Updater::new(runtime_handle);

        let resolved = ResolvedImage {
            pull_ref: "example/update@sha256:deadbeef".to_string(),
            tag_ref: "example/update:1.0.0".to_string(),
        };
        let plan = updater.update(&old, &resolved).unwrap();
        assert_eq!(plan.status, UpdateStatus::Completed);
        assert_eq!(plan.new_image, "example/update:1.0.0");
        assert_eq!(plan.pull_reference, "example/update@sha256:deadbeef");
    });
}

#[test]
fn an_untagged_image_is_rejected_before_any_runtime_interaction() {
    with_runtime(|runtime_handle| {
        let health_addr = support::spawn_fake_health_server(200);
        let old = spec("update-policy-rejected", "example/update:1.0.0", health_addr);
        let updater = Updater::new(runtime_handle);

        let err = updater
            .update(&old, &floating("example/update-untagged"))
            .unwrap_err();
        assert!(matches!(err, UpdateError::PolicyRejected { .. }));
        validate_image_reference("update-policy-rejected", "example/update:1.0.0").unwrap();
    });
}

#[test]
fn rollback_last_restores_the_previously_recorded_image() {
    with_runtime(|runtime_handle| {
        let health_addr = support::spawn_fake_health_server(200);
        let old = spec("update-rollback-last", "example/update:1.0.0", health_addr);
        let updater = Updater::new(runtime_handle);

        let plan = updater.update(&old, &floating("example/update:2.0.0")).unwrap();
        assert_eq!(plan.status, UpdateStatus::Completed);

        let mut current = old.clone();
        current.image_ref = "example/update:2.0.0".to_string();

        let rollback_plan = updater.rollback_last(&current).unwrap();
        assert_eq!(rollback_plan.status, UpdateStatus::RolledBack);
    });
}
