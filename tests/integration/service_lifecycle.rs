//! End-to-end coverage of a single `Service` against the fake container
//! runtime and a fake HTTP health endpoint.

#[path = "support.rs"]
#[allow(dead_code)]
mod support;

use aistack::{
    container::Runtime,
    service::{Service, ServiceError, ServiceSpec, ServiceState},
    test_utils::env_lock,
};

fn spec(name: &str, health_url: String) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        image_ref: "example/image:1.0.0".to_string(),
        health_url,
        env: vec![],
        ports: vec![],
        volumes: vec![],
    }
}

#[test]
fn install_start_status_and_stop_round_trip() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());

    let health_addr = support::spawn_fake_health_server(200);
    let runtime = Runtime::resolve().unwrap();
    let service = Service::new(spec("lifecycle-green", support::health_url(health_addr)), &runtime);

    assert_eq!(service.status().unwrap(), ServiceState::Stopped);

    service.install().unwrap();
    service.start().unwrap();
    assert_eq!(service.status().unwrap(), ServiceState::Running);

    service.stop().unwrap();
    assert_eq!(service.status().unwrap(), ServiceState::Stopped);
}

#[test]
fn status_is_degraded_when_the_health_check_fails() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());

    let health_addr = support::spawn_fake_health_server(500);
    let runtime = Runtime::resolve().unwrap();
    let service = Service::new(spec("lifecycle-degraded", support::health_url(health_addr)), &runtime);

    service.install().unwrap();
    service.start().unwrap();
    assert_eq!(service.status().unwrap(), ServiceState::Degraded);

    service.stop().unwrap();
}

#[test]
fn status_with_health_exposes_the_raw_tri_state_behind_degraded() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());

    let health_addr = support::spawn_fake_health_server(500);
    let runtime = Runtime::resolve().unwrap();
    let service = Service::new(spec("lifecycle-yellow", support::health_url(health_addr)), &runtime);

    service.install().unwrap();
    service.start().unwrap();
    let (state, health) = service.status_with_health().unwrap();
    assert_eq!(state, ServiceState::Degraded);
    assert_eq!(health, aistack::health::HealthStatus::Yellow);

    service.stop().unwrap();
    let (stopped_state, stopped_health) = service.status_with_health().unwrap();
    assert_eq!(stopped_state, ServiceState::Stopped);
    assert_eq!(stopped_health, aistack::health::HealthStatus::Red);
}

#[test]
fn a_failing_pre_start_hook_aborts_before_the_container_starts() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());

    let health_addr = support::spawn_fake_health_server(200);
    let runtime = Runtime::resolve().unwrap();
    let failing_hook: aistack::service::Hook = Box::new(|| Err("precondition not met".to_string()));
    let service = Service::with_hooks(
        spec("lifecycle-hook-guarded", support::health_url(health_addr)),
        &runtime,
        Some(failing_hook),
        None,
    );

    // `install` ends in a `start`, so a failing pre-start hook surfaces
    // through `install` itself rather than requiring a separate `start` call.
    let err = service.install().unwrap_err();
    assert!(matches!(err, ServiceError::PreStartHookFailed { .. }));
    assert_eq!(service.status().unwrap(), ServiceState::Stopped);
}
