//! Coverage of in-place repair and fleet-wide purge against the fake
//! container runtime.

#[path = "support.rs"]
#[allow(dead_code)]
mod support;

use std::collections::HashMap;

use aistack::{
    container::Runtime,
    repair,
    runtime,
    service::{Service, ServiceSpec},
    test_utils::env_lock,
};

fn spec(name: &str, health_addr: std::net::SocketAddr, volumes: Vec<String>) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        image_ref: "example/image:1.0.0".to_string(),
        health_url: support::health_url(health_addr),
        env: vec![],
        ports: vec![],
        volumes,
    }
}

#[test]
fn repair_service_skips_an_already_healthy_service() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());

    let health_addr = support::spawn_fake_health_server(200);
    let runtime_handle = Runtime::resolve().unwrap();
    let s = spec("repair-green", health_addr, vec![]);
    Service::new(s.clone(), &runtime_handle).start().unwrap();

    let outcome = repair::repair_service(&s, &runtime_handle).unwrap();
    assert!(!outcome.restarted);
    assert!(outcome.success);
    assert_eq!(outcome.skipped_reason.as_deref(), Some("already healthy"));
}

#[test]
fn repair_service_restarts_a_stopped_service() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());

    let health_addr = support::spawn_fake_health_server(200);
    let runtime_handle = Runtime::resolve().unwrap();
    let s = spec("repair-stopped", health_addr, vec![]);

    let outcome = repair::repair_service(&s, &runtime_handle).unwrap();
    assert!(outcome.restarted);
    assert!(outcome.success);
    assert!(outcome.skipped_reason.is_none());
    assert!(runtime_handle.is_running(&s.name).unwrap());
}

#[test]
fn purge_then_verify_clean_reports_removed_containers_and_volumes() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());
    let state_dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var("AISTACK_STATE_DIR", state_dir.path());
    }
    runtime::refresh_from_env();

    let health_addr = support::spawn_fake_health_server(200);
    let runtime_handle = Runtime::resolve().unwrap();

    let mut specs = HashMap::new();
    specs.insert(
        aistack::constants::service_names::LLM_RUNTIME.to_string(),
        spec(
            aistack::constants::service_names::LLM_RUNTIME,
            health_addr,
            vec!["llm-runtime-models".to_string()],
        ),
    );
    let llm_spec = specs[aistack::constants::service_names::LLM_RUNTIME].clone();
    Service::new(llm_spec.clone(), &runtime_handle).install().unwrap();

    assert!(!repair::verify_clean(&specs, &runtime_handle).unwrap().clean);

    repair::purge_all(&specs, &runtime_handle, false).unwrap();

    let report = repair::verify_clean(&specs, &runtime_handle).unwrap();
    assert!(report.clean, "expected no leftovers, found: {:?}", report.leftovers);

    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
}

#[test]
fn purge_preserves_config_entries_unless_asked_to_remove_them() {
    let _guard = env_lock();
    let bin_dir = tempfile::tempdir().unwrap();
    support::activate_fake_runtime(bin_dir.path());
    let state_dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var("AISTACK_STATE_DIR", state_dir.path());
    }
    runtime::refresh_from_env();

    std::fs::write(state_dir.path().join("state1.json"), b"{}").unwrap();
    std::fs::write(state_dir.path().join("config.yaml"), b"updates: {}").unwrap();
    std::fs::write(state_dir.path().join("wol_config.json"), b"{}").unwrap();

    let specs: HashMap<String, ServiceSpec> = HashMap::new();
    let runtime_handle = Runtime::resolve().unwrap();

    repair::purge_all(&specs, &runtime_handle, false).unwrap();

    assert!(!state_dir.path().join("state1.json").exists());
    assert!(state_dir.path().join("config.yaml").exists());
    assert!(state_dir.path().join("wol_config.json").exists());

    let report = repair::verify_clean(&specs, &runtime_handle).unwrap();
    assert!(!report.clean);
    assert!(report.leftovers.iter().any(|l| l.contains("config.yaml")));
    assert!(report.leftovers.iter().any(|l| l.contains("wol_config.json")));

    repair::purge_all(&specs, &runtime_handle, true).unwrap();
    let report = repair::verify_clean(&specs, &runtime_handle).unwrap();
    assert!(report.clean, "expected no leftovers, found: {:?}", report.leftovers);

    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
}
