//! End-to-end coverage of the GPU lock manager bound through the public,
//! environment-driven constructor path rather than its private struct
//! literal.

use std::time::Duration;

use aistack::{constants::GPU_LOCK_HOLDERS, gpu_lock::GpuLockError, gpu_lock::GpuLockManager, runtime, test_utils::env_lock};

fn holders() -> Vec<String> {
    GPU_LOCK_HOLDERS.iter().map(|s| s.to_string()).collect()
}

fn with_state_dir<T>(f: impl FnOnce() -> T) -> T {
    let _guard = env_lock();
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var("AISTACK_STATE_DIR", dir.path());
    }
    runtime::refresh_from_env();
    let result = f();
    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
    result
}

#[test]
fn acquire_then_release_round_trips() {
    with_state_dir(|| {
        let mgr = GpuLockManager::new(holders());
        mgr.acquire("openwebui").unwrap();
        assert!(mgr.is_locked().unwrap());
        mgr.release("openwebui").unwrap();
        assert!(!mgr.is_locked().unwrap());
    });
}

#[test]
fn acquire_rejects_a_holder_name_outside_the_recognised_set() {
    with_state_dir(|| {
        let mgr = GpuLockManager::new(holders());
        let err = mgr.acquire("llm-runtime").unwrap_err();
        assert!(matches!(err, GpuLockError::UnknownHolder(_)));
    });
}

#[test]
fn a_second_manager_instance_observes_the_first_ones_lock() {
    with_state_dir(|| {
        let first = GpuLockManager::new(holders());
        let second = GpuLockManager::new(holders());

        first.acquire("openwebui").unwrap();
        let err = second.acquire("localai").unwrap_err();
        assert!(matches!(err, GpuLockError::HeldByOther { .. }));

        first.release("openwebui").unwrap();
        second.acquire("localai").unwrap();
        assert_eq!(second.get_status().unwrap().holder, "localai");
    });
}

#[test]
fn force_unlock_clears_any_holder() {
    with_state_dir(|| {
        let mgr = GpuLockManager::new(holders());
        mgr.acquire("localai").unwrap();
        mgr.force_unlock().unwrap();
        assert!(!mgr.is_locked().unwrap());
        assert_eq!(mgr.get_status().unwrap().holder, "none");
    });
}

#[test]
fn a_lock_past_its_lease_timeout_is_reclaimed_by_another_holder() {
    with_state_dir(|| {
        let short_lease = GpuLockManager::with_lease_timeout(holders(), Duration::from_millis(50));
        short_lease.acquire("openwebui").unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!short_lease.is_locked().unwrap());

        short_lease.acquire("localai").unwrap();
        assert_eq!(short_lease.get_status().unwrap().holder, "localai");
    });
}
