//! Coverage of the auto-suspend controller's persisted state and its
//! handling of the GPU-unavailable sentinel, driven through a deterministic
//! fake `GpuProbe` rather than real `/proc/stat`/`nvidia-smi` sampling.

use std::time::Duration;

use aistack::{
    constants::SUSPEND_STATE_FILE_NAME,
    probe::{GpuProbe, ProbeError},
    runtime,
    suspend::SuspendController,
    test_utils::env_lock,
};

struct FixedGpuProbe(f64);

impl GpuProbe for FixedGpuProbe {
    fn utilization_percent(&self) -> Result<f64, ProbeError> {
        Ok(self.0)
    }
}

fn with_state_dir<T>(f: impl FnOnce(&std::path::Path) -> T) -> T {
    let _guard = env_lock();
    let dir = tempfile::tempdir().unwrap();
    unsafe {
        std::env::set_var("AISTACK_STATE_DIR", dir.path());
    }
    runtime::refresh_from_env();
    let result = f(dir.path());
    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
    result
}

#[test]
fn enable_then_disable_persists_across_a_state_reload() {
    with_state_dir(|dir| {
        let probe = FixedGpuProbe(0.0);
        let controller = SuspendController::new(Duration::from_secs(300), true, &probe);

        controller.enable().unwrap();
        let enabled_raw = std::fs::read_to_string(dir.join(SUSPEND_STATE_FILE_NAME)).unwrap();
        assert!(enabled_raw.contains("\"enabled\": true"));

        controller.disable().unwrap();
        let disabled_raw = std::fs::read_to_string(dir.join(SUSPEND_STATE_FILE_NAME)).unwrap();
        assert!(disabled_raw.contains("\"enabled\": false"));
    });
}

#[test]
fn a_disabled_controller_never_acts_even_when_fully_idle() {
    with_state_dir(|_dir| {
        let probe = FixedGpuProbe(0.0);
        let controller = SuspendController::new(Duration::from_secs(0), true, &probe);
        controller.disable().unwrap();
        let acted = controller.check_and_suspend().unwrap();
        assert!(!acted);
    });
}

#[test]
fn a_negative_gpu_reading_does_not_error_and_falls_back_to_cpu_alone() {
    with_state_dir(|_dir| {
        let probe = FixedGpuProbe(-1.0);
        let controller = SuspendController::new(Duration::from_secs(0), true, &probe);
        controller.enable().unwrap();
        assert!(controller.check_and_suspend().is_ok());
    });
}
