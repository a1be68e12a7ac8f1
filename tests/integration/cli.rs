//! Black-box coverage of the `aistackctl` binary against the fake container
//! runtime, driven through `assert_cmd` rather than in-process calls.

#[path = "support.rs"]
#[allow(dead_code)]
mod support;

use assert_cmd::Command;
use predicates::prelude::*;

fn base_cmd(
    bin_dir: &std::path::Path,
    state_dir: &std::path::Path,
    config_dir: &std::path::Path,
) -> Command {
    let mut cmd = Command::cargo_bin("aistackctl").unwrap();
    let path = support::fake_runtime_path_var(bin_dir);
    cmd.env("PATH", path)
        .env("AISTACK_STATE_DIR", state_dir)
        .env("AISTACK_CONFIG_DIR", config_dir)
        .env("AISTACK_RUNTIME", "docker");
    cmd
}

#[test]
fn status_json_reports_every_registered_service_as_stopped() {
    let bin_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"stopped\""));
}

#[test]
fn wol_send_rejects_invalid_mac_address() {
    let bin_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .args(["wol-send", "not-a-mac"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid MAC address"));
}

#[test]
fn suspend_enable_then_disable_round_trips() {
    let bin_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .arg("suspend-enable")
        .assert()
        .success()
        .stdout(predicate::str::contains("auto-suspend enabled"));

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .arg("suspend-disable")
        .assert()
        .success()
        .stdout(predicate::str::contains("auto-suspend disabled"));

    let raw = std::fs::read_to_string(state_dir.path().join("suspend_state.json")).unwrap();
    assert!(raw.contains("\"enabled\": false"));
}

#[test]
fn start_and_stop_single_service_round_trip() {
    let bin_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .args(["start", "llm-runtime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("started 'llm-runtime'"));

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .args(["stop", "llm-runtime"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stopped 'llm-runtime'"));
}

#[test]
fn unknown_service_name_is_a_clean_error_not_a_panic() {
    let bin_dir = tempfile::tempdir().unwrap();
    let state_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();

    base_cmd(bin_dir.path(), state_dir.path(), config_dir.path())
        .args(["start", "not-a-real-service"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown service"));
}
