//! Coverage of the encrypted secret store across a simulated second-process
//! re-open and its on-disk permission audit.

use aistack::{runtime, secrets::SecretStore, test_utils::env_lock};

fn open_store_in(dir: &std::path::Path) -> SecretStore {
    unsafe {
        std::env::set_var("AISTACK_STATE_DIR", dir);
    }
    runtime::refresh_from_env();
    SecretStore::open().unwrap()
}

#[test]
fn store_retrieve_and_delete_round_trip() {
    let _guard = env_lock();
    let dir = tempfile::tempdir().unwrap();
    let store = open_store_in(dir.path());

    store.store("api-key", b"sk-integration-value").unwrap();
    assert_eq!(store.retrieve("api-key").unwrap(), b"sk-integration-value");

    store.delete("api-key").unwrap();
    assert!(store.retrieve("api-key").is_err());
    assert!(store.list().unwrap().is_empty());

    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
}

#[test]
fn a_second_open_reuses_the_bootstrapped_passphrase() {
    let _guard = env_lock();
    let dir = tempfile::tempdir().unwrap();
    let first = open_store_in(dir.path());
    first.store("shared", b"first-process-value").unwrap();

    let second = SecretStore::open().unwrap();
    assert_eq!(second.retrieve("shared").unwrap(), b"first-process-value");

    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
}

#[test]
fn freshly_written_secrets_pass_the_permission_audit() {
    let _guard = env_lock();
    let dir = tempfile::tempdir().unwrap();
    let store = open_store_in(dir.path());
    store.store("one", b"value-one").unwrap();
    store.store("two", b"value-two").unwrap();

    let offenders = store.audit_permissions().unwrap();
    assert!(offenders.is_empty(), "unexpected offenders: {offenders:?}");

    unsafe {
        std::env::remove_var("AISTACK_STATE_DIR");
    }
    runtime::refresh_from_env();
}
