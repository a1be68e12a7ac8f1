//! Shared scaffolding for the integration suite: a fake `docker`/`podman`
//! CLI driven by marker files, and a minimal fixed-response HTTP server for
//! driving `HealthProber` deterministically.

#![allow(dead_code)]

use std::{
    fs,
    io::Write,
    net::{SocketAddr, TcpListener},
    os::unix::fs::PermissionsExt,
    path::Path,
    sync::OnceLock,
    thread,
};

/// A POSIX shell script standing in for `docker`/`podman`. State is tracked
/// in `<script-dir>/fake-containers/<name>.running` marker files rather
/// than baked in at install time, so the same script works regardless of
/// where it ends up on disk.
const FAKE_RUNTIME_SCRIPT: &str = r#"#!/bin/sh
dir="$(cd "$(dirname "$0")" && pwd)/fake-containers"
mkdir -p "$dir"

case "$1" in
  --version)
    echo "fake runtime 1.0.0"
    exit 0
    ;;
  network)
    exit 0
    ;;
  pull)
    exit 0
    ;;
  inspect)
    fmt="$3"
    ref="$4"
    case "$fmt" in
      *Id*)
        safe=$(printf '%s' "$ref" | tr -c 'a-zA-Z0-9' '-')
        echo "sha256:fake-$safe"
        exit 0
        ;;
      *Running*)
        marker="$dir/$ref.running"
        if [ -f "$marker" ] && [ "$(cat "$marker")" = "true" ]; then
          echo "true"
        else
          echo "false"
        fi
        exit 0
        ;;
    esac
    exit 1
    ;;
  run)
    shift
    name=""
    image=""
    prev=""
    for arg in "$@"; do
      if [ "$prev" = "--name" ]; then
        name="$arg"
      fi
      prev="$arg"
      image="$arg"
    done
    echo "true" > "$dir/$name.running"
    echo "fakecontainerid-$name"
    exit 0
    ;;
  stop)
    name="$2"
    echo "false" > "$dir/$name.running"
    exit 0
    ;;
  rm)
    name="$3"
    rm -f "$dir/$name.running"
    exit 0
    ;;
  logs)
    echo "fake log output"
    exit 0
    ;;
  volume)
    sub="$2"
    name="$3"
    marker="$dir/vol-$name.exists"
    case "$sub" in
      inspect)
        [ -f "$marker" ] && exit 0 || exit 1
        ;;
      create)
        touch "$marker"
        exit 0
        ;;
      rm)
        rm -f "$marker"
        exit 0
        ;;
    esac
    exit 1
    ;;
  *)
    exit 1
    ;;
esac
"#;

/// Installs fake `docker` and `podman` executables into `bin_dir`,
/// simulating the subset of the CLI surface `container::Runtime` drives.
pub fn install_fake_runtime(bin_dir: &Path) {
    fs::create_dir_all(bin_dir).unwrap();
    for name in ["docker", "podman"] {
        let path = bin_dir.join(name);
        fs::write(&path, FAKE_RUNTIME_SCRIPT).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }
}

fn base_path() -> String {
    static BASE: OnceLock<String> = OnceLock::new();
    BASE.get_or_init(|| std::env::var("PATH").unwrap_or_default()).clone()
}

/// Installs the fake runtime into `bin_dir` and prepends it to this
/// process's `PATH`, so in-process callers of `container::Runtime` resolve
/// to it. Callers must hold `test_utils::env_lock()` for the duration of
/// anything depending on the change.
pub fn activate_fake_runtime(bin_dir: &Path) {
    install_fake_runtime(bin_dir);
    let new_path = format!("{}:{}", bin_dir.display(), base_path());
    unsafe {
        std::env::set_var("PATH", new_path);
    }
}

/// Builds the `PATH` value a spawned child process should use to resolve a
/// fake runtime installed at `bin_dir`, without touching this process's own
/// environment. Used by `assert_cmd`-driven CLI tests.
pub fn fake_runtime_path_var(bin_dir: &Path) -> String {
    install_fake_runtime(bin_dir);
    format!("{}:{}", bin_dir.display(), base_path())
}

/// Spawns a background HTTP server on loopback that answers every request
/// with a fixed status code and empty body, for driving `HealthProber`
/// deterministically. The server runs until the test process exits.
pub fn spawn_fake_health_server(status_code: u16) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let reason = match status_code {
            200 => "OK",
            500 => "Internal Server Error",
            _ => "Status",
        };
        let response =
            format!("HTTP/1.1 {status_code} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let _ = stream.write_all(response.as_bytes());
        }
    });
    addr
}

/// Builds the health-check URL for a server started by
/// [`spawn_fake_health_server`].
pub fn health_url(addr: SocketAddr) -> String {
    format!("http://{addr}/health")
}
