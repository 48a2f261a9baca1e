use std::fs;
use std::net::TcpListener;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn poseidon_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("poseidon"))
}

/// A port nothing is listening on.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}

#[test]
fn short_version_flag_prints_version_and_exits() {
    poseidon_cmd()
        .arg("-v")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn long_version_flag_prints_version_and_exits() {
    poseidon_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains("poseidon"));
}

#[test]
fn help_lists_override_flags() {
    poseidon_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("--port"))
        .stdout(contains("--window-path"))
        .stdout(contains("--mime-failure"));
}

#[test]
fn missing_root_fails_before_startup() {
    let scratch = TempDir::new().expect("scratch");
    poseidon_cmd()
        .args(["--root"])
        .arg(scratch.path().join("does-not-exist"))
        .assert()
        .failure()
        .stderr(contains("not a directory"));
}

#[test]
fn malformed_config_file_is_reported() {
    let root = TempDir::new().expect("root");
    fs::write(root.path().join(".poseidon.yaml"), "port: [not a port").expect("write config");
    poseidon_cmd()
        .arg("--root")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(contains(".poseidon.yaml"));
}

#[test]
fn unknown_mime_failure_policy_is_rejected() {
    poseidon_cmd()
        .args(["--mime-failure", "retry"])
        .assert()
        .failure()
        .stderr(contains("expected: skip, stall"));
}

#[test]
fn tls_cert_without_key_is_rejected() {
    poseidon_cmd()
        .args(["--tls-cert", "dev.crt"])
        .assert()
        .failure()
        .stderr(contains("--tls-key"));
}

#[test]
fn status_without_daemon_reports_not_running() {
    let port = closed_port().to_string();
    poseidon_cmd()
        .args(["status", "--json", "-p", &port])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));
}
