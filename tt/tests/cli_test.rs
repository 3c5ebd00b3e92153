//! Binary-level tests
//!
//! Every run of the binary exits successfully; failures only show up on stderr.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "TUNNEL_MANAGEMENT_CONNECTOR",
    "TUNNEL_MANAGEMENT_FILTER_EVENTS",
    "TUNNEL_MANAGEMENT_FILTER_LEVEL",
    "TUNNEL_MANAGEMENT_TOKEN",
    "TUNNEL_MANAGEMENT_HOSTNAME",
    "TUNNEL_LOGLEVEL",
    "RUST_LOG",
];

/// Binary run from an empty directory with no inherited tunnel settings
fn tunneltail(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tunneltail").expect("binary should build");
    cmd.current_dir(workdir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_version_flag() {
    let workdir = TempDir::new().unwrap();
    tunneltail(&workdir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("tunneltail "));
}

#[test]
fn test_invalid_level_lists_allowed_values() {
    let workdir = TempDir::new().unwrap();
    tunneltail(&workdir)
        .args(["--level", "loud", "--management-hostname", "127.0.0.1:1"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("invalid filters provided"))
        .stderr(predicate::str::contains("debug, info, warn, error"));
}

#[test]
fn test_invalid_event_from_env_lists_allowed_values() {
    let workdir = TempDir::new().unwrap();
    tunneltail(&workdir)
        .args(["--management-hostname", "127.0.0.1:1"])
        .env("TUNNEL_MANAGEMENT_FILTER_EVENTS", "http,bogus")
        .assert()
        .success()
        .stderr(predicate::str::contains("cloudflared, http, tcp, udp"));
}

#[test]
fn test_unreachable_endpoint_is_reported() {
    let workdir = TempDir::new().unwrap();
    tunneltail(&workdir)
        .args(["--token", "s3cr3t-token", "--management-hostname", "127.0.0.1:1"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("unable to start management log streaming session"))
        .stderr(predicate::str::contains("s3cr3t-token").not());
}

#[test]
fn test_config_file_supplies_filters() {
    let workdir = TempDir::new().unwrap();
    let config = workdir.path().join("tail.yml");
    std::fs::write(&config, "management-hostname: 127.0.0.1:1\nevents:\n  - nonsense\n").unwrap();

    tunneltail(&workdir)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stderr(predicate::str::contains("invalid --event filter 'nonsense'"));
}

#[test]
fn test_missing_config_file_fails() {
    let workdir = TempDir::new().unwrap();
    tunneltail(&workdir)
        .args(["--config", "does-not-exist.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
