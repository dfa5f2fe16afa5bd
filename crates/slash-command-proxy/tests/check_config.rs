use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::{fs, path::PathBuf};
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/config")
        .join(name)
}

/// `check-config` with the config-related environment cleared.
fn check_config() -> Command {
    let mut cmd = cargo_bin_cmd!("slash-command-proxy");
    cmd.arg("check-config")
        .env_remove("PORT")
        .env_remove("NATS_URL")
        .env_remove("SLASH_PROXY_CONFIG");
    cmd
}

#[test]
fn valid_config_reports_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let output = check_config()
        .arg("--config")
        .arg(fixture("valid.json"))
        .output()?;
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["errors"].as_array().map(Vec::len), Some(0));
    assert_eq!(report["warnings"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn legacy_config_warns_about_shadowed_and_unprefixed_commands()
-> Result<(), Box<dyn std::error::Error>> {
    let output = check_config()
        .arg("--config")
        .arg(fixture("legacy.json"))
        .output()?;
    assert!(output.status.success());

    let report: Value = serde_json::from_slice(&output.stdout)?;
    let warnings = report["warnings"].to_string();
    assert!(warnings.contains("does not start with '/'"), "{warnings}");
    assert!(warnings.contains("commands[2] duplicates commands[0]"), "{warnings}");
    Ok(())
}

#[test]
fn blank_secret_fails_with_exit_code_two() {
    check_config()
        .arg("--config")
        .arg(fixture("invalid.json"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("commands[0].signing_secret is empty"));
}

#[test]
fn config_path_can_come_from_env() {
    check_config()
        .env("SLASH_PROXY_CONFIG", fixture("invalid.json"))
        .assert()
        .code(2);
}

#[test]
fn unknown_entry_field_is_a_load_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"commands":[{"command":"/a","signing_secret":"s","team_domain":"t","scope":"x"}]}"#,
    )?;

    check_config()
        .arg("--config")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown field"));
    Ok(())
}

#[test]
fn missing_file_is_a_load_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    check_config()
        .arg("--config")
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read config file"));
    Ok(())
}

#[test]
fn bad_port_override_is_a_load_error() {
    check_config()
        .arg("--config")
        .arg(fixture("valid.json"))
        .env("PORT", "not-a-port")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not-a-port"));
}
