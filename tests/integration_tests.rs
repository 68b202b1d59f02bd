//! Integration tests for the calm CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.
//! Every test points the config file and cache database into a temp
//! directory so nothing touches the user's real files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to get a calm command isolated inside `tmp`
fn calm(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("calm").unwrap();
    cmd.env("CALM_DSL_CONFIG_FILE_LOCATION", tmp.path().join("config.yaml"))
        .env("CALM_DSL_DB_LOCATION", tmp.path().join("dsl.db"))
        .env_remove("CALM_DSL_PC_IP")
        .env_remove("CALM_DSL_PC_PORT")
        .env_remove("CALM_DSL_PC_USERNAME")
        .env_remove("CALM_DSL_PC_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Same as `calm` but pointed at a local port nothing listens on
fn calm_unreachable(tmp: &TempDir) -> Command {
    let mut cmd = calm(tmp);
    cmd.env("CALM_DSL_PC_IP", "127.0.0.1")
        .env("CALM_DSL_PC_PORT", "1")
        .env("CALM_DSL_PC_USERNAME", "admin")
        .env("CALM_DSL_PC_PASSWORD", "secret");
    cmd
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cache"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("calm"));
}

#[test]
fn test_unknown_command_fails() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp).arg("blueprint").assert().failure();
}

#[test]
fn test_cache_help_lists_subcommands() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("clear"))
        .stdout(predicate::str::contains("show"));
}

// ============================================================================
// Cache Tests
// ============================================================================

#[test]
fn test_cache_show_empty() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache is empty"));
}

#[test]
fn test_cache_show_creates_database() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp).args(["cache", "show"]).assert().success();
    assert!(tmp.path().join("dsl.db").exists());
}

#[test]
fn test_cache_show_json_empty_list() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_cache_show_invalid_type() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "show", "--type", "BLUEPRINT"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid entity type"));
}

#[test]
fn test_cache_update_invalid_type() {
    let tmp = TempDir::new().unwrap();
    calm_unreachable(&tmp)
        .args(["cache", "update", "--type", "BOGUS"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid entity type"));
    // Rejected before the cache was touched
    assert!(!tmp.path().join("dsl.db").exists());
}

#[test]
fn test_cache_update_without_server_config() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "update"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not configured"));
}

#[test]
fn test_cache_update_single_type_unreachable_fails() {
    let tmp = TempDir::new().unwrap();
    calm_unreachable(&tmp)
        .args(["cache", "update", "--type", "account"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to update ACCOUNT cache"));
}

#[test]
fn test_cache_update_all_unreachable_warns() {
    let tmp = TempDir::new().unwrap();
    calm_unreachable(&tmp)
        .args(["cache", "update"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Warning:"))
        .stderr(predicate::str::contains("PROJECT not refreshed"));
}

#[test]
fn test_cache_get_miss_suggests_update() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "get", "ACCOUNT", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found in cache"))
        .stderr(predicate::str::contains("calm cache update"));
}

#[test]
fn test_cache_get_requires_name_or_uuid() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp).args(["cache", "get", "ACCOUNT"]).assert().failure();
}

#[test]
fn test_cache_get_rejects_malformed_attr() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "get", "AHV_SUBNET", "vlan0", "--attr", "cluster"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_cache_add_unreachable_fails() {
    let tmp = TempDir::new().unwrap();
    calm_unreachable(&tmp)
        .args(["cache", "add", "PROJECT", "0000-1111"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to refresh PROJECT"));
}

#[test]
fn test_cache_delete_missing_entry() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "delete", "ACCOUNT", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not cached"));
}

#[test]
fn test_cache_clear_with_yes() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache cleared"));
}

#[test]
fn test_cache_clear_needs_confirmation_when_not_interactive() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_cache_status_lists_types() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache Status"))
        .stdout(predicate::str::contains("AHV_SUBNET"))
        .stdout(predicate::str::contains("never"));
}

#[test]
fn test_cache_reset_removes_database() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp).args(["cache", "show"]).assert().success();
    assert!(tmp.path().join("dsl.db").exists());

    calm(&tmp)
        .args(["cache", "reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cache database removed"));
    assert!(!tmp.path().join("dsl.db").exists());
}

#[test]
fn test_cache_reset_without_database() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["cache", "reset", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No cache to reset"));
}

#[test]
fn test_foreign_database_is_rejected() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("dsl.db"), "not a database at all").unwrap();
    calm(&tmp).args(["cache", "show"]).assert().failure();
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_set_then_show() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "pc_ip", "10.0.0.5"])
        .assert()
        .success();

    calm(&tmp)
        .args(["config", "show", "pc_ip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.5"));

    let contents = fs::read_to_string(tmp.path().join("config.yaml")).unwrap();
    let doc: serde_yml::Value = serde_yml::from_str(&contents).unwrap();
    assert_eq!(doc["pc_ip"].as_str(), Some("10.0.0.5"));
}

#[test]
fn test_config_set_keeps_existing_keys() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "pc_ip", "10.0.0.5"])
        .assert()
        .success();
    calm(&tmp)
        .args(["config", "set", "pc_port", "9441"])
        .assert()
        .success();

    calm(&tmp)
        .args(["config", "show", "pc_ip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.0.0.5"));
}

#[test]
fn test_config_set_refuses_malformed_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.yaml");
    let original = "pc_ip: 10.0.0.5\nusername: admin\npassword: s3cret\n  bad: [\n";
    fs::write(&path, original).unwrap();

    calm(&tmp)
        .args(["config", "set", "pc_port", "9441"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));

    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_config_unset_refuses_non_mapping_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.yaml");
    fs::write(&path, "just a string\n").unwrap();

    calm(&tmp)
        .args(["config", "unset", "pc_ip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));

    calm(&tmp)
        .args(["config", "set", "pc_ip", "10.0.0.5"])
        .assert()
        .failure();

    assert_eq!(fs::read_to_string(&path).unwrap(), "just a string\n");
}

#[test]
fn test_config_env_overrides_file() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "pc_ip", "10.0.0.5"])
        .assert()
        .success();

    calm(&tmp)
        .env("CALM_DSL_PC_IP", "10.9.9.9")
        .args(["config", "show", "pc_ip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10.9.9.9"));
}

#[test]
fn test_config_password_is_masked() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "password", "hunter2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2").not());

    calm(&tmp)
        .args(["config", "show", "password"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"));
}

#[test]
fn test_config_unset() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "username", "admin"])
        .assert()
        .success();
    calm(&tmp)
        .args(["config", "unset", "username"])
        .assert()
        .success();
    calm(&tmp)
        .args(["config", "show", "username"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not set"));
}

#[test]
fn test_config_rejects_unknown_key() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "author", "someone"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));
}

#[test]
fn test_config_rejects_bad_port() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "set", "pc_port", "99999"])
        .assert()
        .failure();
}

#[test]
fn test_config_keys() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "keys"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pc_ip"))
        .stdout(predicate::str::contains("db_location"));
}

#[test]
fn test_config_path_honors_env() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.yaml"));
}

// ============================================================================
// Completions
// ============================================================================

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    calm(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calm"));
}
