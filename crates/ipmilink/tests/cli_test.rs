//! Integration tests for the `ipmilink` CLI binary.
//!
//! Everything runs offline: links are parsed locally, inventories come
//! from cache files written into a temp directory.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use ipmilink_api::mock::sdr::{CompactSensor, FruLocator, FullSensor};
use ipmilink_core::{InventoryCache, InventoryHeader};
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `ipmilink` binary with env isolation.
fn ipmilink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ipmilink");
    cmd.env("HOME", "/tmp/ipmilink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/ipmilink-cli-test-nonexistent")
        .env_remove("IPMILINK_CONFIG")
        .env_remove("IPMILINK_OUTPUT")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Two sensors owned by FRU 40, one sensor nobody claims.
fn write_cache(dir: &Path) -> PathBuf {
    let records = vec![
        FullSensor::new(0, 30, 97, "CU TEMP1").encode(),
        CompactSensor::new(1, 30, 97, "CU HS").encode(),
        FruLocator::new(2, 40, 30, 97, "CU1").encode(),
        FullSensor::new(3, 10, 1, "PSU TEMP").encode(),
    ];
    let header = InventoryHeader {
        version: 0x51,
        record_count: 4,
        free_space: 1024,
        most_recent_addition: 1_700_000_000,
        most_recent_erase: 1_600_000_000,
    };
    let path = dir.join("crate1.mch-1.cache");
    InventoryCache::new("crate1", "mch-1", header, records)
        .write(&path)
        .unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = ipmilink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    ipmilink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("address")
            .and(predicate::str::contains("inventory"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    ipmilink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ipmilink"));
}

// ── address ─────────────────────────────────────────────────────────

#[test]
fn test_address_table() {
    ipmilink_cmd()
        .args([
            "address",
            "@crate1 SENSOR 30:97 'CU TEMP1'",
            "crate1 PICMG_LED 130:2",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("30:97:CU TEMP1")
                .and(predicate::str::contains("fru 130 led 2"))
                .and(predicate::str::contains("sensor")),
        );
}

#[test]
fn test_address_json() {
    let output = ipmilink_cmd()
        .args(["--output", "json", "address", "crate1 OEM_CMD VT reboot"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let address = &value[0]["address"];
    assert_eq!(address["kind"], "vendor_command");
    assert_eq!(address["vendor_id"], "vt");
    assert_eq!(address["command_id"], "reboot");
}

#[test]
fn test_address_invalid_link_exit_code() {
    let output = ipmilink_cmd()
        .args([
            "--output",
            "plain",
            "address",
            "crate1 SENSOR 30:97 'CU TEMP1'",
            "crate1 BOGUS 1:2",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("crate1 SENSOR 30:97 'CU TEMP1'"), "{stdout}");
    assert!(stdout.contains("error: unknown address type 'BOGUS'"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 2 link(s) did not parse"), "{stderr}");
}

// ── inventory ───────────────────────────────────────────────────────

#[test]
fn test_inventory_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cache(dir.path());
    ipmilink_cmd()
        .args(["--color", "never", "inventory"])
        .arg(&path)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("SDR version: 1.5")
                .and(predicate::str::contains("Sensors (3)"))
                .and(predicate::str::contains("FRUs (1)"))
                .and(predicate::str::contains("Orphans (1)"))
                .and(predicate::str::contains("10:1:PSU TEMP")),
        );
}

#[test]
fn test_inventory_json_partitions_sensors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cache(dir.path());
    let output = ipmilink_cmd()
        .args(["-o", "json", "inventory"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["connection"], "crate1");
    assert_eq!(report["header"]["record_count"], 4);
    assert_eq!(report["sensors"].as_array().unwrap().len(), 3);
    assert_eq!(
        report["frus"][0]["sensors"],
        serde_json::json!(["30:97:CU TEMP1", "30:97:CU HS"])
    );
    assert_eq!(report["orphans"], serde_json::json!(["10:1:PSU TEMP"]));
    assert_eq!(report["sensors"][1]["kind"], "compact");
    assert_eq!(report["sensors"][1]["fru"], 40);
}

#[test]
fn test_inventory_orphans_plain() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_cache(dir.path());
    ipmilink_cmd()
        .args(["-o", "plain", "inventory", "--section", "orphans"])
        .arg(&path)
        .assert()
        .success()
        .stdout("10:1:PSU TEMP\n");
}

#[test]
fn test_inventory_missing_file() {
    ipmilink_cmd()
        .args(["inventory", "/tmp/ipmilink-cli-test-nonexistent/none.cache"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Cache file not found"));
}

#[test]
fn test_inventory_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.h.cache");
    std::fs::write(&path, "{ not json").unwrap();
    ipmilink_cmd()
        .arg("inventory")
        .arg(&path)
        .assert()
        .code(5)
        .stderr(predicate::str::contains("unusable"));
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    ipmilink_cmd()
        .args(["--config", "/etc/ipmilink/site.toml", "config", "path"])
        .assert()
        .success()
        .stdout("/etc/ipmilink/site.toml\n");
}

#[test]
fn test_config_show_without_file() {
    ipmilink_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No connections configured"));
}

#[test]
fn test_config_show_resolves_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[defaults]\ncache_dir = \"/srv/ipmi\"\n\n\
         [connections.crate1]\nhostname = \"mch-1\"\nusername = \"admin\"\n\
         password = \"pw\"\nauth_type = \"md5\"\n",
    )
    .unwrap();

    let output = ipmilink_cmd()
        .args(["-o", "json", "config", "show", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let views: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(views[0]["id"], "crate1");
    assert_eq!(views[0]["auth_type"], "md5");
    assert_eq!(views[0]["password_set"], true);
    assert_eq!(views[0]["session_timeout_ms"], 20_000);
    assert_eq!(views[0]["cache_file"], "/srv/ipmi/crate1.mch-1.cache");
    assert!(!String::from_utf8_lossy(&output.stdout).contains("\"pw\""));
}

#[test]
fn test_config_show_rejects_bad_profile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[connections.crate1]\nhostname = \"mch-1\"\nprotocol = \"serial\"\n",
    )
    .unwrap();
    ipmilink_cmd()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("protocol"));
}
