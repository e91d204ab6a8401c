//! Integration tests for the vigil CLI commands.
#![allow(deprecated)] // Command::cargo_bin – macro replacement not yet stable

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A scenario with one mob next to a player.
fn ambush() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("ambush.json"),
        r#"{
    "name": "Ambush",
    "region": 4,
    "bodies": [
        { "name": "Traveller", "player": true, "level": 10, "at": [200, 0], "health": 5000 },
        {
            "name": "Highwayman", "level": 10, "faction": 2, "at": [0, 0],
            "brain": { "kind": "standard", "aggro_range": 500, "aggro_level": 100 }
        }
    ],
    "ambient": [
        { "source": "Highwayman", "trigger": "aggroing", "text": "Stand and deliver, {targetname}!" }
    ]
}"#,
    )
    .unwrap();
    dir
}

fn vigil() -> Command {
    Command::cargo_bin("vigil").unwrap()
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_prints_defaults() {
    vigil()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tick_ms\": 25"))
        .stdout(predicate::str::contains("\"max_aggro_distance\": 3600"));
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

#[test]
fn simulate_demo_runs() {
    vigil()
        .args(["simulate", "--duration", "5000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Thornwatch"))
        .stdout(predicate::str::contains("Brindle"))
        .stdout(predicate::str::contains("Goblin Brute"));
}

#[test]
fn simulate_scenario_file() {
    let dir = ambush();
    vigil()
        .args(["simulate", "--duration", "3000", "--scenario"])
        .arg(dir.path().join("ambush.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Ambush"))
        .stdout(predicate::str::contains("Traveller (20)"));
}

#[test]
fn simulate_verbose_prints_events() {
    let dir = ambush();
    vigil()
        .args(["simulate", "--verbose", "--duration", "3000", "--scenario"])
        .arg(dir.path().join("ambush.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Event Log"))
        .stdout(predicate::str::contains("Stand and deliver, Traveller!"));
}

#[test]
fn simulate_same_seed_same_output() {
    let run = || {
        vigil()
            .args(["simulate", "--verbose", "--seed", "7", "--duration", "8000"])
            .env("NO_COLOR", "1")
            .output()
            .unwrap()
            .stdout
    };
    assert_eq!(run(), run());
}

#[test]
fn simulate_with_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("server.json");
    fs::write(&path, r#"{ "ai": { "max_events": 5 } }"#).unwrap();
    vigil()
        .args(["simulate", "--duration", "2000", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("5 events logged"));
}

#[test]
fn simulate_missing_scenario_fails() {
    vigil()
        .args(["simulate", "--scenario", "/nonexistent/scenario.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn simulate_unknown_order_target_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{
    "name": "Bad",
    "bodies": [
        { "name": "Owner", "player": true, "level": 5 },
        { "name": "Pup", "level": 5, "owner": "Owner", "brain": { "kind": "pet" } }
    ],
    "orders": [ { "at": 100, "body": "Pup", "order": "attack", "target": "Nobody" } ]
}"#,
    )
    .unwrap();
    vigil()
        .args(["simulate", "--scenario"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no body named 'Nobody'"));
}
