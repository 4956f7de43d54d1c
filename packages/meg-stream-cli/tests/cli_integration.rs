use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn megstream() -> Command {
    let mut cmd = Command::cargo_bin("megstream").unwrap();
    cmd.env_remove("MEGSTREAM_CONFIG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success();
    String::from_utf8(output.get_output().stdout.clone()).unwrap()
}

const SESSION: &str = r#"{
    "channels": [
        {"name": "MEG0111", "kind": "meg"},
        {"name": "MEG0112", "kind": "meg"},
        {"name": "MEG0113", "kind": "meg"},
        {"name": "MEG0121", "kind": "meg", "bad": true}
    ],
    "projections": [
        {"name": "ecg", "weights": [["MEG0111", 1.0], ["MEG0112", 1.0], ["MEG0113", 1.0]]},
        {"name": "stale", "weights": [["MEG0121", 1.0]]},
        {"name": "off", "weights": [["MEG0111", 1.0]], "active": false}
    ]
}"#;

fn write_session(dir: &TempDir) -> String {
    let path = dir.path().join("session.json");
    fs::write(&path, SESSION).unwrap();
    path.display().to_string()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    megstream()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    megstream()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("megstream"));
}

// =============================================================================
// CONFIG SUBCOMMAND
// =============================================================================

#[test]
fn test_config_prints_defaults() {
    let stdout = stdout_of(megstream().arg("config"));
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(parsed["buffer_capacity"], 64);
    assert_eq!(parsed["estimator"]["window_length"], 1024);
    assert_eq!(parsed["estimator"]["window_function"], "hann");
    assert_eq!(parsed["projection_stage"], "none");
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipeline.json");

    megstream()
        .args(["config", "--output", path.to_str().unwrap()])
        .assert()
        .success();
    assert!(path.exists());

    let stdout = stdout_of(megstream().args(["config", "--compact", "--input", path.to_str().unwrap()]));
    assert!(stdout.contains(r#""buffer_capacity":64"#));
}

#[test]
fn test_config_rejects_invalid_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, r#"{"buffer_capacity": 0}"#).unwrap();

    megstream()
        .args(["config", "--input", path.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("buffer capacity"));
}

// =============================================================================
// RUN SUBCOMMAND
// =============================================================================

fn small_run() -> Command {
    let mut cmd = megstream();
    cmd.args([
        "run",
        "--quiet",
        "--channels",
        "2",
        "--sample-rate",
        "256",
        "--block-size",
        "64",
        "--blocks",
        "8",
        "--frequency",
        "16",
        "--window",
        "128",
        "--taper",
        "rectangular",
    ]);
    cmd
}

#[test]
fn test_run_prints_one_line_per_spectrum() {
    let stdout = stdout_of(&mut small_run());
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 4);
    for (index, line) in lines.iter().enumerate() {
        assert_eq!(line["sequence"], index as u64);
        assert_eq!(line["peak_bin"], 8);
        assert_eq!(line["peak_frequency"], 16.0);
    }
}

#[test]
fn test_run_summary() {
    let stdout = stdout_of(small_run().args(["--summary", "--overlap", "0.5"]));
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    // 512 samples, N = 128, hop 64
    assert_eq!(parsed["spectra"], 7);
    assert_eq!(parsed["frequency_resolution"], 2.0);
    assert_eq!(parsed["stats"]["blocks_received"], 8);
    assert_eq!(parsed["stats"]["blocks_processed"], 8);
    assert!(parsed["projector_rank"].is_null());
}

#[test]
fn test_run_with_session_projector() {
    let dir = TempDir::new().unwrap();
    let session = write_session(&dir);

    let stdout = stdout_of(megstream().args([
        "run",
        "--quiet",
        "--summary",
        "--channels",
        "4",
        "--blocks",
        "4",
        "--window",
        "256",
        "--stage",
        "before-buffer",
        "--session",
        session.as_str(),
    ]));
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["projector_rank"], 1);
}

#[test]
fn test_run_session_channel_mismatch() {
    let dir = TempDir::new().unwrap();
    let session = write_session(&dir);

    megstream()
        .args(["run", "--quiet", "--channels", "3", "--session", session.as_str()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("session has 4 channels"));
}

#[test]
fn test_run_rejects_non_power_of_two_window() {
    megstream()
        .args(["run", "--quiet", "--window", "1000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("power of two"));
}

#[test]
fn test_run_rejects_zero_channels() {
    megstream()
        .args(["run", "--quiet", "--channels", "0"])
        .assert()
        .code(2);
}

// =============================================================================
// PROJECTOR SUBCOMMAND
// =============================================================================

#[test]
fn test_projector_from_session() {
    let dir = TempDir::new().unwrap();
    let session = write_session(&dir);

    let stdout = stdout_of(megstream().args(["projector", "--session", session.as_str()]));
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    assert_eq!(parsed["rank"], 1);
    assert_eq!(parsed["dimension"], 3);
    assert_eq!(parsed["bad_channels"][0], "MEG0121");
    assert_eq!(parsed["applied_vectors"], serde_json::json!(["ecg"]));
    assert_eq!(parsed["dropped_vectors"], serde_json::json!(["stale"]));
    assert!(parsed.get("matrix").is_none());
}

#[test]
fn test_projector_bads_override() {
    let dir = TempDir::new().unwrap();
    let session = write_session(&dir);

    let stdout = stdout_of(megstream().args([
        "projector", "--session", session.as_str(), "--matrix", "--bads", "MEG0111",
    ]));
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    // MEG0121 is good again, MEG0111 is now bad
    assert_eq!(parsed["dimension"], 3);
    assert_eq!(parsed["dropped_vectors"], serde_json::json!([]));
    assert_eq!(parsed["applied_vectors"], serde_json::json!(["ecg", "stale"]));
    assert_eq!(parsed["rank"], 2);
    assert_eq!(parsed["matrix"].as_array().unwrap().len(), 3);
}

#[test]
fn test_projector_missing_session() {
    megstream()
        .args(["projector", "--session", "/nonexistent/session.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to read session"));
}
