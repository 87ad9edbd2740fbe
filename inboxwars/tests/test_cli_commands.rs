mod common;

use common::{fixture_path, run_cli};

fn fixture(name: &str) -> String {
    fixture_path(name).to_string_lossy().into_owned()
}

#[test]
fn validate_accepts_fixtures() {
    let output = run_cli(&[
        "validate",
        &fixture("game.yaml"),
        "--scenario",
        &fixture("scenario.yaml"),
    ]);
    assert!(
        output.status.success(),
        "validate should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn validate_rejects_invalid_game_config() {
    let output = run_cli(&["validate", &fixture("invalid_game.yaml")]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 file(s) failed validation"), "{stderr}");
}

#[test]
fn validate_reports_every_issue() {
    let output = run_cli(&["-v", "validate", &fixture("invalid_game.yaml")]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("game needs at least one round"), "{stderr}");
    assert!(stderr.contains("did you mean 'Gmail'"), "{stderr}");
    assert!(stderr.contains("sums to 90"), "{stderr}");
}

#[test]
fn validate_rejects_bad_scenario() {
    let output = run_cli(&[
        "validate",
        &fixture("game.yaml"),
        "--scenario",
        &fixture("bad_scenario.yaml"),
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn validate_missing_file_is_io_error() {
    let output = run_cli(&["validate", "/tmp/nonexistent_inboxwars_game.yaml"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn simulate_prints_json_standings() {
    let output = run_cli(&[
        "--quiet",
        "simulate",
        "--config",
        &fixture("game.yaml"),
        "--scenario",
        &fixture("scenario.yaml"),
        "--review-delay-ms",
        "0",
        "--format",
        "json",
    ]);
    assert!(
        output.status.success(),
        "simulate should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let standings: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("standings should be JSON");
    assert_eq!(standings["room"], "DEMO01");
    assert_eq!(standings["rounds_played"], 3);
    assert_eq!(standings["esp_teams"].as_array().map(Vec::len), Some(2));
    assert_eq!(standings["destinations"].as_array().map(Vec::len), Some(3));
}

#[test]
fn simulate_writes_event_log() {
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.jsonl");
    let output = run_cli(&[
        "--quiet",
        "simulate",
        "-c",
        &fixture("game.yaml"),
        "-s",
        &fixture("scenario.yaml"),
        "--seed",
        "11",
        "--events-file",
        events.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "simulate should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let contents = std::fs::read_to_string(&events).expect("events file should exist");
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("invalid JSON: {e}\nline: {l}")))
        .collect();

    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["sequence"], i as u64, "sequence gap at {i}");
        assert_eq!(line["room"], "DEMO01");
        assert!(line.get("type").is_some(), "event {i} missing type: {line}");
    }

    let consequences = lines
        .iter()
        .filter(|l| l["type"] == "phase_transition" && l["phase"] == "consequences")
        .count();
    assert_eq!(consequences, 3);
    assert!(lines.iter().any(|l| l["type"] == "destination_dashboard"));
}

#[test]
fn version_json() {
    let output = run_cli(&["version", "--format", "json"]);
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["name"], "inboxwars");
}
