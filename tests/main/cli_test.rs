//! CLI contract tests.

use std::path::{Path, PathBuf};
use std::process::Output;

use assert_cmd::Command;

fn write_config(dir: &Path) -> PathBuf {
    let main = dir.join("toolgate.toml");
    std::fs::write(
        &main,
        r#"
[policy]
defaults = "defaults.toml"

[metadata]
groups = ["notes"]

[metadata.tools]
delete_note = ["destructive", "notes"]
list_notes = ["read-only", "notes"]
"#,
    )
    .expect("write config");
    std::fs::write(
        dir.join("defaults.toml"),
        r#"
default_decision = "deny"

[[rules]]
tags_any = ["destructive"]
decision = "confirm"
priority = 20
description = "destructive needs a human"

[[rules]]
names = ["delete_*"]
decision = "allow"
priority = 10
"#,
    )
    .expect("write defaults");
    main
}

fn toolgate() -> Command {
    let mut cmd = Command::cargo_bin("toolgate").expect("binary builds");
    cmd.env_remove("TOOLGATE_CONFIG")
        .env_remove("TOOLGATE_OVERRIDE_OFFSET")
        .env_remove("RUST_LOG")
        .env_remove("TOOLGATE_LOG");
    cmd
}

fn run(config: &Path, args: &[&str]) -> Output {
    toolgate()
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("binary runs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn validate_reports_ok() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = run(&config, &["validate"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("ok: 2 in-house tools"));
}

#[test]
fn validate_fails_on_missing_metadata() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = run(&config, &["validate", "--in-house", "list_notes", "--in-house", "c"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing metadata for in-house tools: c"), "{stderr}");
}

#[test]
fn evaluate_prints_decision_and_rule() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());

    let output = run(&config, &["evaluate", "--tool", "delete_note"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("decision: confirm"), "{out}");
    assert!(out.contains("destructive needs a human"), "{out}");

    let output = run(&config, &["evaluate", "--tool", "list_notes"]);
    assert!(stdout(&output).contains("decision: deny"));
}

#[test]
fn evaluate_json_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = run(&config, &["evaluate", "--tool", "delete_note", "--json"]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(value["decision"], "confirm");
    assert_eq!(value["rule"]["priority"], 20);
    assert_eq!(value["taint"], "trusted");
}

#[test]
fn evaluate_rejects_unknown_taint_level() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = run(&config, &["evaluate", "--tool", "x", "--taint", "spicy"]);
    assert!(!output.status.success());
}

#[test]
fn rules_lists_in_evaluation_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = run(&config, &["rules"]);
    assert!(output.status.success());

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3, "{out}");
    assert!(lines[0].starts_with("#0"), "{out}");
    assert!(lines[1].starts_with("#1"), "{out}");
    assert_eq!(lines[2], "default: deny");
}

#[test]
fn config_env_var_is_used_without_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = toolgate()
        .env("TOOLGATE_CONFIG", &config)
        .args(["evaluate", "--tool", "delete_note"])
        .output()
        .expect("binary runs");
    assert!(output.status.success());
    assert!(stdout(&output).contains("decision: confirm"));
}

#[test]
fn negative_offset_env_fails_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let output = toolgate()
        .env("TOOLGATE_OVERRIDE_OFFSET", "-5000")
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .output()
        .expect("binary runs");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("override_offset must not be negative"), "{stderr}");
}

#[test]
fn log_dir_receives_json_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());
    let logs = dir.path().join("logs");

    let output = run(
        &config,
        &["--log-dir", logs.to_str().expect("utf8 path"), "validate"],
    );
    assert!(output.status.success());

    let files: Vec<_> = std::fs::read_dir(&logs)
        .expect("logs dir created")
        .map(|entry| entry.expect("dir entry").path())
        .collect();
    assert_eq!(files.len(), 1, "{files:?}");
    let name = files[0].file_name().and_then(|n| n.to_str()).unwrap_or_default();
    assert!(name.starts_with("toolgate.log"), "{name}");

    let contents = std::fs::read_to_string(&files[0]).expect("log readable");
    let messages: Vec<String> = contents
        .lines()
        .map(|line| {
            let record: serde_json::Value = serde_json::from_str(line).expect("json record");
            record["fields"]["message"].as_str().unwrap_or_default().to_owned()
        })
        .collect();
    assert!(messages.iter().any(|m| m == "loaded toolgate config"), "{contents}");
}
