// Integration tests for the faultline binary
//
// Metrics are served from a temporary --data directory holding the three
// CSV resources the ingest service would return.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const FEATURES: [&str; 13] = [
    "exp", "rexp", "sexp", "ndev", "nuc", "age", "la", "ld", "lt", "ns", "nd", "nf", "entropy",
];

/// Write `n` daily commits; buggy commits have larger metrics
fn write_fixtures(dir: &Path, n: usize) {
    let mut commits = format!("commit_id,author_date,buggy,{}\n", FEATURES.join(","));
    for i in 0..n {
        let buggy = i % 4 == 0;
        write!(commits, "c{},{},{}", i, i as i64 * 86_400, buggy).unwrap();
        for j in 0..FEATURES.len() {
            let offset = if buggy { 50 } else { 0 };
            write!(commits, ",{}", (i + j) % 9 + offset).unwrap();
        }
        commits.push('\n');
    }
    fs::write(dir.join("metrics.csv"), commits).unwrap();
    fs::write(
        dir.join("file_aggregated_metrics.csv"),
        "path,churn,owners\nsrc/main.rs,12,2\nsrc/lib.rs,4,1\nREADME.md,1,1\n",
    )
    .unwrap();
    fs::write(
        dir.join("developer_aggregated_metrics.csv"),
        "email,commits,buggy_ratio\na@x.io,40,0.1\nb@x.io,8,0.5\n",
    )
    .unwrap();
}

fn faultline() -> Command {
    Command::cargo_bin("faultline").unwrap()
}

#[test]
fn test_build_json_output() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 300);
    let model = data.path().join("models/repo.apr");

    faultline()
        .arg("--data")
        .arg(data.path())
        .arg("build")
        .arg("--params")
        .arg(r#"{"n_estimators": 20, "random_state": 42}"#)
        .arg("--model")
        .arg(&model)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_built\": true"))
        .stdout(predicate::str::contains("\"is_predicted\": true"))
        .stdout(predicate::str::contains("\"status\": \"ok\""))
        .stdout(predicate::str::contains("\"format\": \"apr\""))
        .stdout(predicate::str::contains("\"f1-score\""))
        .stdout(predicate::str::contains("\"error\"").not());

    assert!(model.exists());
}

#[test]
fn test_build_csv_output() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 300);

    faultline()
        .arg("--data")
        .arg(data.path())
        .arg("--format")
        .arg("csv")
        .arg("build")
        .arg("--params")
        .arg(r#"{"n_estimators": 10, "random_state": 1}"#)
        .arg("--model")
        .arg(data.path().join("m.apr"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "commit_id,score,experience,history,size,diffusion\n",
        ))
        .stdout(predicate::str::contains("c299,"));
}

#[test]
fn test_predict_with_built_model() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 300);
    let model = data.path().join("m.apr");

    let built = faultline()
        .arg("--data")
        .arg(data.path())
        .arg("build")
        .arg("--params")
        .arg(r#"{"n_estimators": 10, "random_state": 3}"#)
        .arg("--model")
        .arg(&model)
        .output()
        .unwrap();
    assert!(built.status.success());

    let payload: serde_json::Value = serde_json::from_slice(&built.stdout).unwrap();
    let medians = payload["medians"]["all"].to_string();
    let medians_score = payload["model_report"]["medians_score"].as_f64().unwrap();

    faultline()
        .arg("--data")
        .arg(data.path())
        .arg("predict")
        .arg("--model")
        .arg(&model)
        .arg("--medians")
        .arg(&medians)
        .arg("--medians-score")
        .arg(medians_score.to_string())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"is_predicted\": true"))
        .stdout(predicate::str::contains("\"status\": \"last_model\""))
        .stdout(predicate::str::contains("\"commit_id\": \"c0\""));
}

#[test]
fn test_predict_missing_model_reports_stage() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 20);

    faultline()
        .arg("--data")
        .arg(data.path())
        .arg("predict")
        .arg("--model")
        .arg(data.path().join("absent.apr"))
        .arg("--medians")
        .arg("{}")
        .arg("--medians-score")
        .arg("0.3")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"stage\": \"predicting\""))
        .stdout(predicate::str::contains("\"is_predicted\": false"));
}

#[test]
fn test_build_with_too_little_history() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 40);

    faultline()
        .arg("--data")
        .arg(data.path())
        .arg("build")
        .arg("--model")
        .arg(data.path().join("m.apr"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"stage\": \"data preparation\""))
        .stdout(predicate::str::contains("\"quantiles\""))
        .stdout(predicate::str::contains("\"status\": \"fail_data_preparing\""));
}

#[test]
fn test_config_file_overrides_window() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 200);
    let config = data.path().join("faultline.toml");
    fs::write(&config, "ignored_days = 10\n").unwrap();

    let output = faultline()
        .arg("--data")
        .arg(data.path())
        .arg("--config")
        .arg(&config)
        .arg("build")
        .arg("--params")
        .arg(r#"{"n_estimators": 5, "random_state": 9}"#)
        .arg("--model")
        .arg(data.path().join("m.apr"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // Newest commit is day 199; days 189..=199 are predicted
    assert_eq!(payload["data_points"]["predict"], 11);
}

#[test]
fn test_invalid_params_json() {
    let data = TempDir::new().unwrap();
    write_fixtures(data.path(), 10);

    faultline()
        .arg("--data")
        .arg(data.path())
        .arg("build")
        .arg("--params")
        .arg("{not json")
        .arg("--model")
        .arg(data.path().join("m.apr"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid --params JSON"));
}

#[test]
fn test_requires_a_metrics_source() {
    faultline()
        .arg("build")
        .arg("--model")
        .arg("m.apr")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data"));
}

#[test]
fn test_ingest_requires_auth() {
    faultline()
        .arg("--ingest-url")
        .arg("http://127.0.0.1:9")
        .arg("--repo-id")
        .arg("r1")
        .arg("build")
        .arg("--model")
        .arg("m.apr")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing authentication"));
}

#[test]
fn test_version_flag() {
    faultline()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("faultline"));
}
