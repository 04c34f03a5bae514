//! Smoke tests for the `uxpal` binary
//!
//! Every test runs the compiled binary inside a temporary project with the
//! placeholder provider, so no network access or API key is needed.

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

const RUN_ID: &str = "20250401_101500";

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    std::fs::create_dir_all(root.join(".uxpal")).unwrap();
    std::fs::write(
        root.join(".uxpal/config.toml"),
        "[defaults]\nprompts_dir = \"prompts\"\noutput_dir = \"out\"\nready_dir = \"ready\"\n\n[llm]\nprovider = \"placeholder\"\n",
    )
    .unwrap();
    std::fs::create_dir_all(root.join("prompts")).unwrap();
    for (name, text) in [
        ("alt1-user-request-analyzer.txt", "ANALYZE {{USER_REQUEST}}"),
        ("alt2-ux-ui-designer.txt", "DESIGN {{USER_REQUEST_ANALYZER_OUTPUT}}"),
        ("5 json-engineer.txt", "ENGINEER {{UX_UI_DESIGNER_OUTPUT}}"),
    ] {
        std::fs::write(root.join("prompts").join(name), text).unwrap();
    }
    temp
}

fn uxpal(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("uxpal"));
    cmd.current_dir(dir)
        .env_remove("UXPAL_HOME")
        .env_remove("UXPAL_LLM_PROVIDER")
        .env_remove("UXPAL_QA_MAX_ITERATIONS")
        .env_remove("GEMINI_API_KEY")
        .stdin(Stdio::null());
    cmd
}

#[test]
fn test_version() {
    let dir = project();
    uxpal(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("uxpal"));
}

#[test]
fn test_validate_reports_layout_findings() {
    let dir = project();
    std::fs::write(
        dir.path().join("layout.json"),
        r#"{"layoutContainer": {}, "items": [{"type": "native-text", "_useFlexFill": true}]}"#,
    )
    .unwrap();

    uxpal(dir.path())
        .args(["validate", "layout.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 native element(s)"))
        .stdout(predicate::str::contains("root.items[0]: Missing _parentLayout"));
}

#[test]
fn test_validate_non_json_exits_with_validation_code() {
    let dir = project();
    std::fs::write(dir.path().join("broken.json"), "not a layout").unwrap();

    uxpal(dir.path())
        .args(["validate", "broken.json"])
        .assert()
        .code(4);
}

#[test]
fn test_validate_scalar_json_exits_with_validation_code() {
    let dir = project();
    std::fs::write(dir.path().join("scalar.json"), "42").unwrap();

    uxpal(dir.path())
        .args(["validate", "scalar.json"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("expected a JSON object"));
}

#[test]
fn test_config_json_shows_sources() {
    let dir = project();
    let output = uxpal(dir.path())
        .args(["config", "--json", "--model", "gemini-test"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["llm_model"]["value"], "gemini-test");
    assert_eq!(config["llm_model"]["source"], "cli");
    assert_eq!(config["prompts_dir"]["source"], "config");
    assert_eq!(config["platform"]["source"], "default");
}

#[test]
fn test_stage_without_upstream_exits_with_missing_dependency() {
    let dir = project();
    uxpal(dir.path())
        .args(["stage", "2", "--run-id", RUN_ID])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("stage 1"));
}

#[test]
fn test_unknown_pipeline_is_an_argument_error() {
    let dir = project();
    uxpal(dir.path())
        .args(["run", "--input", "a login page", "--pipeline", "nope"])
        .assert()
        .code(2);
}

#[test]
fn test_placeholder_run_keeps_artifacts_and_fails_validation() {
    let dir = project();
    uxpal(dir.path())
        .args(["run", "--input", "a login page", "--run-id", RUN_ID])
        .assert()
        .code(4)
        .stdout(predicate::str::contains("No AI provider available"))
        .stdout(predicate::str::contains("Final artifact invalid"));

    let out = dir.path().join("out");
    for name in [
        "alt3_20250401_101500_1_user_request_analyzer.json",
        "alt3_20250401_101500_2_ux_ui_designer_output.txt",
        "alt3_20250401_101500_3_json_engineer_output.txt",
        "alt3_20250401_101500_summary.json",
    ] {
        assert!(out.join(name).is_file(), "missing {name}");
    }
    assert!(!dir.path().join("ready").join("figma_ready_20250401_101500.json").exists());
}

#[test]
fn test_reused_run_id_is_refused_without_touching_artifacts() {
    let dir = project();
    uxpal(dir.path())
        .args(["run", "--input", "a login page", "--run-id", RUN_ID])
        .assert()
        .code(4);
    let record = dir.path().join("out/alt3_20250401_101500_1_user_request_analyzer.json");
    let before = std::fs::read(&record).unwrap();

    uxpal(dir.path())
        .args(["run", "--input", "a signup page", "--run-id", RUN_ID])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already has output for stage 1"));

    assert_eq!(std::fs::read(&record).unwrap(), before);
}
