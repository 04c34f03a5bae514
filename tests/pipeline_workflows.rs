//! Multi-step workflows through the public library API
//!
//! Each test drives a `PipelineOrchestrator` against a scripted backend in a
//! temporary project directory and checks what lands on disk.

use camino::Utf8PathBuf;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

use uxpal::llm::testing::ScriptedBackend;
use uxpal::{ArtifactStatus, Config, PipelineOrchestrator, QaOutcome, RunId, RunOptions, RunSummary};

const LAYOUT: &str = r#"{"layoutContainer": {"name": "Profile"}, "items": [{"type": "component", "componentNodeId": "12:4"}]}"#;

struct Project {
    _temp: TempDir,
    root: Utf8PathBuf,
}

impl Project {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let prompts = root.join("prompts");
        std::fs::create_dir_all(&prompts).unwrap();
        for (name, text) in [
            ("alt1-user-request-analyzer.txt", "ANALYZE {{USER_REQUEST}} for {{PLATFORM}}"),
            ("alt2-ux-ui-designer.txt", "DESIGN {{USER_REQUEST_ANALYZER_OUTPUT}}\nDS: {{DESIGN_SYSTEM_DATA}}"),
            ("alt2-5-design-qa.txt", "QA DS: {{DESIGN_SYSTEM_DATA}}\nJSON: {{CURRENT_JSON}}\n{{FIX_HISTORY}}"),
            ("5 json-engineer.txt", "ENGINEER {{UX_UI_DESIGNER_OUTPUT}}"),
            ("1 product-manager.txt", "PM [USER_INPUT]"),
            ("2 product-designer.txt", "PD [USER_INPUT]"),
            ("3 ux-designer.txt", "UX [USER_INPUT]"),
            ("4 ui-designer.txt", "UI [USER_INPUT]"),
        ] {
            std::fs::write(prompts.join(name), text).unwrap();
        }
        Self { _temp: temp, root }
    }

    fn with_design_system(self, file_name: &str, content: &str) -> Self {
        let dir = self.root.join("design-system");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file_name), content).unwrap();
        self
    }

    fn config(&self, pipeline: &str, qa_iterations: u32) -> Config {
        Config::builder()
            .pipeline(pipeline)
            .llm_provider("placeholder")
            .output_dir(self.root.join("out").as_str())
            .ready_dir(self.root.join("ready").as_str())
            .prompts_dir(self.root.join("prompts").as_str())
            .design_system_dir(self.root.join("design-system").as_str())
            .qa_max_iterations(qa_iterations)
            .build()
            .unwrap()
    }

    fn read_json(&self, relative: &str) -> Value {
        serde_json::from_str(&std::fs::read_to_string(self.root.join(relative)).unwrap()).unwrap()
    }
}

fn run_id() -> RunId {
    RunId::parse("20250315_090000").unwrap()
}

fn options() -> RunOptions {
    RunOptions {
        run_id: Some(run_id()),
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_repeating_critic_stops_qa_and_keeps_newest_design_system() {
    let project = Project::new()
        .with_design_system("design-system-raw-data-2025-01-01T08-00-00.json", r#"{"version": "old"}"#)
        .with_design_system("design-system-raw-data-2025-03-01T08-00-00.json", r#"{"version": "new"}"#);
    let critique = "---ISSUES-FOUND---\n- Avatar component id unknown\n---FIXED-JSON---\nNONE\n---CHANGES-MADE---\nNONE";
    let backend = Arc::new(
        ScriptedBackend::new()
            .then_ok("Analysis of a profile screen")
            .then_ok(format!("Rationale.\n---RATIONALE-SEPARATOR---\n{LAYOUT}"))
            .then_ok(critique)
            .then_ok(critique)
            .then_ok(LAYOUT),
    );
    let orchestrator = PipelineOrchestrator::new(&project.config("alt3", 3), backend.clone()).unwrap();

    let summary = orchestrator.run_all("a profile screen", options()).await.unwrap();

    assert_eq!(summary.qa.outcome, QaOutcome::Stagnated);
    assert_eq!(summary.qa.iterations_run, 2);
    assert!(!summary.qa.json_replaced);

    let calls = backend.calls();
    assert_eq!(calls.len(), 5);
    assert!(calls[1].prompt.contains(r#""version": "new""#));
    assert!(calls[2].prompt.contains("No previous attempts."));
    assert!(calls[3].prompt.contains("**Iteration 1:**\nIssues: - Avatar component id unknown"));

    let history = project.read_json("out/alt3_20250315_090000_2_5_qa_history.json");
    assert_eq!(history.as_array().unwrap().len(), 2);
    let change_log = project.read_json("out/alt3_20250315_090000_2_5_qa_change_log.json");
    assert_eq!(change_log["total_issues_found"], 2);
    assert_eq!(change_log["total_changes_made"], 0);

    let on_disk: RunSummary =
        serde_json::from_value(project.read_json("out/alt3_20250315_090000_summary.json")).unwrap();
    assert_eq!(on_disk.qa, summary.qa);
    assert_eq!(on_disk.final_artifact, summary.final_artifact);
    assert_eq!(on_disk.stages.len(), 3);
}

#[tokio::test]
async fn test_resume_final_stage_after_unparseable_output() {
    let project = Project::new();
    let backend = Arc::new(
        ScriptedBackend::new()
            .then_ok("analysis")
            .then_ok(format!("Rationale.\n---RATIONALE-SEPARATOR---\n{LAYOUT}"))
            .then_ok("Sorry, I could not produce the JSON this time.")
            .then_ok(format!("```json\n{LAYOUT}\n```")),
    );
    let orchestrator = PipelineOrchestrator::new(&project.config("alt3", 0), backend.clone()).unwrap();

    let summary = orchestrator.run_all("a profile screen", options()).await.unwrap();
    assert_eq!(summary.final_artifact.status, ArtifactStatus::Invalid);
    assert!(!project.root.join("ready/figma_ready_20250315_090000.json").exists());
    // Raw output stays on disk for diagnosis.
    assert!(project.root.join("out/alt3_20250315_090000_3_json_engineer_output.txt").is_file());

    let resumed = orchestrator.run_single_stage(3, &run_id(), None).await.unwrap();
    let artifact = resumed.final_artifact.unwrap();
    assert!(artifact.is_valid());
    assert_eq!(
        project.read_json("ready/figma_ready_20250315_090000.json"),
        serde_json::from_str::<Value>(LAYOUT).unwrap()
    );
    assert_eq!(artifact.layout.unwrap().metrics.component_count, 1);

    // The resumed stage read the designer record, not the failed engineer output.
    assert!(backend.calls()[3].prompt.starts_with("ENGINEER Rationale."));
}

#[tokio::test]
async fn test_classic_pipeline_chains_role_outputs() {
    let project = Project::new();
    let backend = Arc::new(ScriptedBackend::new().with_responder(|inv| {
        let role = inv.prompt.split_whitespace().next().unwrap_or_default().to_string();
        Ok(match role.as_str() {
            "ENGINEER" => json!({"layoutContainer": {"name": "Todo"}, "items": []}).to_string(),
            other => format!("{other} notes"),
        })
    }));
    let orchestrator = PipelineOrchestrator::new(&project.config("classic", 3), backend.clone()).unwrap();

    let summary = orchestrator.run_all("a todo app", options()).await.unwrap();

    assert_eq!(summary.total_stages, 5);
    // Classic runs have no designer JSON for QA to check.
    assert_eq!(summary.qa.outcome, QaOutcome::Skipped);
    assert!(summary.final_artifact.is_valid());
    let prompts: Vec<String> = backend.calls().into_iter().map(|c| c.prompt).collect();
    assert_eq!(prompts[1], "PD PM notes");
    assert_eq!(prompts[4], "ENGINEER UI notes");
    assert!(project.root.join("out/20250315_090000_summary.json").is_file());
    assert_eq!(
        project.read_json("ready/figma_ready_20250315_090000.json")["layoutContainer"]["name"],
        "Todo"
    );
}
