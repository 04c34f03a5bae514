//! Pipeline commands: `run`, `stage`, `qa` and `visual`

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use super::common::{orchestrator, parse_run_id};
use crate::{Config, FinalArtifact, QaOutcome, QaResult, RunOptions, RunSummary, VisualOutcome};
use uxpal_engine::StageResult;
use uxpal_utils::error::UxpalError;

/// Execute the full pipeline for one request.
pub async fn execute_run_command(
    request: &str,
    run_id: Option<&str>,
    json: bool,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let orchestrator = orchestrator(config, cancel)?;
    let options = RunOptions {
        run_id: run_id.map(parse_run_id).transpose()?,
        ..RunOptions::default()
    };

    let summary = orchestrator.run_all(request, options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary(&summary);
    }
    ensure_valid(&summary.run_id, &summary.final_artifact)
}

/// Execute one stage of an existing run.
pub async fn execute_stage_command(
    stage: u8,
    run_id: &str,
    input: Option<&str>,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let orchestrator = orchestrator(config, cancel)?;

    let stage_run = orchestrator.run_single_stage(stage, &run_id, input).await?;

    println!("Run {run_id} ({})", orchestrator.pipeline());
    print_stage(&stage_run.result);
    if let Some(artifact) = &stage_run.final_artifact {
        print_final_artifact(artifact);
        ensure_valid(run_id.as_str(), artifact)?;
    }
    Ok(())
}

/// Re-run Design QA over an existing run's designer output.
pub async fn execute_qa_command(
    run_id: &str,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let orchestrator = orchestrator(config, cancel)?;

    let result = orchestrator.run_qa_for_run(&run_id, None).await?;

    println!("Design QA for run {run_id}");
    print_qa(&result);
    if result.outcome.is_usable() && result.json.is_some() {
        println!(
            "  Validated JSON: {}",
            orchestrator.store().qa_path(&run_id, "validated")
        );
    }
    Ok(())
}

/// Wait for a screenshot and run the visual review of an existing run.
pub async fn execute_visual_command(
    run_id: &str,
    config: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let orchestrator = orchestrator(config, cancel)?;

    println!(
        "Waiting up to {}s for {}",
        orchestrator.handoff().timeout().as_secs(),
        orchestrator.handoff().screenshot_path(&run_id)
    );
    let outcome = orchestrator.run_visual(&run_id).await?;
    println!("Visual review for run {run_id}: {}", visual_label(&outcome));
    Ok(())
}

/// A run whose final output is not JSON fails with `VALIDATION_FAILED`.
fn ensure_valid(run_id: &str, artifact: &FinalArtifact) -> Result<()> {
    if artifact.is_valid() {
        return Ok(());
    }
    Err(UxpalError::ValidationFailed {
        run_id: run_id.to_string(),
        reason: artifact
            .reason
            .clone()
            .unwrap_or_else(|| "no JSON in the final stage output".to_string()),
    }
    .into())
}

fn print_run_summary(summary: &RunSummary) {
    println!("Run {} ({})", summary.run_id, summary.pipeline);
    if !summary.ai_enabled {
        println!("  ⚠ No AI provider available; stages used placeholder responses");
    }
    for stage in &summary.stages {
        match &stage.error {
            None => println!(
                "  ✓ Stage {} {} ({:.1}s)",
                stage.stage, stage.stage_name, stage.metadata.execution_time_seconds
            ),
            Some(error) => println!("  ✗ Stage {} {}: {error}", stage.stage, stage.stage_name),
        }
    }
    println!(
        "  QA: {} ({} iteration(s), {} issue(s){})",
        summary.qa.outcome,
        summary.qa.iterations_run,
        summary.qa.issues_found,
        if summary.qa.json_replaced {
            ", JSON corrected"
        } else {
            ""
        }
    );
    println!("  Visual: {}", visual_label(&summary.visual));
    print_final_artifact(&summary.final_artifact);
}

fn print_stage(result: &StageResult) {
    match &result.content {
        uxpal_engine::StageContent::Ok(text) => println!(
            "  ✓ Stage {} {} ({:.1}s, {} chars)",
            result.stage,
            result.metadata.stage_label,
            result.metadata.execution_time_seconds,
            text.chars().count()
        ),
        uxpal_engine::StageContent::Failed { error } => println!(
            "  ✗ Stage {} {}: {error}",
            result.stage, result.metadata.stage_label
        ),
    }
}

fn print_qa(result: &QaResult) {
    println!(
        "  Outcome: {} after {} iteration(s)",
        result.outcome, result.iterations_run
    );
    for record in &result.history {
        println!(
            "  Iteration {}: {} issue(s), {} change(s)",
            record.iteration,
            record.issues.len(),
            record.changes.len()
        );
        for issue in &record.issues {
            println!("    - {}", issue.trim_start_matches("- "));
        }
    }
    if result.outcome == QaOutcome::Failed
        && let Some(failure) = &result.failure
    {
        println!("  ⚠ QA failed; designer output kept: {failure}");
    }
}

fn print_final_artifact(artifact: &FinalArtifact) {
    match (&artifact.path, artifact.is_valid()) {
        (Some(path), true) => println!("  ✓ Final artifact: {path}"),
        _ => println!(
            "  ✗ Final artifact invalid: {}",
            artifact.reason.as_deref().unwrap_or("unknown reason")
        ),
    }
    if let Some(layout) = &artifact.layout {
        println!(
            "    {} native element(s), {} component(s), depth {}",
            layout.metrics.native_element_count,
            layout.metrics.component_count,
            layout.metrics.layout_depth
        );
        for issue in layout.issues() {
            println!("    ⚠ {issue}");
        }
    }
}

fn visual_label(outcome: &VisualOutcome) -> String {
    match outcome {
        VisualOutcome::Disabled => "disabled".to_string(),
        VisualOutcome::Unsupported => "not supported by this pipeline".to_string(),
        VisualOutcome::NoArtifact => "skipped (no valid artifact to render)".to_string(),
        VisualOutcome::TimedOut => "no screenshot arrived; original artifact kept".to_string(),
        VisualOutcome::Approved => "approved".to_string(),
        VisualOutcome::Unusable { reason } => format!("critique unusable ({reason})"),
        VisualOutcome::Improved { path } => format!("improved artifact at {path}"),
        VisualOutcome::ImprovedInvalid { reason } => {
            format!("improved output held no JSON ({reason}); original artifact kept")
        }
    }
}
