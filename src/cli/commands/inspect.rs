//! Read-only commands: `validate` and `config`

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::Path;

use crate::{Config, validate_layout};
use uxpal_extraction::extract_json;
use uxpal_utils::error::UxpalError;

/// Check a layout file.
///
/// The file may hold bare JSON or a full model response; the same
/// extraction the pipeline applies to its final stage is used. Layout
/// findings are reported but do not fail the command; unparseable content
/// exits with `VALIDATION_FAILED`.
pub fn execute_validate_command(file: &Path, json_output: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read layout file: {}", file.display()))?;

    let layout: Value = extract_json(&text).map_err(|e| UxpalError::ValidationFailed {
        run_id: file.display().to_string(),
        reason: e.to_string(),
    })?;
    let report = validate_layout(&layout);

    if json_output {
        let output = json!({
            "file": file.display().to_string(),
            "valid": report.is_valid(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Layout: {}", file.display());
    println!(
        "  {} native element(s), {} component(s), depth {}",
        report.metrics.native_element_count,
        report.metrics.component_count,
        report.metrics.layout_depth
    );
    if report.is_valid() {
        println!("  ✓ No structure or text-node issues");
    } else {
        for issue in &report.structure_issues {
            println!("  ✗ {issue}");
        }
        for issue in &report.text_issues {
            println!("  ⚠ {issue}");
        }
    }
    Ok(())
}

/// Show the effective configuration with the source of each value.
pub fn execute_config_command(json_output: bool, config: &Config) -> Result<()> {
    let effective = config.effective_config();

    if json_output {
        let entries: serde_json::Map<String, Value> = effective
            .into_iter()
            .map(|(key, (value, source))| (key, json!({ "value": value, "source": source })))
            .collect();
        println!("{}", serde_json::to_string_pretty(&Value::Object(entries))?);
        return Ok(());
    }

    println!("Effective configuration:");
    let width = effective.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in &effective {
        println!("  {key:<width$} = {value}  ({source})");
    }
    Ok(())
}
