//! Layout tree checks for final JSON artifacts
//!
//! A node is a *container* when it is an object with an `items` array and a
//! *leaf* otherwise. Items are objects carrying a `type`; `component` items
//! reference the design system, any other type is a native element.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const NATIVE_TEXT: &str = "native-text";
const COMPONENT: &str = "component";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutMetrics {
    pub native_element_count: usize,
    pub component_count: usize,
    pub layout_depth: usize,
}

/// Findings for one layout document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutReport {
    pub structure_issues: Vec<String>,
    pub text_issues: Vec<String>,
    pub metrics: LayoutMetrics,
}

impl LayoutReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.structure_issues.is_empty() && self.text_issues.is_empty()
    }

    #[must_use]
    pub fn issues(&self) -> impl Iterator<Item = &String> {
        self.structure_issues.iter().chain(&self.text_issues)
    }
}

/// Check `layout` and collect metrics.
///
/// ```rust
/// use serde_json::json;
/// use uxpal_engine::layout::validate_layout;
///
/// let report = validate_layout(&json!({
///     "layoutContainer": {"name": "Login"},
///     "items": [{"type": "native-text", "_useFlexFill": true, "_parentLayout": "VERTICAL"}]
/// }));
/// assert!(report.is_valid());
/// assert_eq!(report.metrics.native_element_count, 1);
/// ```
#[must_use]
pub fn validate_layout(layout: &Value) -> LayoutReport {
    let mut report = LayoutReport {
        structure_issues: structure_issues(layout),
        ..LayoutReport::default()
    };
    check_text_nodes(layout, "root", &mut report.text_issues);
    count_items(layout, &mut report.metrics);
    report.metrics.layout_depth = depth(layout);
    report
}

fn structure_issues(layout: &Value) -> Vec<String> {
    let Some(root) = layout.as_object() else {
        return vec!["Root must be a JSON object".to_string()];
    };
    let mut issues = Vec::new();
    if !root.contains_key("layoutContainer") {
        issues.push("Missing required 'layoutContainer'".to_string());
    }
    match root.get("items") {
        None => issues.push("Missing required 'items' array".to_string()),
        Some(items) if !items.is_array() => issues.push("'items' must be an array".to_string()),
        Some(_) => {}
    }
    issues
}

fn children(node: &Value) -> Option<&Vec<Value>> {
    node.get("items").and_then(Value::as_array)
}

fn check_text_nodes(node: &Value, path: &str, issues: &mut Vec<String>) {
    if node.get("type").and_then(Value::as_str) == Some(NATIVE_TEXT) {
        if !node.get("_useFlexFill").is_some_and(is_truthy) {
            issues.push(format!("{path}: Missing _useFlexFill: true"));
        }
        if !node.get("_parentLayout").is_some_and(is_truthy) {
            issues.push(format!("{path}: Missing _parentLayout"));
        }
        if node.get("_constraintWidth").is_some() {
            issues.push(format!("{path}: Has forbidden _constraintWidth"));
        }
    }
    if let Some(items) = children(node) {
        for (i, item) in items.iter().enumerate() {
            check_text_nodes(item, &format!("{path}.items[{i}]"), issues);
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn count_items(node: &Value, metrics: &mut LayoutMetrics) {
    match node {
        Value::Object(map) => {
            match map.get("type").and_then(Value::as_str) {
                Some(COMPONENT) => metrics.component_count += 1,
                Some(_) => metrics.native_element_count += 1,
                None => {}
            }
            for value in map.values() {
                count_items(value, metrics);
            }
        }
        Value::Array(values) => {
            for value in values {
                count_items(value, metrics);
            }
        }
        _ => {}
    }
}

fn depth(node: &Value) -> usize {
    match children(node) {
        Some(items) => items.iter().map(|item| depth(item) + 1).max().unwrap_or(0),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structure_issues() {
        let report = validate_layout(&json!({"items": {}}));
        assert_eq!(
            report.structure_issues,
            ["Missing required 'layoutContainer'", "'items' must be an array"]
        );
        assert!(!report.is_valid());

        let report = validate_layout(&json!([1, 2]));
        assert_eq!(report.structure_issues, ["Root must be a JSON object"]);
    }

    #[test]
    fn test_native_text_metadata_paths() {
        let layout = json!({
            "layoutContainer": {},
            "items": [
                {"type": "component", "componentNodeId": "1:2"},
                {"type": "layoutContainer", "items": [
                    {"type": "native-text", "_useFlexFill": true, "_parentLayout": "HORIZONTAL"},
                    {"type": "native-text", "_useFlexFill": false, "_constraintWidth": 120},
                    {"type": "native-text", "_useFlexFill": true, "_parentLayout": ""}
                ]}
            ]
        });

        let report = validate_layout(&layout);
        assert_eq!(
            report.text_issues,
            [
                "root.items[1].items[1]: Missing _useFlexFill: true",
                "root.items[1].items[1]: Missing _parentLayout",
                "root.items[1].items[1]: Has forbidden _constraintWidth",
                "root.items[1].items[2]: Missing _parentLayout",
            ]
        );
        assert!(report.structure_issues.is_empty());
    }

    #[test]
    fn test_metrics() {
        let layout = json!({
            "layoutContainer": {"name": "Screen"},
            "items": [
                {"type": "component", "componentNodeId": "1:2"},
                {"type": "frame", "items": [
                    {"type": "component"},
                    {"type": "native-rectangle", "items": [{"type": "native-text"}]}
                ]}
            ]
        });

        let report = validate_layout(&layout);
        assert_eq!(
            report.metrics,
            LayoutMetrics {
                native_element_count: 3,
                component_count: 2,
                layout_depth: 3,
            }
        );
    }

    #[test]
    fn test_empty_items_has_zero_depth() {
        let report = validate_layout(&json!({"layoutContainer": {}, "items": []}));
        assert!(report.is_valid());
        assert_eq!(report.metrics, LayoutMetrics::default());
    }
}
