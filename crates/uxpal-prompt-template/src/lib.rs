//! Prompt templates for uxpal pipeline stages
//!
//! Templates are plain text files with literal placeholder tokens in either
//! the `{{NAME}}` convention or the legacy `[NAME]` convention. [`compose`]
//! substitutes bound tokens in a single pass: a bound value is never
//! re-scanned, and unbound tokens are left verbatim.

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{[A-Za-z0-9_]+\}\}|\[[A-Z0-9_]+\]").unwrap());

/// Placeholder tokens understood by the built-in stage templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter)]
pub enum Placeholder {
    /// The user's original request text
    UserRequest,
    /// Target platform hint
    Platform,
    /// Legacy single-bracket input slot used by the role pipeline
    UserInput,
    /// Output of the request analyzer stage
    UserRequestAnalyzerOutput,
    /// Output of the UX/UI designer stage (possibly QA re-wrapped)
    UxUiDesignerOutput,
    /// Design-system reference document
    DesignSystemData,
    /// Current layout JSON under QA review
    CurrentJson,
    /// Summary of earlier QA iterations
    FixHistory,
    /// Analyzer output as seen by the visual reviewer
    AnalyzerOutput,
    /// Designer output as seen by the visual reviewer
    DesignerOutput,
    /// Visual reviewer improvements fed back into JSON engineering
    ReviewerOutput,
    /// Screenshot presence marker
    InterfaceImage,
}

impl Placeholder {
    /// Literal token as it appears in template text.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::UserRequest => "{{USER_REQUEST}}",
            Self::Platform => "{{PLATFORM}}",
            Self::UserInput => "[USER_INPUT]",
            Self::UserRequestAnalyzerOutput => "{{USER_REQUEST_ANALYZER_OUTPUT}}",
            Self::UxUiDesignerOutput => "{{UX_UI_DESIGNER_OUTPUT}}",
            Self::DesignSystemData => "{{DESIGN_SYSTEM_DATA}}",
            Self::CurrentJson => "{{CURRENT_JSON}}",
            Self::FixHistory => "{{FIX_HISTORY}}",
            Self::AnalyzerOutput => "{{ANALYZER_OUTPUT}}",
            Self::DesignerOutput => "{{DESIGNER_OUTPUT}}",
            Self::ReviewerOutput => "{{REVIEWER_OUTPUT}}",
            Self::InterfaceImage => "{{INTERFACE_IMAGE}}",
        }
    }

    /// Look up a known placeholder by its literal token.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::iter().find(|p| p.token() == token)
    }
}

/// Values bound to placeholder tokens for one composition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptBindings {
    values: BTreeMap<String, String>,
}

impl PromptBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a known placeholder, replacing any earlier value.
    #[must_use]
    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.bind(placeholder, value);
        self
    }

    pub fn bind(&mut self, placeholder: Placeholder, value: impl Into<String>) -> &mut Self {
        self.values
            .insert(placeholder.token().to_string(), value.into());
        self
    }

    /// Copy every binding of `other` over this one.
    pub fn merge(&mut self, other: &PromptBindings) -> &mut Self {
        for (token, value) in &other.values {
            self.values.insert(token.clone(), value.clone());
        }
        self
    }

    #[must_use]
    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(placeholder.token()).map(String::as_str)
    }

    fn lookup(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(String::as_str)
    }
}

/// Substitute bound tokens in `template`.
///
/// ```rust
/// use uxpal_prompt_template::{compose, Placeholder, PromptBindings};
///
/// let bindings = PromptBindings::new()
///     .with(Placeholder::UserRequest, "a login page using {{PLATFORM}}")
///     .with(Placeholder::Platform, "Mobile");
/// let prompt = compose("Build {{USER_REQUEST}} for {{PLATFORM}}. {{MISSING}}", &bindings);
/// assert_eq!(prompt, "Build a login page using {{PLATFORM}} for Mobile. {{MISSING}}");
/// ```
#[must_use]
pub fn compose(template: &str, bindings: &PromptBindings) -> String {
    TOKEN_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let token = &caps[0];
            bindings.lookup(token).unwrap_or(token).to_string()
        })
        .into_owned()
}

/// Tokens in `template` that `bindings` leaves unresolved, in order of first appearance.
#[must_use]
pub fn unresolved_tokens<'a>(template: &'a str, bindings: &PromptBindings) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for m in TOKEN_RE.find_iter(template) {
        let token = m.as_str();
        if bindings.lookup(token).is_none() && !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

/// Errors raised while loading a template file.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {path}")]
    NotFound { path: Utf8PathBuf },

    #[error("failed to read template {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TemplateError {
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::NotFound { path } | Self::Read { path, .. } => path,
        }
    }
}

/// Loads stage templates from a directory by file name.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: Utf8PathBuf,
}

impl TemplateStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, file_name: &str) -> Utf8PathBuf {
        self.dir.join(file_name)
    }

    /// Read the template text for `file_name`.
    pub fn load(&self, file_name: &str) -> Result<String, TemplateError> {
        let path = self.path_for(file_name);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!(template = %path, chars = text.len(), "Loaded prompt template");
                Ok(text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TemplateError::NotFound { path })
            }
            Err(source) => Err(TemplateError::Read { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_both_conventions_are_substituted() {
        let bindings = PromptBindings::new()
            .with(Placeholder::UserInput, "legacy")
            .with(Placeholder::UserRequest, "modern");
        assert_eq!(
            compose("[USER_INPUT] / {{USER_REQUEST}}", &bindings),
            "legacy / modern"
        );
    }

    #[test]
    fn test_unbound_tokens_stay_verbatim() {
        let bindings = PromptBindings::new().with(Placeholder::Platform, "Web");
        let out = compose("{{PLATFORM}} {{DESIGN_SYSTEM_DATA}} [OTHER]", &bindings);
        assert_eq!(out, "Web {{DESIGN_SYSTEM_DATA}} [OTHER]");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let bindings = PromptBindings::new()
            .with(Placeholder::UserRequestAnalyzerOutput, "[USER_INPUT] {{PLATFORM}}")
            .with(Placeholder::UserInput, "SHOULD NOT APPEAR")
            .with(Placeholder::Platform, "SHOULD NOT APPEAR");
        let out = compose("{{USER_REQUEST_ANALYZER_OUTPUT}}", &bindings);
        assert_eq!(out, "[USER_INPUT] {{PLATFORM}}");
    }

    #[test]
    fn test_binding_order_does_not_matter() {
        let template = "{{USER_REQUEST}}|{{PLATFORM}}|[USER_INPUT]";
        let mut a = PromptBindings::new();
        a.bind(Placeholder::UserRequest, "{{PLATFORM}}")
            .bind(Placeholder::Platform, "[USER_INPUT]")
            .bind(Placeholder::UserInput, "x");
        let mut b = PromptBindings::new();
        b.bind(Placeholder::UserInput, "x")
            .bind(Placeholder::Platform, "[USER_INPUT]")
            .bind(Placeholder::UserRequest, "{{PLATFORM}}");
        assert_eq!(compose(template, &a), compose(template, &b));
        assert_eq!(compose(template, &a), "{{PLATFORM}}|[USER_INPUT]|x");
    }

    #[test]
    fn test_repeated_tokens_all_replaced() {
        let bindings = PromptBindings::new().with(Placeholder::Platform, "Mobile");
        assert_eq!(
            compose("{{PLATFORM}} and {{PLATFORM}}", &bindings),
            "Mobile and Mobile"
        );
    }

    #[test]
    fn test_json_brackets_are_not_tokens() {
        let bindings = PromptBindings::new();
        let template = r#"Example: {"items": [1, 2]} and [lowercase]"#;
        assert_eq!(compose(template, &bindings), template);
        assert!(unresolved_tokens(template, &bindings).is_empty());
    }

    #[test]
    fn test_merge_overrides_existing_values() {
        let mut base = PromptBindings::new()
            .with(Placeholder::Platform, "Mobile")
            .with(Placeholder::UserRequest, "keep");
        let extra = PromptBindings::new().with(Placeholder::Platform, "Web");
        base.merge(&extra);
        assert_eq!(base.get(Placeholder::Platform), Some("Web"));
        assert_eq!(base.get(Placeholder::UserRequest), Some("keep"));
        let expected = PromptBindings::new()
            .with(Placeholder::UserRequest, "keep")
            .with(Placeholder::Platform, "Web");
        assert_eq!(base, expected);
    }

    #[test]
    fn test_unresolved_tokens_reported_once() {
        let bindings = PromptBindings::new().with(Placeholder::Platform, "Mobile");
        let tokens = unresolved_tokens(
            "{{CURRENT_JSON}} {{PLATFORM}} {{CURRENT_JSON}} [USER_INPUT]",
            &bindings,
        );
        assert_eq!(tokens, vec!["{{CURRENT_JSON}}", "[USER_INPUT]"]);
    }

    #[test]
    fn test_placeholder_token_lookup() {
        for placeholder in Placeholder::iter() {
            assert_eq!(Placeholder::from_token(placeholder.token()), Some(placeholder));
            // Every bindable token is one `compose` can substitute.
            assert_eq!(
                TOKEN_RE.find(placeholder.token()).map(|m| m.as_str()),
                Some(placeholder.token())
            );
        }
        assert_eq!(Placeholder::from_token("{{NOPE}}"), None);
    }

    #[test]
    fn test_template_store_load_and_missing() {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("5 json-engineer.txt"), "Convert [USER_INPUT]").unwrap();

        let store = TemplateStore::new(dir.clone());
        assert_eq!(store.load("5 json-engineer.txt").unwrap(), "Convert [USER_INPUT]");

        let err = store.load("missing.txt").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
        assert_eq!(err.path(), dir.join("missing.txt").as_path());
    }
}
